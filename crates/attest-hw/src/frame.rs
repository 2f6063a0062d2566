//! Raw photo type and pixel-format conversion.

use thiserror::Error;

/// A single grayscale still, as delivered by a capture backend.
#[derive(Clone)]
pub struct Photo {
    /// Grayscale pixel data (width * height bytes).
    pub gray: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("buffer too short: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; luma is every
/// even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// True when more than `threshold_pct` of pixels sit in the darkest
/// histogram bucket (0–31). Used to reject shots taken before exposure
/// settles.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_extracts_even_bytes() {
        // Two pixels: [Y0=10, U=99, Y1=20, V=99]
        let yuyv = [10u8, 99, 20, 99];
        let gray = yuyv_to_grayscale(&yuyv, 2, 1).unwrap();
        assert_eq!(gray, vec![10, 20]);
    }

    #[test]
    fn test_yuyv_short_buffer() {
        let err = yuyv_to_grayscale(&[0u8; 3], 2, 1).unwrap_err();
        match err {
            FrameError::InvalidLength { expected, actual } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
        }
    }

    #[test]
    fn test_dark_frame_detection() {
        assert!(is_dark_frame(&vec![0u8; 100], 0.95));
        assert!(!is_dark_frame(&vec![128u8; 100], 0.95));
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_mostly_dark_frame() {
        let mut gray = vec![0u8; 100];
        for p in gray.iter_mut().take(10) {
            *p = 200;
        }
        // 90% dark is below the 95% bar.
        assert!(!is_dark_frame(&gray, 0.95));
    }
}
