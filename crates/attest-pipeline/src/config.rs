use attest_hw::PositionMap;
use std::path::PathBuf;

/// Pipeline configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path for the front (selfie) camera.
    pub front_device: String,
    /// V4L2 device path for the back (document) camera.
    pub back_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite identity store.
    pub db_path: PathBuf,
    /// Frames to discard after installing an input (AGC/AE stabilization).
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from `ATTEST_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ATTEST_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| attest_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("attest");

        let db_path = std::env::var("ATTEST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("identity.db"));

        Self {
            front_device: std::env::var("ATTEST_FRONT_DEVICE")
                .unwrap_or_else(|_| "/dev/video1".to_string()),
            back_device: std::env::var("ATTEST_BACK_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            db_path,
            warmup_frames: env_usize("ATTEST_WARMUP_FRAMES", 4),
        }
    }

    /// Position registry derived from the configured device paths.
    pub fn position_map(&self) -> PositionMap {
        PositionMap::new(&self.front_device, &self.back_device)
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
