//! Capture capability traits and the V4L2-backed provider.
//!
//! The verification pipeline talks only to these traits, so tests can
//! install deterministic fakes in place of real hardware.

use crate::camera::{CameraError, V4lCamera};
use crate::frame::Photo;
use crate::positions::PositionMap;
use attest_core::CameraPosition;

/// An installed capture input: one open device, single-shot stills.
pub trait CaptureBackend: Send {
    fn take_photo(&mut self) -> Result<Photo, CameraError>;

    /// Discard frames so auto-gain/exposure can settle after install.
    fn warm_up(&mut self, frames: usize);
}

/// Opens a capture backend for a logical camera position.
pub trait DeviceProvider: Send {
    fn open(&self, position: CameraPosition) -> Result<Box<dyn CaptureBackend>, CameraError>;
}

impl CaptureBackend for V4lCamera {
    fn take_photo(&mut self) -> Result<Photo, CameraError> {
        V4lCamera::take_photo(self)
    }

    fn warm_up(&mut self, frames: usize) {
        self.discard_frames(frames);
    }
}

/// Provider that opens real V4L2 devices from the position registry.
pub struct V4lProvider {
    map: PositionMap,
}

impl V4lProvider {
    pub fn new(map: PositionMap) -> Self {
        Self { map }
    }
}

impl DeviceProvider for V4lProvider {
    fn open(&self, position: CameraPosition) -> Result<Box<dyn CaptureBackend>, CameraError> {
        let path = self.map.device_for(position);
        tracing::debug!(%position, device = path, "opening capture device");
        Ok(Box::new(V4lCamera::open(path)?))
    }
}
