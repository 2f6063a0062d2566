//! attest-hw — hardware abstraction for single-shot camera capture.
//!
//! Provides V4L2-based still capture, pixel-format conversion, and the
//! position registry mapping front/back to device paths.

pub mod camera;
pub mod device;
pub mod frame;
pub mod positions;

pub use camera::{CameraError, DeviceInfo, PixelFormat, V4lCamera};
pub use device::{CaptureBackend, DeviceProvider, V4lProvider};
pub use frame::Photo;
pub use positions::PositionMap;
