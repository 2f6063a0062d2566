//! Camera position registry.
//!
//! Maps the flow's logical camera positions (front/back) to V4L2 device
//! paths. Desktops rarely have two cameras; both positions may point at
//! the same device.

use attest_core::CameraPosition;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PositionMapError {
    #[error("bad position map TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot read position map: {0}")]
    Io(#[from] std::io::Error),
}

/// Position → device path mapping, loadable from a `[cameras]`-style
/// TOML file:
///
/// ```toml
/// front = "/dev/video1"
/// back = "/dev/video0"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PositionMap {
    pub front: String,
    pub back: String,
}

impl PositionMap {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
        }
    }

    pub fn from_toml(src: &str) -> Result<Self, PositionMapError> {
        Ok(toml::from_str(src)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, PositionMapError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn device_for(&self, position: CameraPosition) -> &str {
        match position {
            CameraPosition::Front => &self.front,
            CameraPosition::Back => &self.back,
        }
    }
}
