//! Self-describing image header.

use poolwarm_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Newest image layout this build reads and the one it writes.
pub const IMAGE_FORMAT_VERSION: u32 = 1;

/// `{format_name, format_version}` stored ahead of the payload so a reader
/// can refuse an image before interpreting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    pub name: String,
    pub version: u32,
}

impl ImageHeader {
    /// Header written by the current build.
    pub fn current(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: IMAGE_FORMAT_VERSION,
        }
    }

    /// Refuse images written by another backend or a newer layout.
    pub fn check(&self, expected_name: &str) -> Result<()> {
        if !self.name.eq_ignore_ascii_case(expected_name) || self.version > IMAGE_FORMAT_VERSION {
            return Err(Error::ImageVersionMismatch {
                format: self.name.clone(),
                found: self.version,
                supported: IMAGE_FORMAT_VERSION,
            });
        }
        if self.version == 0 {
            return Err(Error::ImageCorrupt("image declares format version 0".into()));
        }
        Ok(())
    }
}
