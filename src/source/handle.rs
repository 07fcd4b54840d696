//! Image handle produced by a successful acquisition

use std::fmt;
use std::path::{Path, PathBuf};

/// How an image was acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionKind {
    /// A new picture taken with the camera
    Capture,
    /// An existing image chosen with the picker
    Select,
}

impl AcquisitionKind {
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionKind::Capture => "capture",
            AcquisitionKind::Select => "select",
        }
    }
}

/// Opaque reference to an acquired image.
///
/// Holds only the location of the image bytes, never decoded pixels, so
/// dropping it needs no cleanup.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    /// Where the image bytes live
    location: PathBuf,
    /// How the image was acquired
    kind: AcquisitionKind,
}

impl ImageHandle {
    pub fn new(location: impl Into<PathBuf>, kind: AcquisitionKind) -> Self {
        Self {
            location: location.into(),
            kind,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn kind(&self) -> AcquisitionKind {
        self.kind
    }
}

/// Two handles are the same image when they point at the same location
impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && self.kind == other.kind
    }
}

impl Eq for ImageHandle {}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location.display())
    }
}
