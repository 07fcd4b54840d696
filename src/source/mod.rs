//! Image Source
//!
//! Acquires an image reference either by capturing a new picture or by
//! selecting an existing one. The camera and the picker are external
//! collaborators; this layer only allocates destinations and turns their
//! answers into an [`Acquisition`].

pub mod command;
pub mod handle;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub use command::{CommandCamera, CommandPicker, FixedPicker};
pub use handle::{AcquisitionKind, ImageHandle};

/// Camera UI collaborator
#[async_trait]
pub trait CameraUi: Send + Sync {
    /// Take a picture and write it to `destination`.
    ///
    /// `Ok(false)` means the user backed out or nothing was written.
    async fn take_picture(&self, destination: &Path) -> anyhow::Result<bool>;
}

/// Image picker collaborator
#[async_trait]
pub trait PickerUi: Send + Sync {
    /// Let the user choose an image. `Ok(None)` means cancelled.
    async fn pick_image(&self) -> anyhow::Result<Option<PathBuf>>;
}

/// Result of one acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Acquired(ImageHandle),
    Cancelled,
}

/// The acquisition could not even be attempted
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to prepare capture directory {path:?}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{collaborator} unavailable: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },
}

/// Capture-or-select front end over the camera and picker collaborators
pub struct ImageSource {
    camera: Arc<dyn CameraUi>,
    picker: Arc<dyn PickerUi>,
    capture_dir: PathBuf,
}

impl ImageSource {
    pub fn new(camera: Arc<dyn CameraUi>, picker: Arc<dyn PickerUi>, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            camera,
            picker,
            capture_dir: capture_dir.into(),
        }
    }

    /// Directory new captures are written to
    #[cfg(test)]
    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    /// Run the acquisition matching `kind`
    pub async fn acquire(&self, kind: AcquisitionKind) -> Result<Acquisition, SourceError> {
        match kind {
            AcquisitionKind::Capture => self.capture().await,
            AcquisitionKind::Select => self.select().await,
        }
    }

    /// Allocate a fresh location for a new capture
    pub async fn allocate_destination(&self) -> Result<PathBuf, SourceError> {
        tokio::fs::create_dir_all(&self.capture_dir)
            .await
            .map_err(|source| SourceError::Destination {
                path: self.capture_dir.clone(),
                source,
            })?;

        let name = format!("IMG_{}.jpg", uuid::Uuid::new_v4().simple());
        Ok(self.capture_dir.join(name))
    }

    /// Take a new picture
    pub async fn capture(&self) -> Result<Acquisition, SourceError> {
        let destination = self.allocate_destination().await?;
        debug!("Capturing to {:?}", destination);

        let taken = self
            .camera
            .take_picture(&destination)
            .await
            .map_err(|e| SourceError::Collaborator {
                collaborator: "Camera",
                message: format!("{:#}", e),
            })?;

        if taken {
            info!("Captured image {:?}", destination);
            Ok(Acquisition::Acquired(ImageHandle::new(destination, AcquisitionKind::Capture)))
        } else {
            discard_partial_capture(&destination).await;
            info!("Capture cancelled");
            Ok(Acquisition::Cancelled)
        }
    }

    /// Choose an existing image
    pub async fn select(&self) -> Result<Acquisition, SourceError> {
        let picked = self
            .picker
            .pick_image()
            .await
            .map_err(|e| SourceError::Collaborator {
                collaborator: "Picker",
                message: format!("{:#}", e),
            })?;

        match picked {
            Some(path) => {
                info!("Selected image {:?}", path);
                Ok(Acquisition::Acquired(ImageHandle::new(path, AcquisitionKind::Select)))
            }
            None => {
                info!("Selection cancelled");
                Ok(Acquisition::Cancelled)
            }
        }
    }
}

/// Remove whatever a cancelled capture left at its destination
async fn discard_partial_capture(destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => debug!("Removed partial capture {:?}", destination),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove partial capture {:?}: {}", destination, e),
    }
}
