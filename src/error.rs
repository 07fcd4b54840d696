//! Error taxonomy for the acquire → recognize → copy workflow
//!
//! Every variant is terminal for the operation that produced it. None of them
//! are retried automatically and none of them leave the controller stuck.

use thiserror::Error;

use crate::permissions::Capability;

/// Failures surfaced to the user while driving the workflow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// One or more required capabilities were refused
    #[error("Permissions denied: {}", format_capabilities(.0))]
    PermissionDenied(Vec<Capability>),

    /// The user backed out of the camera or the picker
    #[error("Acquisition cancelled")]
    AcquisitionCancelled,

    /// The camera or picker helper could not be started at all
    #[error("Could not acquire image: {0}")]
    AcquisitionFailed(String),

    /// The image bytes could not be loaded
    #[error("{0}")]
    DecodeFailure(String),

    /// The OCR engine reported an error
    #[error("{0}")]
    RecognitionFailure(String),

    /// Copy was requested while no recognized text is displayed
    #[error("Nothing to copy")]
    NothingToCopy,

    /// The clipboard could not be reached
    #[error("Clipboard unavailable: {0}")]
    ClipboardUnavailable(String),
}

impl WorkflowError {
    /// Whether this error should be shown to the user at all
    pub fn is_silent(&self) -> bool {
        matches!(self, WorkflowError::AcquisitionCancelled)
    }

    /// Whether the error came out of recognition and is shown as displayed text
    pub fn is_recognition_error(&self) -> bool {
        matches!(
            self,
            WorkflowError::DecodeFailure(_) | WorkflowError::RecognitionFailure(_)
        )
    }
}

fn format_capabilities(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}
