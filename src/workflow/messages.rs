//! Events consumed and effects produced by the workflow controller

use std::fmt;

use crate::clipboard::ExportError;
use crate::error::WorkflowError;
use crate::permissions::{GrantResults, PermissionRequest};
use crate::source::{Acquisition, AcquisitionKind, ImageHandle};
use crate::vision::RecognitionOutcome;

/// Something the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Take a new picture
    Capture,
    /// Choose an existing image
    Select,
    /// Run text recognition on the held image
    Process,
    /// Copy the recognized text
    Copy,
}

/// Input to the controller: user actions and completions of async work
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A user action
    User(UserAction),
    /// The permission subsystem answered a request
    PermissionsResolved {
        request_id: u64,
        results: GrantResults,
    },
    /// The camera or picker finished
    AcquisitionFinished {
        kind: AcquisitionKind,
        result: Result<Acquisition, String>,
    },
    /// The recognition client finished
    RecognitionFinished {
        request_id: u64,
        outcome: RecognitionOutcome,
    },
    /// The clipboard exporter finished
    ExportFinished(Result<(), ExportError>),
}

/// One recognition call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionRequest {
    pub handle: ImageHandle,
    pub request_id: u64,
}

/// Work the controller asks the runtime to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Ask the platform for the capabilities in the request
    RequestPermissions(PermissionRequest),
    /// Run the camera or picker
    Acquire(AcquisitionKind),
    /// Call the recognition client once
    Recognize(RecognitionRequest),
    /// Copy the given text (none when there is nothing to copy)
    Export(Option<String>),
    /// Tell the user something
    Notify(Notice),
}

/// Transient message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    PermissionsGranted,
    TextExtracted,
    NoTextDetected,
    Copied,
    Failed(WorkflowError),
}

impl Notice {
    /// Whether the notice reports a problem
    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Failed(_))
    }

    /// Whether the notice should reach the user at all
    pub fn is_silent(&self) -> bool {
        matches!(self, Notice::Failed(e) if e.is_silent())
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PermissionsGranted => write!(f, "Permissions granted"),
            Notice::TextExtracted => write!(f, "Text extracted successfully"),
            Notice::NoTextDetected => write!(f, "No text detected"),
            Notice::Copied => write!(f, "Text copied to clipboard"),
            Notice::Failed(e) if e.is_recognition_error() => write!(f, "Error: {}", e),
            Notice::Failed(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Capability;

    #[test]
    fn test_notice_messages() {
        assert_eq!(Notice::TextExtracted.to_string(), "Text extracted successfully");
        assert_eq!(Notice::NoTextDetected.to_string(), "No text detected");
        assert_eq!(Notice::Copied.to_string(), "Text copied to clipboard");
        assert_eq!(
            Notice::Failed(WorkflowError::RecognitionFailure("engine offline".into())).to_string(),
            "Error: engine offline"
        );
        assert_eq!(
            Notice::Failed(WorkflowError::PermissionDenied(vec![Capability::Capture])).to_string(),
            "Permissions denied: camera"
        );
    }

    #[test]
    fn test_cancellation_notice_is_silent() {
        assert!(Notice::Failed(WorkflowError::AcquisitionCancelled).is_silent());
        assert!(!Notice::Failed(WorkflowError::NothingToCopy).is_silent());
        assert!(!Notice::Copied.is_error());
    }
}
