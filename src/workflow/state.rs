//! Workflow phases and the UI state derived from them

use serde::Serialize;
use std::path::PathBuf;

use crate::source::ImageHandle;

/// Shown when recognition succeeded but found nothing
pub const NO_TEXT_FOUND: &str = "No text found in the image";

/// Prefix of the text shown when recognition failed
pub const ERROR_PREFIX: &str = "Error processing image: ";

/// What the text area shows after a recognition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayedText {
    /// Non-empty recognized text
    Recognized(String),
    /// Recognition found no text
    NoTextFound,
    /// Recognition failed with this message
    Error(String),
}

impl DisplayedText {
    /// Text as presented to the user
    pub fn render(&self) -> String {
        match self {
            DisplayedText::Recognized(text) => text.clone(),
            DisplayedText::NoTextFound => NO_TEXT_FOUND.to_string(),
            DisplayedText::Error(message) => format!("{}{}", ERROR_PREFIX, message),
        }
    }

    /// Recognized text eligible for copying; sentinels never are
    pub fn copyable(&self) -> Option<&str> {
        match self {
            DisplayedText::Recognized(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}

/// Where the workflow stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// No image yet
    Idle,
    /// An image is held and can be processed
    ImageReady { handle: ImageHandle },
    /// Recognition request `request_id` is outstanding
    Processing {
        handle: ImageHandle,
        request_id: u64,
        /// Result shown before this request, kept on screen meanwhile
        previous: Option<DisplayedText>,
    },
    /// The last request finished; behaves like `ImageReady`
    Resolved {
        handle: ImageHandle,
        result: DisplayedText,
    },
}

impl Phase {
    /// Image currently held
    pub fn handle(&self) -> Option<&ImageHandle> {
        match self {
            Phase::Idle => None,
            Phase::ImageReady { handle }
            | Phase::Processing { handle, .. }
            | Phase::Resolved { handle, .. } => Some(handle),
        }
    }

    /// Id of the outstanding recognition request, if any
    pub fn outstanding_request(&self) -> Option<u64> {
        match self {
            Phase::Processing { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }

    fn displayed(&self) -> Option<&DisplayedText> {
        match self {
            Phase::Idle | Phase::ImageReady { .. } => None,
            Phase::Processing { previous, .. } => previous.as_ref(),
            Phase::Resolved { result, .. } => Some(result),
        }
    }
}

/// Snapshot the presentation layer renders.
///
/// Derived from the controller after every transition, never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UiState {
    /// Location of the held image, for preview
    pub image: Option<PathBuf>,
    /// Whether an image is held
    pub has_image: bool,
    /// Whether a recognition request is outstanding
    pub is_processing: bool,
    /// Whether a permission request or acquisition is outstanding
    pub is_acquiring: bool,
    /// Whether "process" is enabled
    pub can_process: bool,
    /// Text area content
    pub displayed_text: Option<String>,
    /// Whether "copy" is enabled
    pub can_copy: bool,
}

impl UiState {
    /// Derive the UI state from the workflow phase
    pub fn derive(phase: &Phase, is_acquiring: bool) -> Self {
        let is_processing = phase.outstanding_request().is_some();
        let displayed = phase.displayed();
        let has_image = phase.handle().is_some();

        Self {
            image: phase.handle().map(|h| h.location().to_path_buf()),
            has_image,
            is_processing,
            is_acquiring,
            can_process: has_image && !is_processing,
            displayed_text: displayed.map(DisplayedText::render),
            can_copy: !is_processing && displayed.and_then(DisplayedText::copyable).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::AcquisitionKind;

    fn handle() -> ImageHandle {
        ImageHandle::new("/photos/h1.png", AcquisitionKind::Select)
    }

    #[test]
    fn test_idle_state() {
        let ui = UiState::derive(&Phase::Idle, false);
        assert_eq!(ui, UiState::default());
    }

    #[test]
    fn test_image_ready_state() {
        let ui = UiState::derive(&Phase::ImageReady { handle: handle() }, false);
        assert!(ui.has_image);
        assert!(ui.can_process);
        assert_eq!(ui.image, Some(PathBuf::from("/photos/h1.png")));
        assert_eq!(ui.displayed_text, None);
        assert!(!ui.can_copy);
    }

    #[test]
    fn test_processing_keeps_previous_text_but_disables_copy() {
        let phase = Phase::Processing {
            handle: handle(),
            request_id: 2,
            previous: Some(DisplayedText::Recognized("old".into())),
        };
        let ui = UiState::derive(&phase, false);
        assert!(ui.is_processing);
        assert!(!ui.can_process);
        assert_eq!(ui.displayed_text.as_deref(), Some("old"));
        assert!(!ui.can_copy);
    }

    #[test]
    fn test_sentinels_are_not_copyable() {
        let no_text = Phase::Resolved {
            handle: handle(),
            result: DisplayedText::NoTextFound,
        };
        let ui = UiState::derive(&no_text, false);
        assert_eq!(ui.displayed_text.as_deref(), Some(NO_TEXT_FOUND));
        assert!(!ui.can_copy);

        let error = Phase::Resolved {
            handle: handle(),
            result: DisplayedText::Error("Could not load image".into()),
        };
        let ui = UiState::derive(&error, false);
        assert_eq!(
            ui.displayed_text.as_deref(),
            Some("Error processing image: Could not load image")
        );
        assert!(!ui.can_copy);
        assert!(ui.can_process);
    }

    #[test]
    fn test_recognized_text_is_copyable() {
        let phase = Phase::Resolved {
            handle: handle(),
            result: DisplayedText::Recognized("Hello World".into()),
        };
        let ui = UiState::derive(&phase, true);
        assert!(ui.can_copy);
        assert!(ui.is_acquiring);
    }
}
