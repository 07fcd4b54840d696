//! Recognition Layer
//!
//! Turns an acquired image into text. The workflow only depends on the
//! [`RecognitionClient`] contract; the OCR itself is delegated to a backend:
//! - Tesseract CLI (all platforms)
//! - Windows OCR API (Windows only)

pub mod ocr;
pub mod tesseract;
#[cfg(target_os = "windows")]
pub mod windows_ocr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::RecognitionSettings;
use crate::source::ImageHandle;

pub use ocr::{OcrEngine, OcrRecognizer};
pub use tesseract::TesseractOcr;
#[cfg(target_os = "windows")]
pub use windows_ocr::WindowsOcr;

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// Tesseract command line tool
    Tesseract,
    /// Windows built-in OCR
    WindowsOcr,
}

impl Default for OcrBackend {
    fn default() -> Self {
        if cfg!(target_os = "windows") {
            OcrBackend::WindowsOcr
        } else {
            OcrBackend::Tesseract
        }
    }
}

/// Why a recognition attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The image bytes could not be loaded
    Decode,
    /// The OCR engine reported an error
    Engine,
}

/// Terminal result of one recognition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionOutcome {
    /// Recognition ran; `text` may be empty
    Success { text: String },
    /// Recognition could not produce text
    Failure { kind: FailureKind, message: String },
}

impl RecognitionOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        RecognitionOutcome::Success { text: text.into() }
    }

    pub fn decode_failure(message: impl Into<String>) -> Self {
        RecognitionOutcome::Failure {
            kind: FailureKind::Decode,
            message: message.into(),
        }
    }

    pub fn engine_failure(message: impl Into<String>) -> Self {
        RecognitionOutcome::Failure {
            kind: FailureKind::Engine,
            message: message.into(),
        }
    }
}

/// Text recognition collaborator.
///
/// `recognize` completes exactly once per call. Decoding problems come back as
/// a [`RecognitionOutcome::Failure`], never as a panic.
#[async_trait]
pub trait RecognitionClient: Send + Sync {
    async fn recognize(&self, handle: &ImageHandle) -> RecognitionOutcome;
}

/// Build the recognition client for the configured backend
pub fn create_recognizer(settings: &RecognitionSettings) -> Result<Arc<dyn RecognitionClient>> {
    info!("Initializing {:?} OCR backend", settings.backend);

    let engine: Arc<dyn OcrEngine> = match settings.backend {
        OcrBackend::Tesseract => Arc::new(TesseractOcr::new(
            settings.tesseract_path.clone(),
            settings.language.clone(),
        )),
        #[cfg(target_os = "windows")]
        OcrBackend::WindowsOcr => Arc::new(WindowsOcr::new(&settings.windows_language)?),
        #[cfg(not(target_os = "windows"))]
        OcrBackend::WindowsOcr => {
            anyhow::bail!("The windows_ocr backend is only available on Windows")
        }
    };

    Ok(Arc::new(OcrRecognizer::new(engine)))
}
