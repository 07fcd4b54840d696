//! OCR-backed recognition client
//!
//! Loads the image behind a handle, hands the decoded pixels to an
//! [`OcrEngine`] and folds every result into a [`RecognitionOutcome`].

use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::{RecognitionClient, RecognitionOutcome};
use crate::source::ImageHandle;

/// An image that has been loaded and decoded
#[derive(Debug)]
pub struct DecodedImage {
    /// Where the image was loaded from
    pub path: PathBuf,
    /// Decoded pixels
    pub image: DynamicImage,
}

impl DecodedImage {
    /// Load and decode the image at `path`
    pub fn load(path: &Path) -> Result<Self, image::ImageError> {
        let image = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?;
        Ok(Self {
            path: path.to_path_buf(),
            image,
        })
    }

    /// Get image dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// A text recognition backend.
///
/// Engines are blocking; they run on tokio's blocking pool.
pub trait OcrEngine: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Recognize all text in the image, lines separated by `\n`
    fn recognize_text(&self, image: &DecodedImage) -> Result<String>;
}

/// [`RecognitionClient`] that decodes the image and runs an [`OcrEngine`]
pub struct OcrRecognizer {
    engine: Arc<dyn OcrEngine>,
}

impl OcrRecognizer {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl RecognitionClient for OcrRecognizer {
    async fn recognize(&self, handle: &ImageHandle) -> RecognitionOutcome {
        let path = handle.location().to_path_buf();
        let engine = self.engine.clone();

        let task = tokio::task::spawn_blocking(move || recognize_blocking(engine.as_ref(), &path));

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Recognition task for {} did not complete: {}", handle, e);
                RecognitionOutcome::engine_failure(format!("Recognition task failed: {}", e))
            }
        }
    }
}

fn recognize_blocking(engine: &dyn OcrEngine, path: &Path) -> RecognitionOutcome {
    let start = Instant::now();

    let decoded = match DecodedImage::load(path) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("Could not load image {:?}: {}", path, e);
            return RecognitionOutcome::decode_failure(format!("Could not load image: {}", e));
        }
    };

    let (width, height) = decoded.dimensions();
    debug!("{}: processing {}x{} image", engine.name(), width, height);

    match engine.recognize_text(&decoded) {
        Ok(text) => {
            let text = normalize_text(&text);
            debug!(
                "{}: recognized {} characters in {:?}",
                engine.name(),
                text.chars().count(),
                start.elapsed()
            );
            RecognitionOutcome::success(text)
        }
        Err(e) => {
            warn!("{} failed on {:?}: {:#}", engine.name(), path, e);
            RecognitionOutcome::engine_failure(format!("{:#}", e))
        }
    }
}

/// Strip the trailing newlines and page breaks engines append
fn normalize_text(text: &str) -> String {
    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::AcquisitionKind;
    use crate::vision::FailureKind;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    struct FakeEngine {
        result: std::result::Result<&'static str, &'static str>,
    }

    impl OcrEngine for FakeEngine {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn recognize_text(&self, image: &DecodedImage) -> Result<String> {
            assert_eq!(image.dimensions(), (8, 4));
            match self.result {
                Ok(text) => Ok(text.to_string()),
                Err(message) => Err(anyhow::anyhow!(message)),
            }
        }
    }

    struct PanickingEngine;

    impl OcrEngine for PanickingEngine {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn recognize_text(&self, _image: &DecodedImage) -> Result<String> {
            panic!("engine crashed")
        }
    }

    fn write_png(dir: &TempDir) -> ImageHandle {
        let path = dir.path().join("sample.png");
        RgbaImage::from_pixel(8, 4, Rgba([255, 255, 255, 255]))
            .save(&path)
            .unwrap();
        ImageHandle::new(path, AcquisitionKind::Select)
    }

    fn recognizer(engine: impl OcrEngine + 'static) -> OcrRecognizer {
        OcrRecognizer::new(Arc::new(engine))
    }

    #[tokio::test]
    async fn test_success_trims_trailing_whitespace() {
        let dir = TempDir::new().unwrap();
        let handle = write_png(&dir);

        let outcome = recognizer(FakeEngine { result: Ok("Hello World\n\x0c") })
            .recognize(&handle)
            .await;
        assert_eq!(outcome, RecognitionOutcome::success("Hello World"));
    }

    #[tokio::test]
    async fn test_whitespace_only_is_empty() {
        let dir = TempDir::new().unwrap();
        let handle = write_png(&dir);

        let outcome = recognizer(FakeEngine { result: Ok(" \n\n") }).recognize(&handle).await;
        assert_eq!(outcome, RecognitionOutcome::success(""));
    }

    #[tokio::test]
    async fn test_undecodable_image_is_decode_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        let handle = ImageHandle::new(path, AcquisitionKind::Capture);

        let outcome = recognizer(FakeEngine { result: Ok("unused") }).recognize(&handle).await;
        match outcome {
            RecognitionOutcome::Failure { kind, message } => {
                assert_eq!(kind, FailureKind::Decode);
                assert!(message.starts_with("Could not load image"));
            }
            other => panic!("expected a decode failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_decode_failure() {
        let handle = ImageHandle::new("/nonexistent/snaptext/missing.png", AcquisitionKind::Select);

        let outcome = recognizer(FakeEngine { result: Ok("unused") }).recognize(&handle).await;
        assert!(matches!(
            outcome,
            RecognitionOutcome::Failure { kind: FailureKind::Decode, .. }
        ));
    }

    #[tokio::test]
    async fn test_engine_error_is_engine_failure() {
        let dir = TempDir::new().unwrap();
        let handle = write_png(&dir);

        let outcome = recognizer(FakeEngine { result: Err("model not loaded") })
            .recognize(&handle)
            .await;
        assert_eq!(outcome, RecognitionOutcome::engine_failure("model not loaded"));
    }

    #[tokio::test]
    async fn test_engine_panic_does_not_escape() {
        let dir = TempDir::new().unwrap();
        let handle = write_png(&dir);

        let outcome = recognizer(PanickingEngine).recognize(&handle).await;
        assert!(matches!(
            outcome,
            RecognitionOutcome::Failure { kind: FailureKind::Engine, .. }
        ));
    }
}
