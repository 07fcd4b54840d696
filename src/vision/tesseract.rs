//! Tesseract CLI backend
//!
//! Runs `tesseract <image> stdout -l <lang>` and returns its stdout.

use anyhow::{bail, Context, Result};
use std::process::Command;
use tracing::debug;

use super::ocr::{DecodedImage, OcrEngine};

/// OCR engine wrapping the `tesseract` executable
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(program: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
        }
    }

    fn command(&self, image: &DecodedImage) -> Command {
        let mut command = Command::new(&self.program);
        command.arg(&image.path).arg("stdout");
        if !self.language.is_empty() {
            command.arg("-l").arg(&self.language);
        }
        command
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize_text(&self, image: &DecodedImage) -> Result<String> {
        debug!("Running {} on {:?} ({})", self.program, image.path, self.language);

        let output = self
            .command(image)
            .output()
            .with_context(|| format!("Failed to execute {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Tesseract failed: {}", stderr.trim());
        }

        String::from_utf8(output.stdout).context("Tesseract produced invalid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};
    use std::path::PathBuf;

    fn decoded(path: &str) -> DecodedImage {
        DecodedImage {
            path: PathBuf::from(path),
            image: DynamicImage::ImageRgba8(RgbaImage::new(1, 1)),
        }
    }

    #[test]
    fn test_command_line() {
        let engine = TesseractOcr::new("tesseract", "eng+deu");
        let command = engine.command(&decoded("/tmp/scan.png"));

        assert_eq!(command.get_program(), "tesseract");
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["/tmp/scan.png", "stdout", "-l", "eng+deu"]);
    }

    #[test]
    fn test_empty_language_uses_tesseract_default() {
        let engine = TesseractOcr::new("tesseract", "");
        let command = engine.command(&decoded("/tmp/scan.png"));
        assert_eq!(command.get_args().count(), 2);
    }

    #[test]
    fn test_missing_executable_is_an_error() {
        let engine = TesseractOcr::new("snaptext-no-such-tesseract", "eng");
        let err = engine.recognize_text(&decoded("/tmp/scan.png")).unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }
}
