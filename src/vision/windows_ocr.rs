//! Windows OCR API backend
//!
//! Uses the built-in Windows OCR (Media.Ocr) engine. Lines are joined with
//! `\n` so multi-line documents keep their layout when copied.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use windows::{
    core::HSTRING,
    Foundation::IAsyncOperation,
    Globalization::Language,
    Graphics::Imaging::{BitmapPixelFormat, SoftwareBitmap},
    Media::Ocr::{OcrEngine as WinOcrEngine, OcrResult as WinOcrResult},
    Storage::Streams::{DataReader, DataWriter, InMemoryRandomAccessStream},
};

use super::ocr::{DecodedImage, OcrEngine};

/// Windows OCR engine wrapper
pub struct WindowsOcr {
    engine: WinOcrEngine,
    language: String,
}

impl WindowsOcr {
    /// Create an engine for `language_tag`, falling back to the user profile languages
    pub fn new(language_tag: &str) -> Result<Self> {
        info!("Initializing Windows OCR engine with language: {}", language_tag);

        let language = Language::CreateLanguage(&HSTRING::from(language_tag))
            .context("Failed to create language")?;

        if !WinOcrEngine::IsLanguageSupported(&language)
            .context("Failed to check language support")?
        {
            warn!("Language '{}' not supported, falling back to system default", language_tag);
            let engine = WinOcrEngine::TryCreateFromUserProfileLanguages()
                .context("Failed to create OCR engine from user profile")?;

            let lang_tag = engine
                .RecognizerLanguage()
                .context("Failed to get recognizer language")?
                .LanguageTag()
                .context("Failed to get language tag")?
                .to_string();

            info!("Windows OCR initialized with language: {}", lang_tag);
            return Ok(Self {
                engine,
                language: lang_tag,
            });
        }

        let engine = WinOcrEngine::TryCreateFromLanguage(&language)
            .context("Failed to create OCR engine for language")?;

        Ok(Self {
            engine,
            language: language_tag.to_string(),
        })
    }
}

impl OcrEngine for WindowsOcr {
    fn name(&self) -> &'static str {
        "windows-ocr"
    }

    fn recognize_text(&self, image: &DecodedImage) -> Result<String> {
        let rgba = image.image.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Ok(String::new());
        }

        debug!("Windows OCR ({}): Processing {}x{} image", self.language, width, height);

        let bgra_data = rgba_to_bgra(rgba.as_raw());
        let bitmap = create_software_bitmap(&bgra_data, width, height)?;
        let ocr_result = run_ocr_sync(&self.engine, &bitmap)?;

        collect_lines(&ocr_result)
    }
}

/// Convert RGBA to BGRA (Windows expects BGRA)
fn rgba_to_bgra(rgba: &[u8]) -> Vec<u8> {
    let mut bgra = rgba.to_vec();
    for chunk in bgra.chunks_exact_mut(4) {
        chunk.swap(0, 2);
    }
    bgra
}

/// Create a SoftwareBitmap from BGRA data using CopyFromBuffer
fn create_software_bitmap(bgra_data: &[u8], width: u32, height: u32) -> Result<SoftwareBitmap> {
    let stream = InMemoryRandomAccessStream::new().context("Failed to create in-memory stream")?;

    let writer = DataWriter::CreateDataWriter(&stream).context("Failed to create data writer")?;
    writer.WriteBytes(bgra_data).context("Failed to write pixel data")?;
    writer
        .StoreAsync()
        .context("Failed to start store operation")?
        .get()
        .context("Failed to store data")?;
    writer
        .FlushAsync()
        .context("Failed to start flush operation")?
        .get()
        .context("Failed to flush data")?;

    stream.Seek(0).context("Failed to seek stream")?;

    let bitmap = SoftwareBitmap::Create(BitmapPixelFormat::Bgra8, width as i32, height as i32)
        .context("Failed to create SoftwareBitmap")?;

    let input_stream = stream.GetInputStreamAt(0).context("Failed to get input stream")?;
    let reader = DataReader::CreateDataReader(&input_stream).context("Failed to create data reader")?;
    reader
        .LoadAsync(bgra_data.len() as u32)
        .context("Failed to start load operation")?
        .get()
        .context("Failed to load data")?;

    let buffer = reader
        .ReadBuffer(bgra_data.len() as u32)
        .context("Failed to read buffer")?;

    bitmap
        .CopyFromBuffer(&buffer)
        .context("Failed to copy buffer to bitmap")?;

    Ok(bitmap)
}

/// Run OCR synchronously (blocks until complete)
fn run_ocr_sync(engine: &WinOcrEngine, bitmap: &SoftwareBitmap) -> Result<WinOcrResult> {
    let async_op: IAsyncOperation<WinOcrResult> = engine
        .RecognizeAsync(bitmap)
        .context("Failed to start OCR recognition")?;

    async_op.get().context("OCR recognition failed")
}

/// Join recognized lines with newlines
fn collect_lines(ocr_result: &WinOcrResult) -> Result<String> {
    let lines = ocr_result.Lines().context("Failed to get OCR lines")?;

    let mut text = Vec::new();
    for i in 0..lines.Size().context("Failed to get lines size")? {
        let line = lines.GetAt(i).context("Failed to get line")?;
        text.push(line.Text().context("Failed to get line text")?.to_string());
    }

    Ok(text.join("\n"))
}
