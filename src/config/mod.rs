//! Application Configuration
//!
//! User settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::permissions::Capability;
use crate::vision::OcrBackend;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Camera settings
    pub capture: CaptureSettings,
    /// Image picker settings
    pub picker: PickerSettings,
    /// Text recognition settings
    pub recognition: RecognitionSettings,
    /// Permission settings
    pub permissions: PermissionSettings,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Copy to the system clipboard (false keeps copies in-process)
    pub use_system_clipboard: bool,
    /// How long a one-shot `--copy` keeps serving the copied text when no
    /// clipboard manager takes it over (Linux only)
    pub clipboard_hold_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            use_system_clipboard: true,
            clipboard_hold_secs: 60,
        }
    }
}

/// Camera helper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Capture program and arguments; `{output}` is replaced with the destination
    pub command: Vec<String>,
    /// Where new captures are written (defaults to the cache directory)
    pub directory: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            command: ["fswebcam", "--no-banner", "-r", "1280x720", "{output}"]
                .into_iter()
                .map(String::from)
                .collect(),
            directory: None,
        }
    }
}

/// Image picker helper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerSettings {
    /// File chooser program and arguments; must print the chosen path
    pub command: Vec<String>,
}

impl Default for PickerSettings {
    fn default() -> Self {
        Self {
            command: [
                "zenity",
                "--file-selection",
                "--title=Select an image",
                "--file-filter=Images | *.png *.jpg *.jpeg *.bmp *.gif *.webp *.tif *.tiff",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Text recognition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// OCR backend
    pub backend: OcrBackend,
    /// Tesseract executable
    pub tesseract_path: String,
    /// Tesseract language (e.g. "eng", "eng+deu")
    pub language: String,
    /// Windows OCR language tag (e.g. "en-US")
    pub windows_language: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
            windows_language: "en-US".to_string(),
        }
    }
}

/// Permission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSettings {
    /// Capabilities granted at start-up
    pub granted: Vec<Capability>,
    /// Grant capabilities when they are requested
    pub grant_on_request: bool,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            granted: Vec::new(),
            grant_on_request: true,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
