//! Camera and picker collaborators backed by external helper programs
//!
//! Desktop systems have no single camera or file-chooser API, so both are
//! configured as argv lists (e.g. `fswebcam` / `zenity`). The placeholder
//! `{output}` in the camera command is replaced with the destination path.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CameraUi, PickerUi};

/// Placeholder substituted with the capture destination
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

fn split_command(argv: &[String]) -> Result<(&str, &[String])> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("Helper command is empty"))?;
    Ok((program.as_str(), args))
}

/// Camera that shells out to a capture program
#[derive(Debug, Clone)]
pub struct CommandCamera {
    argv: Vec<String>,
}

impl CommandCamera {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    fn args_for(&self, destination: &Path) -> Vec<String> {
        let output = destination.to_string_lossy();
        self.argv
            .iter()
            .skip(1)
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }
}

#[async_trait]
impl CameraUi for CommandCamera {
    async fn take_picture(&self, destination: &Path) -> Result<bool> {
        let (program, _) = split_command(&self.argv)?;
        let args = self.args_for(destination);
        debug!("Running camera helper: {} {:?}", program, args);

        let output = Command::new(program)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to run camera helper '{}'", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Camera helper exited with {}: {}", output.status, stderr.trim());
            return Ok(false);
        }

        // The helper only reports success; the agreed location must hold the picture.
        Ok(tokio::fs::try_exists(destination).await.unwrap_or(false))
    }
}

/// Picker that shells out to a file chooser and reads the path from stdout
#[derive(Debug, Clone)]
pub struct CommandPicker {
    argv: Vec<String>,
}

impl CommandPicker {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl PickerUi for CommandPicker {
    async fn pick_image(&self) -> Result<Option<PathBuf>> {
        let (program, args) = split_command(&self.argv)?;
        debug!("Running picker helper: {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run picker helper '{}'", program))?;

        // File choosers exit non-zero when the dialog is dismissed
        if !output.status.success() {
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Ok(None);
        };

        let path = PathBuf::from(line);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            warn!("Picker returned a path that does not exist: {:?}", path);
            return Ok(None);
        }
        Ok(Some(path))
    }
}

/// Picker that always answers with a preset path (or cancels if none)
#[derive(Debug, Clone, Default)]
pub struct FixedPicker {
    path: Option<PathBuf>,
}

impl FixedPicker {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PickerUi for FixedPicker {
    async fn pick_image(&self) -> Result<Option<PathBuf>> {
        Ok(self.path.clone())
    }
}
