//! Clipboard export
//!
//! Final step of the pipeline: puts the recognized text on the system
//! clipboard.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Clipboard collaborator
pub trait Clipboard: Send + Sync {
    fn set_text(&self, text: &str) -> anyhow::Result<()>;
}

/// Why an export did not happen
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("Nothing to copy")]
    NothingToCopy,
    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),
}

/// Copies displayed text to a [`Clipboard`]
pub struct ClipboardExporter {
    clipboard: Box<dyn Clipboard>,
}

impl ClipboardExporter {
    pub fn new(clipboard: Box<dyn Clipboard>) -> Self {
        Self { clipboard }
    }

    /// Copy `text`; fails with [`ExportError::NothingToCopy`] for none or empty
    pub fn export(&self, text: Option<&str>) -> Result<(), ExportError> {
        let text = match text {
            Some(text) if !text.is_empty() => text,
            _ => return Err(ExportError::NothingToCopy),
        };

        self.clipboard
            .set_text(text)
            .map_err(|e| ExportError::Clipboard(format!("{:#}", e)))?;

        info!("Copied {} characters to the clipboard", text.chars().count());
        Ok(())
    }
}

/// Background owners of clipboard content set by a holding [`SystemClipboard`].
///
/// On X11 and Wayland the copying process has to serve its selection; the
/// content is gone once it exits unless a clipboard manager took it over.
#[derive(Clone, Default)]
pub struct ClipboardHold {
    owners: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ClipboardHold {
    /// Whether no owner is serving content
    pub fn is_empty(&self) -> bool {
        self.owners.lock().is_empty()
    }

    /// Block until every owner has handed its content over or given up
    pub fn wait(&self) {
        let owners = std::mem::take(&mut *self.owners.lock());
        for owner in owners {
            if owner.join().is_err() {
                warn!("Clipboard owner thread panicked");
            }
        }
    }

    #[cfg(target_os = "linux")]
    fn push(&self, owner: JoinHandle<()>) {
        self.owners.lock().push(owner);
    }
}

/// System clipboard via `arboard`.
///
/// The handle is opened lazily so that headless sessions only fail when a
/// copy is actually attempted.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Mutex<Option<arboard::Clipboard>>,
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    hold: Option<(Duration, ClipboardHold)>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clipboard for a process that exits right after copying.
    ///
    /// On Linux each copy is served from its own thread, registered in
    /// `hold`, until another program owns the clipboard or `duration` ends.
    /// Elsewhere the platform keeps the content and this behaves like
    /// [`SystemClipboard::new`].
    pub fn holding(duration: Duration, hold: ClipboardHold) -> Self {
        Self {
            inner: Mutex::new(None),
            hold: Some((duration, hold)),
        }
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: &str) -> anyhow::Result<()> {
        #[cfg(target_os = "linux")]
        if let Some((duration, hold)) = &self.hold {
            return set_text_held(text, *duration, hold);
        }

        let mut inner = self.inner.lock();
        if inner.is_none() {
            debug!("Opening system clipboard");
            *inner = Some(arboard::Clipboard::new()?);
        }

        if let Some(clipboard) = inner.as_mut() {
            clipboard.set_text(text.to_owned())?;
        }
        Ok(())
    }
}

/// Set `text` from a dedicated owner thread that keeps serving it
#[cfg(target_os = "linux")]
fn set_text_held(text: &str, duration: Duration, hold: &ClipboardHold) -> anyhow::Result<()> {
    use arboard::SetExtLinux;
    use std::time::Instant;

    let (opened_tx, opened_rx) = std::sync::mpsc::channel();
    let text = text.to_owned();

    let owner = std::thread::Builder::new()
        .name("clipboard-owner".to_string())
        .spawn(move || {
            let mut clipboard = match arboard::Clipboard::new() {
                Ok(clipboard) => {
                    let _ = opened_tx.send(Ok(()));
                    clipboard
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };

            let deadline = Instant::now() + duration;
            match clipboard.set().wait_until(deadline).text(text) {
                Ok(()) => debug!("Clipboard content released"),
                Err(e) => warn!("Failed to serve clipboard content: {}", e),
            }
        })?;

    match opened_rx.recv() {
        Ok(Ok(())) => {
            hold.push(owner);
            Ok(())
        }
        Ok(Err(e)) => {
            let _ = owner.join();
            Err(e.into())
        }
        Err(_) => {
            let _ = owner.join();
            anyhow::bail!("Clipboard owner exited before opening the clipboard")
        }
    }
}

/// In-process clipboard, used when no system clipboard is wanted
#[derive(Default)]
pub struct MemoryClipboard {
    content: Arc<Mutex<Option<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the clipboard content
    #[cfg(test)]
    pub fn content(&self) -> Arc<Mutex<Option<String>>> {
        self.content.clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&self, text: &str) -> anyhow::Result<()> {
        *self.content.lock() = Some(text.to_owned());
        Ok(())
    }
}
