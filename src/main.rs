//! SnapText - extract text from a photo or an existing image
//!
//! Capture a picture or pick an image, run OCR on it and copy the result to
//! the clipboard. Camera, picker, OCR engine and clipboard are external
//! collaborators; the workflow itself lives in [`workflow`].

mod app;
mod clipboard;
mod config;
mod error;
mod permissions;
mod source;
mod storage;
mod vision;
mod workflow;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::{Collaborators, WorkflowApp, WorkflowHandle};
use crate::clipboard::{Clipboard, ClipboardExporter, ClipboardHold, MemoryClipboard, SystemClipboard};
use crate::config::{AppConfig, GeneralConfig};
use crate::permissions::ConfigPermissions;
use crate::source::{CommandCamera, CommandPicker, FixedPicker, ImageSource, PickerUi};
use crate::vision::OcrBackend;
use crate::workflow::{Notice, UiState, UserAction};

/// SnapText - capture or pick an image and extract its text
#[derive(Parser, Debug)]
#[command(name = "snaptext")]
#[command(about = "Capture or pick an image, extract its text with OCR, and copy it")]
struct Args {
    /// Configuration file (defaults to the per-user config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recognize this image and exit instead of starting the prompt
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// With --image: copy the recognized text to the clipboard
    #[arg(long, requires = "image")]
    copy: bool,

    /// With --image: print the final UI state as JSON
    #[arg(long, requires = "image")]
    json: bool,

    /// OCR backend, overriding the configuration
    #[arg(long, value_enum)]
    backend: Option<OcrBackend>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

/// One line typed at the interactive prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptCommand {
    Action(UserAction),
    Status,
    Help,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::default_config_path()?,
    };

    if args.write_default_config {
        config::save_config(&AppConfig::default(), &config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let (mut config, loaded) = load_or_create_config(&config_path, args.config.is_some())?;
    if let Some(backend) = args.backend {
        config.recognition.backend = backend;
    }

    // Initialize logging
    let level = args.log_level.as_deref().unwrap_or(&config.general.log_level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("SnapText starting...");
    if loaded {
        info!("Loaded configuration from {:?}", config_path);
    } else {
        info!("Using default configuration");
    }

    let hold = ClipboardHold::default();
    let collaborators = build_collaborators(&config, args.image.clone(), &hold)?;
    let (handle, notices, task) = WorkflowApp::start(collaborators);

    let result = if args.image.is_some() {
        run_once(&handle, notices, args.copy, args.json).await
    } else {
        run_interactive(&handle, notices).await
    };

    drop(handle);
    if let Err(e) = task.await {
        warn!("Workflow task ended abnormally: {}", e);
    }

    if !hold.is_empty() {
        info!(
            "Keeping the copied text available until another program takes the clipboard (up to {}s)",
            config.general.clipboard_hold_secs
        );
        tokio::task::spawn_blocking(move || hold.wait()).await?;
    }

    info!("SnapText shutdown complete");
    result
}

/// Load configuration from file or fall back to defaults.
///
/// A missing or broken file is only an error when it was named explicitly.
fn load_or_create_config(path: &Path, explicit: bool) -> Result<(AppConfig, bool)> {
    if path.exists() {
        match config::load_config(path) {
            Ok(config) => return Ok((config, true)),
            Err(e) if explicit => return Err(e),
            Err(e) => eprintln!("Ignoring configuration: {:#}", e),
        }
    } else if explicit {
        bail!("Configuration file {:?} does not exist", path);
    }
    Ok((AppConfig::default(), false))
}

/// Wire the configured collaborators together.
///
/// A one-shot run (`image` given) exits right after copying, so its system
/// clipboard registers the copied content in `hold`.
fn build_collaborators(config: &AppConfig, image: Option<PathBuf>, hold: &ClipboardHold) -> Result<Collaborators> {
    let clipboard = build_clipboard(&config.general, image.is_some(), hold);

    let permissions = Arc::new(ConfigPermissions::new(
        config.permissions.granted.iter().copied(),
        config.permissions.grant_on_request,
    ));

    let capture_dir = match &config.capture.directory {
        Some(dir) => dir.clone(),
        None => storage::get_capture_dir()?,
    };
    let camera = Arc::new(CommandCamera::new(config.capture.command.clone()));
    let picker: Arc<dyn PickerUi> = match image {
        Some(path) => Arc::new(FixedPicker::new(Some(path))),
        None => Arc::new(CommandPicker::new(config.picker.command.clone())),
    };

    let recognizer = vision::create_recognizer(&config.recognition)?;

    Ok(Collaborators {
        permissions,
        source: Arc::new(ImageSource::new(camera, picker, capture_dir)),
        recognizer,
        exporter: ClipboardExporter::new(clipboard),
    })
}

fn build_clipboard(general: &GeneralConfig, one_shot: bool, hold: &ClipboardHold) -> Box<dyn Clipboard> {
    if !general.use_system_clipboard {
        return Box::new(MemoryClipboard::new());
    }
    if one_shot {
        let duration = Duration::from_secs(general.clipboard_hold_secs);
        Box::new(SystemClipboard::holding(duration, hold.clone()))
    } else {
        Box::new(SystemClipboard::new())
    }
}

/// Select the given image, recognize it, optionally copy, and print the result
async fn run_once(
    handle: &WorkflowHandle,
    mut notices: mpsc::UnboundedReceiver<Notice>,
    copy: bool,
    json: bool,
) -> Result<()> {
    handle.send(UserAction::Select)?;
    wait_until(handle, &mut notices, |s| s.has_image).await?;

    handle.send(UserAction::Process)?;
    let state = wait_until(handle, &mut notices, |s| !s.is_processing && s.displayed_text.is_some()).await?;

    if copy {
        handle.send(UserAction::Copy)?;
        loop {
            match notices.recv().await {
                Some(Notice::Copied) => break,
                Some(notice) if notice.is_error() => bail!("{}", notice),
                Some(_) => continue,
                None => bail!("Workflow stopped before the copy finished"),
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else if let Some(text) = &state.displayed_text {
        println!("{}", text);
    }
    Ok(())
}

/// Wait for a UI state matching `predicate`; an error notice aborts the wait
async fn wait_until(
    handle: &WorkflowHandle,
    notices: &mut mpsc::UnboundedReceiver<Notice>,
    mut predicate: impl FnMut(&UiState) -> bool,
) -> Result<UiState> {
    let mut ui = handle.subscribe();
    loop {
        // Notices are queued before the state they belong to is published
        tokio::select! {
            biased;
            notice = notices.recv() => match notice {
                Some(notice) if notice.is_error() => bail!("{}", notice),
                Some(notice) => info!("{}", notice),
                None => bail!("Workflow stopped"),
            },
            state = ui.wait_for(|s| predicate(s)) => {
                let state = state.context("Workflow stopped")?;
                return Ok(state.clone());
            }
        }
    }
}

/// Line-oriented prompt driving the workflow
async fn run_interactive(handle: &WorkflowHandle, mut notices: mpsc::UnboundedReceiver<Notice>) -> Result<()> {
    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ui = handle.subscribe();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(PromptCommand::Action(action)) => handle.send(action)?,
                    Some(PromptCommand::Status) => print_state(&handle.state()),
                    Some(PromptCommand::Help) => print_help(),
                    Some(PromptCommand::Quit) => break,
                    None => println!("Unknown command '{}', type 'help'", line.trim()),
                }
            }
            Some(notice) = notices.recv() => {
                let marker = if notice.is_error() { "!" } else { "*" };
                println!("{} {}", marker, notice);
            }
            changed = ui.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = ui.borrow_and_update().clone();
                print_state(&state);
            }
        }
    }
    Ok(())
}

fn parse_command(line: &str) -> Option<PromptCommand> {
    let command = match line.trim().to_lowercase().as_str() {
        "capture" | "photo" | "c" => PromptCommand::Action(UserAction::Capture),
        "select" | "open" | "s" => PromptCommand::Action(UserAction::Select),
        "process" | "ocr" | "p" => PromptCommand::Action(UserAction::Process),
        "copy" | "y" => PromptCommand::Action(UserAction::Copy),
        "status" | "st" => PromptCommand::Status,
        "help" | "h" | "?" => PromptCommand::Help,
        "quit" | "exit" | "q" => PromptCommand::Quit,
        _ => return None,
    };
    Some(command)
}

fn print_help() {
    println!("Commands:");
    println!("  capture  take a new picture");
    println!("  select   choose an existing image");
    println!("  process  extract text from the current image");
    println!("  copy     copy the extracted text");
    println!("  status   show the current state");
    println!("  quit     exit");
}

fn print_state(state: &UiState) {
    let on_off = |enabled: bool| if enabled { "on" } else { "off" };

    match &state.image {
        Some(image) => println!("Image: {}", image.display()),
        None => println!("Image: none"),
    }
    if state.is_acquiring {
        println!("Waiting for image...");
    }
    if state.is_processing {
        println!("Processing...");
    }
    if let Some(text) = &state.displayed_text {
        println!("--- text ---\n{}\n------------", text);
    }
    println!("process: {}  copy: {}", on_off(state.can_process), on_off(state.can_copy));
}
