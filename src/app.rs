//! Application Coordinator
//!
//! Runs the workflow controller on a single tokio task. User actions and the
//! completions of spawned work (permission requests, acquisitions,
//! recognitions) arrive on one event channel and are applied in order, so
//! the controller never sees concurrent mutation. The latest [`UiState`] is
//! published on a watch channel and notices on an mpsc channel.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clipboard::ClipboardExporter;
use crate::permissions::{PermissionGate, PermissionSystem};
use crate::source::ImageSource;
use crate::vision::RecognitionClient;
use crate::workflow::{Effect, Notice, UiState, UserAction, WorkflowController, WorkflowEvent};

/// External collaborators the workflow drives
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionSystem>,
    pub source: Arc<ImageSource>,
    pub recognizer: Arc<dyn RecognitionClient>,
    pub exporter: ClipboardExporter,
}

/// Front end for a running workflow
#[derive(Clone)]
pub struct WorkflowHandle {
    events: mpsc::UnboundedSender<WorkflowEvent>,
    ui: watch::Receiver<UiState>,
}

impl WorkflowHandle {
    /// Forward a user action to the controller
    pub fn send(&self, action: UserAction) -> Result<()> {
        self.events
            .send(WorkflowEvent::User(action))
            .map_err(|_| anyhow!("Workflow is not running"))
    }

    /// Latest UI state
    pub fn state(&self) -> UiState {
        self.ui.borrow().clone()
    }

    /// Subscribe to UI state changes
    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.ui.clone()
    }
}

/// Event loop owning the controller
pub struct WorkflowApp {
    controller: WorkflowController,
    permissions: Arc<dyn PermissionSystem>,
    source: Arc<ImageSource>,
    recognizer: Arc<dyn RecognitionClient>,
    exporter: ClipboardExporter,
    events_tx: mpsc::WeakUnboundedSender<WorkflowEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkflowEvent>,
    ui_tx: watch::Sender<UiState>,
    notices_tx: mpsc::UnboundedSender<Notice>,
}

impl WorkflowApp {
    /// Start the event loop on the current tokio runtime.
    ///
    /// The loop ends once every [`WorkflowHandle`] is dropped and no spawned
    /// work is still in flight.
    pub fn start(collaborators: Collaborators) -> (WorkflowHandle, mpsc::UnboundedReceiver<Notice>, JoinHandle<()>) {
        let Collaborators {
            permissions,
            source,
            recognizer,
            exporter,
        } = collaborators;

        let gate = PermissionGate::new(permissions.clone());
        gate.log_status();
        let controller = WorkflowController::new(gate);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = watch::channel(controller.ui_state());
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let app = Self {
            controller,
            permissions,
            source,
            recognizer,
            exporter,
            events_tx: events_tx.downgrade(),
            events_rx,
            ui_tx,
            notices_tx,
        };

        let task = tokio::spawn(app.run());
        let handle = WorkflowHandle {
            events: events_tx,
            ui: ui_rx,
        };
        (handle, notices_rx, task)
    }

    async fn run(mut self) {
        info!("Workflow started");
        while let Some(event) = self.events_rx.recv().await {
            self.dispatch(event);
        }
        info!("Workflow stopped");
    }

    /// Apply an event plus every synchronous follow-up it produces, then publish
    fn dispatch(&mut self, event: WorkflowEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            debug!("Event: {:?}", event);
            for effect in self.controller.handle(event) {
                if let Some(follow_up) = self.execute(effect) {
                    queue.push_back(follow_up);
                }
            }
        }

        let state = self.controller.ui_state();
        self.ui_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn execute(&mut self, effect: Effect) -> Option<WorkflowEvent> {
        match effect {
            Effect::RequestPermissions(request) => {
                let permissions = self.permissions.clone();
                self.spawn_completion(async move {
                    let results = permissions.request(request.capabilities).await;
                    WorkflowEvent::PermissionsResolved {
                        request_id: request.id,
                        results,
                    }
                });
                None
            }
            Effect::Acquire(kind) => {
                let source = self.source.clone();
                self.spawn_completion(async move {
                    let result = source.acquire(kind).await.map_err(|e| e.to_string());
                    WorkflowEvent::AcquisitionFinished { kind, result }
                });
                None
            }
            Effect::Recognize(request) => {
                let recognizer = self.recognizer.clone();
                self.spawn_completion(async move {
                    let outcome = recognizer.recognize(&request.handle).await;
                    WorkflowEvent::RecognitionFinished {
                        request_id: request.request_id,
                        outcome,
                    }
                });
                None
            }
            Effect::Export(text) => Some(WorkflowEvent::ExportFinished(
                self.exporter.export(text.as_deref()),
            )),
            Effect::Notify(notice) => {
                self.notify(notice);
                None
            }
        }
    }

    /// Run `work` off the control task and feed its result back as an event
    fn spawn_completion<F>(&self, work: F)
    where
        F: std::future::Future<Output = WorkflowEvent> + Send + 'static,
    {
        let Some(events) = self.events_tx.upgrade() else {
            debug!("No workflow handle left, dropping new work");
            return;
        };
        tokio::spawn(async move {
            let event = work.await;
            if events.send(event).is_err() {
                debug!("Workflow stopped before completion was delivered");
            }
        });
    }

    fn notify(&self, notice: Notice) {
        if notice.is_silent() {
            debug!("{}", notice);
            return;
        }
        if notice.is_error() {
            warn!("{}", notice);
        } else {
            info!("{}", notice);
        }
        let _ = self.notices_tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::error::WorkflowError;
    use crate::permissions::{Capability, ConfigPermissions};
    use crate::source::{CameraUi, FixedPicker, ImageHandle, PickerUi};
    use crate::vision::RecognitionOutcome;
    use crate::workflow::state::NO_TEXT_FOUND;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    /// Camera that waits for the test to say whether the picture was taken
    #[derive(Default)]
    struct GatedCamera {
        gate: Mutex<Option<oneshot::Receiver<bool>>>,
    }

    impl GatedCamera {
        fn gate(&self) -> oneshot::Sender<bool> {
            let (tx, rx) = oneshot::channel();
            *self.gate.lock() = Some(rx);
            tx
        }
    }

    #[async_trait]
    impl CameraUi for GatedCamera {
        async fn take_picture(&self, _destination: &Path) -> anyhow::Result<bool> {
            let gate = self.gate.lock().take();
            match gate {
                Some(rx) => Ok(rx.await.unwrap_or(false)),
                None => Ok(false),
            }
        }
    }

    /// Picker answering with the queued paths in order
    struct QueuedPicker {
        paths: Mutex<VecDeque<PathBuf>>,
    }

    #[async_trait]
    impl PickerUi for QueuedPicker {
        async fn pick_image(&self) -> anyhow::Result<Option<PathBuf>> {
            Ok(self.paths.lock().pop_front())
        }
    }

    /// Recognizer whose results are released by the test, per image
    #[derive(Default)]
    struct GatedRecognizer {
        gates: Mutex<HashMap<PathBuf, oneshot::Receiver<RecognitionOutcome>>>,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl GatedRecognizer {
        fn gate(&self, path: &str) -> oneshot::Sender<RecognitionOutcome> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(PathBuf::from(path), rx);
            tx
        }
    }

    #[async_trait]
    impl RecognitionClient for GatedRecognizer {
        async fn recognize(&self, handle: &ImageHandle) -> RecognitionOutcome {
            self.calls.lock().push(handle.location().to_path_buf());
            let gate = self.gates.lock().remove(handle.location());
            match gate {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| RecognitionOutcome::engine_failure("gate dropped")),
                None => RecognitionOutcome::success(""),
            }
        }
    }

    struct Harness {
        handle: WorkflowHandle,
        notices: mpsc::UnboundedReceiver<Notice>,
        recognizer: Arc<GatedRecognizer>,
        camera: Arc<GatedCamera>,
        clipboard: Arc<Mutex<Option<String>>>,
        _captures: TempDir,
    }

    fn start(
        granted: &[Capability],
        grant_on_request: bool,
        picker: Arc<dyn PickerUi>,
    ) -> Harness {
        let recognizer = Arc::new(GatedRecognizer::default());
        let camera = Arc::new(GatedCamera::default());
        let clipboard = MemoryClipboard::new();
        let content = clipboard.content();
        let captures = TempDir::new().unwrap();

        let collaborators = Collaborators {
            permissions: Arc::new(ConfigPermissions::new(granted.iter().copied(), grant_on_request)),
            source: Arc::new(ImageSource::new(
                camera.clone(),
                picker,
                captures.path(),
            )),
            recognizer: recognizer.clone(),
            exporter: ClipboardExporter::new(Box::new(clipboard)),
        };
        let (handle, notices, _task) = WorkflowApp::start(collaborators);

        Harness {
            handle,
            notices,
            recognizer,
            camera,
            clipboard: content,
            _captures: captures,
        }
    }

    fn queued(paths: &[&str]) -> Arc<dyn PickerUi> {
        Arc::new(QueuedPicker {
            paths: Mutex::new(paths.iter().map(PathBuf::from).collect()),
        })
    }

    async fn wait_for(handle: &WorkflowHandle, mut predicate: impl FnMut(&UiState) -> bool) -> UiState {
        let mut ui = handle.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(5), ui.wait_for(|s| predicate(s)))
            .await
            .expect("timed out waiting for UI state")
            .expect("workflow stopped");
        state.clone()
    }

    async fn next_notice(notices: &mut mpsc::UnboundedReceiver<Notice>) -> Notice {
        tokio::time::timeout(Duration::from_secs(5), notices.recv())
            .await
            .expect("timed out waiting for a notice")
            .expect("workflow stopped")
    }

    #[tokio::test]
    async fn test_select_process_copy() {
        let mut h = start(&Capability::ALL, false, queued(&["/photos/h1.png"]));
        let release = h.recognizer.gate("/photos/h1.png");

        h.handle.send(UserAction::Select).unwrap();
        let ui = wait_for(&h.handle, |s| s.has_image).await;
        assert_eq!(ui.image, Some(PathBuf::from("/photos/h1.png")));
        assert_eq!(ui.displayed_text, None);
        assert!(!ui.can_copy);

        h.handle.send(UserAction::Process).unwrap();
        wait_for(&h.handle, |s| s.is_processing).await;

        release.send(RecognitionOutcome::success("Hello World")).unwrap();
        let ui = wait_for(&h.handle, |s| !s.is_processing).await;
        assert_eq!(ui.displayed_text.as_deref(), Some("Hello World"));
        assert!(ui.can_copy);
        assert_eq!(next_notice(&mut h.notices).await, Notice::TextExtracted);

        h.handle.send(UserAction::Copy).unwrap();
        assert_eq!(next_notice(&mut h.notices).await, Notice::Copied);
        assert_eq!(h.clipboard.lock().as_deref(), Some("Hello World"));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_copyable() {
        let mut h = start(&Capability::ALL, false, queued(&["/photos/blank.png"]));

        h.handle.send(UserAction::Select).unwrap();
        wait_for(&h.handle, |s| s.has_image).await;
        h.handle.send(UserAction::Process).unwrap();

        let ui = wait_for(&h.handle, |s| s.displayed_text.is_some()).await;
        assert_eq!(ui.displayed_text.as_deref(), Some(NO_TEXT_FOUND));
        assert!(!ui.can_copy);
        assert_eq!(next_notice(&mut h.notices).await, Notice::NoTextDetected);

        h.handle.send(UserAction::Copy).unwrap();
        assert_eq!(
            next_notice(&mut h.notices).await,
            Notice::Failed(WorkflowError::NothingToCopy)
        );
        assert!(h.clipboard.lock().is_none());
    }

    #[tokio::test]
    async fn test_superseded_outcome_is_discarded() {
        let mut h = start(
            &Capability::ALL,
            false,
            queued(&["/photos/h1.png", "/photos/h2.png"]),
        );
        let release_h1 = h.recognizer.gate("/photos/h1.png");
        let release_h2 = h.recognizer.gate("/photos/h2.png");

        h.handle.send(UserAction::Select).unwrap();
        wait_for(&h.handle, |s| s.has_image).await;
        h.handle.send(UserAction::Process).unwrap();
        wait_for(&h.handle, |s| s.is_processing).await;

        // Extra triggers while processing do not reach the recognizer
        h.handle.send(UserAction::Process).unwrap();
        h.handle.send(UserAction::Process).unwrap();

        h.handle.send(UserAction::Select).unwrap();
        let ready = wait_for(&h.handle, |s| {
            s.image.as_deref() == Some(Path::new("/photos/h2.png"))
        })
        .await;
        assert!(!ready.is_processing);
        assert!(ready.can_process);

        // The h1 outcome arrives late and must not touch the h2 state
        release_h1.send(RecognitionOutcome::success("from h1")).unwrap();
        h.handle.send(UserAction::Process).unwrap();
        wait_for(&h.handle, |s| s.is_processing).await;

        release_h2.send(RecognitionOutcome::success("from h2")).unwrap();
        let ui = wait_for(&h.handle, |s| !s.is_processing).await;
        assert_eq!(ui.displayed_text.as_deref(), Some("from h2"));
        assert_eq!(next_notice(&mut h.notices).await, Notice::TextExtracted);

        let calls = h.recognizer.calls.lock().clone();
        assert_eq!(
            calls,
            vec![PathBuf::from("/photos/h1.png"), PathBuf::from("/photos/h2.png")]
        );
    }

    #[tokio::test]
    async fn test_permission_requested_then_action_resumes() {
        let mut h = start(&[], true, Arc::new(FixedPicker::new(Some(PathBuf::from("/photos/h1.png")))));

        h.handle.send(UserAction::Select).unwrap();
        assert_eq!(next_notice(&mut h.notices).await, Notice::PermissionsGranted);
        let ui = wait_for(&h.handle, |s| s.has_image).await;
        assert!(!ui.is_acquiring);
    }

    #[tokio::test]
    async fn test_permission_denied_abandons_action() {
        let mut h = start(&[Capability::Capture], false, queued(&["/photos/h1.png"]));

        h.handle.send(UserAction::Select).unwrap();
        assert_eq!(
            next_notice(&mut h.notices).await,
            Notice::Failed(WorkflowError::PermissionDenied(vec![Capability::ReadMedia]))
        );
        let ui = wait_for(&h.handle, |s| !s.is_acquiring).await;
        assert!(!ui.has_image);
    }

    #[tokio::test]
    async fn test_cancelled_capture_is_silent() {
        let mut h = start(&Capability::ALL, false, queued(&["/photos/h1.png"]));

        h.handle.send(UserAction::Select).unwrap();
        wait_for(&h.handle, |s| s.has_image).await;
        let before = h.handle.state();

        let release = h.camera.gate();
        h.handle.send(UserAction::Capture).unwrap();
        wait_for(&h.handle, |s| s.is_acquiring).await;
        release.send(false).unwrap();
        let after = wait_for(&h.handle, |s| !s.is_acquiring).await;

        assert_eq!(after, before);
        assert!(h.notices.try_recv().is_err());
    }
}
