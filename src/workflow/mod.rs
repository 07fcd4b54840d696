//! Workflow Controller
//!
//! The acquire → recognize → present state machine. The controller is a
//! reducer: it consumes one [`WorkflowEvent`] at a time and answers with the
//! [`Effect`]s the runtime has to carry out. It never awaits anything
//! itself, so all transitions are serialized by whoever feeds it events.
//!
//! Rules it enforces:
//! - at most one recognition request is outstanding; "process" while
//!   processing is a no-op
//! - an outcome is applied only if its request id is the outstanding one
//! - a new image supersedes the old one and clears its result
//! - cancelled acquisitions change nothing

pub mod messages;
pub mod state;

use tracing::{debug, info};

use crate::clipboard::ExportError;
use crate::error::WorkflowError;
use crate::permissions::{Capability, CapabilitySet, Decision, GrantResults, GrantVerdict, PermissionGate};
use crate::source::{Acquisition, AcquisitionKind};
use crate::vision::{FailureKind, RecognitionOutcome};

pub use messages::{Effect, Notice, RecognitionRequest, UserAction, WorkflowEvent};
pub use state::{DisplayedText, Phase, UiState};

/// Capabilities an acquisition needs
pub fn required_capabilities(kind: AcquisitionKind) -> CapabilitySet {
    match kind {
        AcquisitionKind::Capture => [Capability::Capture].into_iter().collect(),
        AcquisitionKind::Select => [Capability::ReadMedia].into_iter().collect(),
    }
}

/// Acquisition the user started that has not finished yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAcquisition {
    /// Suspended until the permission request answers
    AwaitingPermission { request_id: u64, kind: AcquisitionKind },
    /// Camera or picker is running
    Acquiring(AcquisitionKind),
}

/// The workflow state machine
pub struct WorkflowController {
    gate: PermissionGate,
    phase: Phase,
    pending: Option<PendingAcquisition>,
    last_request_id: u64,
}

impl WorkflowController {
    pub fn new(gate: PermissionGate) -> Self {
        Self {
            gate,
            phase: Phase::Idle,
            pending: None,
            last_request_id: 0,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Current UI snapshot
    pub fn ui_state(&self) -> UiState {
        UiState::derive(&self.phase, self.pending.is_some())
    }

    /// Apply one event and return the work it triggers
    pub fn handle(&mut self, event: WorkflowEvent) -> Vec<Effect> {
        match event {
            WorkflowEvent::User(UserAction::Capture) => self.begin_acquisition(AcquisitionKind::Capture),
            WorkflowEvent::User(UserAction::Select) => self.begin_acquisition(AcquisitionKind::Select),
            WorkflowEvent::User(UserAction::Process) => self.begin_processing(),
            WorkflowEvent::User(UserAction::Copy) => self.begin_copy(),
            WorkflowEvent::PermissionsResolved { request_id, results } => {
                self.on_permissions(request_id, &results)
            }
            WorkflowEvent::AcquisitionFinished { kind, result } => self.on_acquisition(kind, result),
            WorkflowEvent::RecognitionFinished { request_id, outcome } => {
                self.on_recognition(request_id, outcome)
            }
            WorkflowEvent::ExportFinished(result) => self.on_export(result),
        }
    }

    fn begin_acquisition(&mut self, kind: AcquisitionKind) -> Vec<Effect> {
        if let Some(pending) = self.pending {
            debug!("Ignoring {} while {:?} is outstanding", kind.name(), pending);
            return vec![];
        }

        match self.gate.ensure(&required_capabilities(kind)) {
            Decision::AlreadyGranted => {
                self.pending = Some(PendingAcquisition::Acquiring(kind));
                vec![Effect::Acquire(kind)]
            }
            Decision::Requested(request) => {
                self.pending = Some(PendingAcquisition::AwaitingPermission {
                    request_id: request.id,
                    kind,
                });
                vec![Effect::RequestPermissions(request)]
            }
        }
    }

    fn on_permissions(&mut self, request_id: u64, results: &GrantResults) -> Vec<Effect> {
        let kind = match self.pending {
            Some(PendingAcquisition::AwaitingPermission { request_id: id, kind }) if id == request_id => kind,
            _ => {
                debug!("Discarding answer for permission request {}", request_id);
                return vec![];
            }
        };

        match self.gate.complete(request_id, results) {
            Some(GrantVerdict::Granted) => {
                self.pending = Some(PendingAcquisition::Acquiring(kind));
                vec![
                    Effect::Notify(Notice::PermissionsGranted),
                    Effect::Acquire(kind),
                ]
            }
            Some(GrantVerdict::Denied(denied)) => {
                self.pending = None;
                vec![Effect::Notify(Notice::Failed(WorkflowError::PermissionDenied(denied)))]
            }
            None => vec![],
        }
    }

    fn on_acquisition(&mut self, kind: AcquisitionKind, result: Result<Acquisition, String>) -> Vec<Effect> {
        if self.pending != Some(PendingAcquisition::Acquiring(kind)) {
            debug!("Discarding unexpected {} completion", kind.name());
            return vec![];
        }
        self.pending = None;

        match result {
            Ok(Acquisition::Acquired(handle)) => {
                if let Some(request_id) = self.phase.outstanding_request() {
                    info!("New image supersedes recognition request {}", request_id);
                }
                info!("Image ready ({}): {}", handle.kind().name(), handle);
                self.phase = Phase::ImageReady { handle };
                vec![]
            }
            Ok(Acquisition::Cancelled) => {
                vec![Effect::Notify(Notice::Failed(WorkflowError::AcquisitionCancelled))]
            }
            Err(message) => {
                vec![Effect::Notify(Notice::Failed(WorkflowError::AcquisitionFailed(message)))]
            }
        }
    }

    fn begin_processing(&mut self) -> Vec<Effect> {
        let (handle, previous) = match &self.phase {
            Phase::Idle => {
                debug!("Process requested without an image");
                return vec![];
            }
            Phase::Processing { request_id, .. } => {
                debug!("Process requested while request {} is outstanding", request_id);
                return vec![];
            }
            Phase::ImageReady { handle } => (handle.clone(), None),
            Phase::Resolved { handle, result } => (handle.clone(), Some(result.clone())),
        };

        self.last_request_id += 1;
        let request_id = self.last_request_id;
        info!("Starting recognition request {} for {}", request_id, handle);

        self.phase = Phase::Processing {
            handle: handle.clone(),
            request_id,
            previous,
        };
        vec![Effect::Recognize(RecognitionRequest { handle, request_id })]
    }

    fn on_recognition(&mut self, request_id: u64, outcome: RecognitionOutcome) -> Vec<Effect> {
        let handle = match &self.phase {
            Phase::Processing {
                handle,
                request_id: outstanding,
                ..
            } if *outstanding == request_id => handle.clone(),
            _ => {
                debug!("Discarding stale outcome for request {}", request_id);
                return vec![];
            }
        };

        let (result, notice) = match outcome {
            RecognitionOutcome::Success { text } if !text.is_empty() => {
                (DisplayedText::Recognized(text), Notice::TextExtracted)
            }
            RecognitionOutcome::Success { .. } => (DisplayedText::NoTextFound, Notice::NoTextDetected),
            RecognitionOutcome::Failure { kind, message } => {
                let error = match kind {
                    FailureKind::Decode => WorkflowError::DecodeFailure(message.clone()),
                    FailureKind::Engine => WorkflowError::RecognitionFailure(message.clone()),
                };
                (DisplayedText::Error(message), Notice::Failed(error))
            }
        };

        info!("Recognition request {} resolved: {}", request_id, notice);
        self.phase = Phase::Resolved { handle, result };
        vec![Effect::Notify(notice)]
    }

    fn begin_copy(&self) -> Vec<Effect> {
        let text = match &self.phase {
            Phase::Resolved { result, .. } => result.copyable().map(str::to_owned),
            _ => None,
        };
        vec![Effect::Export(text)]
    }

    fn on_export(&self, result: Result<(), ExportError>) -> Vec<Effect> {
        let notice = match result {
            Ok(()) => Notice::Copied,
            Err(ExportError::NothingToCopy) => Notice::Failed(WorkflowError::NothingToCopy),
            Err(ExportError::Clipboard(message)) => {
                Notice::Failed(WorkflowError::ClipboardUnavailable(message))
            }
        };
        vec![Effect::Notify(notice)]
    }
}
