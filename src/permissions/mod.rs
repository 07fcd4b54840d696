//! Permission Gate
//!
//! Tracks whether the capabilities an action needs are granted and runs the
//! check-then-request protocol against the platform permission subsystem.
//! A gated action only proceeds when every requested capability came back
//! granted; a partial grant abandons the action.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A capability guarded by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Taking a new picture
    Capture,
    /// Reading existing images from storage
    ReadMedia,
}

impl Capability {
    /// Every capability the workflow knows about
    pub const ALL: [Capability; 2] = [Capability::Capture, Capability::ReadMedia];

    /// Human readable name
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Capture => "camera",
            Capability::ReadMedia => "read media",
        }
    }
}

/// Set of capabilities an action requires
pub type CapabilitySet = BTreeSet<Capability>;

/// Answer of the permission subsystem for one request
pub type GrantResults = BTreeMap<Capability, bool>;

/// Platform permission subsystem
#[async_trait]
pub trait PermissionSystem: Send + Sync {
    /// Current grant state as reported by the platform
    fn is_granted(&self, capability: Capability) -> bool;

    /// Ask the user for the given capabilities in one batch
    async fn request(&self, capabilities: CapabilitySet) -> GrantResults;
}

/// A batched permission request waiting for its answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub id: u64,
    pub capabilities: CapabilitySet,
}

/// Result of [`PermissionGate::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Everything is granted, the caller may proceed right away
    AlreadyGranted,
    /// A request was issued; the caller resumes only on its completion
    Requested(PermissionRequest),
}

/// How a completed request resolves the gated action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantVerdict {
    Granted,
    Denied(Vec<Capability>),
}

/// Check-then-request protocol over a [`PermissionSystem`]
pub struct PermissionGate {
    system: Arc<dyn PermissionSystem>,
    next_request_id: u64,
    pending: Option<PermissionRequest>,
}

impl PermissionGate {
    pub fn new(system: Arc<dyn PermissionSystem>) -> Self {
        Self {
            system,
            next_request_id: 0,
            pending: None,
        }
    }

    pub fn is_granted(&self, capability: Capability) -> bool {
        self.system.is_granted(capability)
    }

    /// Whether a request is waiting for its answer
    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Capabilities from `required` that are not granted right now
    pub fn missing(&self, required: &CapabilitySet) -> CapabilitySet {
        required
            .iter()
            .copied()
            .filter(|c| !self.is_granted(*c))
            .collect()
    }

    /// Check `required`, issuing one batched request for whatever is missing
    pub fn ensure(&mut self, required: &CapabilitySet) -> Decision {
        let missing = self.missing(required);
        if missing.is_empty() {
            return Decision::AlreadyGranted;
        }

        self.next_request_id += 1;
        let request = PermissionRequest {
            id: self.next_request_id,
            capabilities: missing,
        };
        info!(
            "Requesting permissions (request {}): {:?}",
            request.id, request.capabilities
        );
        self.pending = Some(request.clone());
        Decision::Requested(request)
    }

    /// Apply the answer for a pending request.
    ///
    /// Returns `None` when `request_id` is not the pending request.
    pub fn complete(&mut self, request_id: u64, results: &GrantResults) -> Option<GrantVerdict> {
        let request = match self.pending.take() {
            Some(request) if request.id == request_id => request,
            other => {
                self.pending = other;
                debug!("Ignoring answer for unknown permission request {}", request_id);
                return None;
            }
        };

        let denied: Vec<Capability> = request
            .capabilities
            .iter()
            .copied()
            .filter(|c| !results.get(c).copied().unwrap_or(false))
            .collect();

        if denied.is_empty() {
            info!("Permissions granted (request {})", request_id);
            Some(GrantVerdict::Granted)
        } else {
            warn!("Permissions denied (request {}): {:?}", request_id, denied);
            Some(GrantVerdict::Denied(denied))
        }
    }

    /// Log the grant status of every capability
    pub fn log_status(&self) {
        for capability in Capability::ALL {
            info!(
                "Permission '{}': {}",
                capability.name(),
                if self.is_granted(capability) { "granted" } else { "not granted" }
            );
        }
    }
}

/// Permission subsystem backed by configuration.
///
/// Starts from the configured grants and answers requests with
/// `grant_on_request`. Granted capabilities stay granted for the process.
pub struct ConfigPermissions {
    granted: RwLock<CapabilitySet>,
    grant_on_request: bool,
}

impl ConfigPermissions {
    pub fn new(granted: impl IntoIterator<Item = Capability>, grant_on_request: bool) -> Self {
        Self {
            granted: RwLock::new(granted.into_iter().collect()),
            grant_on_request,
        }
    }
}

#[async_trait]
impl PermissionSystem for ConfigPermissions {
    fn is_granted(&self, capability: Capability) -> bool {
        self.granted.read().contains(&capability)
    }

    async fn request(&self, capabilities: CapabilitySet) -> GrantResults {
        let mut granted = self.granted.write();
        capabilities
            .into_iter()
            .map(|capability| {
                let allowed = granted.contains(&capability) || self.grant_on_request;
                if allowed {
                    granted.insert(capability);
                }
                (capability, allowed)
            })
            .collect()
    }
}
