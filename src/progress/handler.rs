//! Progress handler trait and events

use crate::build::BuildState;
use crate::provision::{ResourceKind, ResourceStatus};
use std::time::Duration;
use uuid::Uuid;

/// Events emitted while a deployment moves through the pipeline
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Deployment accepted and its worker started
    DeploymentStarted {
        deployment_id: String,
        repository: String,
    },

    /// Repository checked out into the workspace
    SourceFetched {
        deployment_id: String,
        duration: Duration,
    },

    /// Analyzer result routed to a handler
    StackResolved {
        deployment_id: String,
        stack: String,
        handler: String,
        fallback: bool,
    },

    /// Build job entered a state
    PhaseStarted { job_id: Uuid, state: BuildState },

    /// Build job left a state successfully
    PhaseComplete {
        job_id: Uuid,
        state: BuildState,
        duration: Duration,
    },

    /// One cloud resource reported by the provisioner
    ResourceProvisioned {
        deployment_id: String,
        kind: ResourceKind,
        name: String,
        status: ResourceStatus,
    },

    /// Deployment reached `ready`
    Completed {
        deployment_id: String,
        url: Option<String>,
        total_time: Duration,
    },

    /// Deployment reached `failed`
    Failed {
        deployment_id: String,
        error: String,
    },
}

/// Trait for handling progress events during a deployment
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
