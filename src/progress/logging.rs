//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use crate::provision::ResourceStatus;
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::DeploymentStarted {
                deployment_id,
                repository,
            } => {
                info!(deployment = %deployment_id, repo = %repository, "Starting deployment");
            }
            ProgressEvent::SourceFetched {
                deployment_id,
                duration,
            } => {
                info!(
                    deployment = %deployment_id,
                    duration_ms = duration.as_millis(),
                    "Source fetched"
                );
            }
            ProgressEvent::StackResolved {
                deployment_id,
                stack,
                handler,
                fallback,
            } => {
                if *fallback {
                    warn!(
                        deployment = %deployment_id,
                        stack = %stack,
                        handler = %handler,
                        "Stack not supported, using fallback handler"
                    );
                } else {
                    info!(deployment = %deployment_id, stack = %stack, handler = %handler, "Stack resolved");
                }
            }
            ProgressEvent::PhaseStarted { job_id, state } => {
                debug!(job = %job_id, state = %state, "Entering build state");
            }
            ProgressEvent::PhaseComplete {
                job_id,
                state,
                duration,
            } => {
                info!(
                    job = %job_id,
                    state = %state,
                    duration_ms = duration.as_millis(),
                    "Build phase complete"
                );
            }
            ProgressEvent::ResourceProvisioned {
                deployment_id,
                kind,
                name,
                status,
            } => {
                if *status == ResourceStatus::Failed {
                    warn!(deployment = %deployment_id, kind = %kind, name = %name, "Resource failed");
                } else {
                    info!(
                        deployment = %deployment_id,
                        kind = %kind,
                        name = %name,
                        status = %status,
                        "Resource provisioned"
                    );
                }
            }
            ProgressEvent::Completed {
                deployment_id,
                url,
                total_time,
            } => {
                info!(
                    deployment = %deployment_id,
                    url = url.as_deref().unwrap_or("-"),
                    total_time_ms = total_time.as_millis(),
                    "Deployment ready"
                );
            }
            ProgressEvent::Failed {
                deployment_id,
                error,
            } => {
                warn!(deployment = %deployment_id, error = %error, "Deployment failed");
            }
        }
    }
}
