//! Error taxonomy for the deployment pipeline
//!
//! Each concern owns its error type; [`DeployError`] unifies them at the
//! request boundary and maps every variant to an HTTP status and a stable
//! machine-readable kind.

use crate::build::BuildFailure;
use crate::provision::{CredentialError, ProvisioningError};
use crate::source::SourceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed client input. Never retried by the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No session identifier in header, body or query
    #[error("Missing session identifier")]
    MissingSession,

    /// Session identifier does not match the required pattern
    #[error("Invalid session identifier: {0}")]
    InvalidSession(String),

    /// Repository URL is not `https://<host>/<owner>/<repo>`
    #[error("Invalid repository URL: {0}")]
    InvalidRepositoryUrl(String),

    /// Project name contains disallowed characters or has a bad length
    #[error("Invalid project name: {0}")]
    InvalidProjectName(String),

    /// Request body is not the expected JSON document
    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),
}

/// The session issued too many requests inside the sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rate limit exceeded: {limit} requests per {window_secs}s, retry after {retry_after_secs}s")]
pub struct RateLimitError {
    pub limit: usize,
    pub window_secs: u64,
    pub retry_after_secs: u64,
}

/// Errors surfaced by the deployment service
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    /// A build is already running for this session
    #[error("Session {session_id} already has an active deployment ({deployment_id})")]
    Conflict {
        session_id: String,
        deployment_id: String,
    },

    #[error("Deployment not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Build(#[from] BuildFailure),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Stable identifier used in the `error` field of responses
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Validation(_) => "validation-error",
            DeployError::RateLimited(_) => "rate-limit-error",
            DeployError::Conflict { .. } => "conflict",
            DeployError::NotFound(_) => "not-found",
            DeployError::Source(_) => "source-error",
            DeployError::Build(failure) => failure.kind.as_str(),
            DeployError::Provisioning(_) => "provisioning-error",
            DeployError::Credential(_) => "credential-error",
            DeployError::Internal(_) => "internal-error",
        }
    }

    /// HTTP status semantics for the error
    pub fn status_code(&self) -> u16 {
        match self {
            DeployError::Validation(_) => 400,
            DeployError::NotFound(_) => 404,
            DeployError::Conflict { .. } => 409,
            DeployError::RateLimited(_) => 429,
            DeployError::Provisioning(_) | DeployError::Credential(_) => 502,
            DeployError::Source(_) | DeployError::Build(_) | DeployError::Internal(_) => 500,
        }
    }

    /// Seconds the caller should wait before retrying, for rate-limit rejections
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            DeployError::RateLimited(e) => Some(e.retry_after_secs),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Structured `{ error, message }` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildErrorKind;

    #[test]
    fn test_validation_maps_to_400() {
        let err = DeployError::from(ValidationError::MissingSession);
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.kind(), "validation-error");
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let err = DeployError::from(RateLimitError {
            limit: 60,
            window_secs: 60,
            retry_after_secs: 12,
        });
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.retry_after_secs(), Some(12));
    }

    #[test]
    fn test_build_failure_kind_is_specific() {
        let err = DeployError::from(BuildFailure::new(BuildErrorKind::Timeout, "too slow"));
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_error_body_serialization() {
        let body = DeployError::Conflict {
            session_id: "sess_abc".to_string(),
            deployment_id: "d1".to_string(),
        }
        .to_body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "conflict");
        assert!(json["message"].as_str().unwrap().contains("sess_abc"));
    }
}
