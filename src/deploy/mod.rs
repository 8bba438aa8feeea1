//! Deployment orchestration
//!
//! A deployment moves a repository through fetch, analysis, build and
//! provisioning on its own task. Callers get an id back immediately and poll
//! the [`DeploymentRecord`] until it reaches a terminal status.

pub mod service;

pub use service::{DeploymentService, DeploymentServiceBuilder, Submitted};

use crate::analysis::AnalysisResult;
use crate::build::BuildJob;
use crate::error::ErrorBody;
use crate::provision::{ProvisionedResource, ResourceKind};
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Inbound deployment request
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub repository_url: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
}

impl DeploymentRequest {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_project(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = Some(project_name.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.github_token = Some(token.into());
        self
    }
}

impl fmt::Debug for DeploymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentRequest")
            .field("repository_url", &self.repository_url)
            .field("project_name", &self.project_name)
            .field("session_id", &self.session_id)
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Fetching,
    Analyzing,
    Building,
    Provisioning,
    Ready,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Analyzing => "analyzing",
            Self::Building => "building",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one deployment, as returned to pollers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: String,
    pub session_id: SessionId,
    pub repository: String,
    pub project_name: String,
    pub status: DeploymentStatus,
    pub analysis: Option<AnalysisResult>,
    /// Name of the handler that produced the build plan
    pub handler: Option<String>,
    pub fallback: bool,
    pub build: BuildJob,
    pub resource_names: BTreeMap<ResourceKind, String>,
    pub resources: Vec<ProvisionedResource>,
    pub url: Option<String>,
    pub error: Option<ErrorBody>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    pub fn new(
        id: impl Into<String>,
        repository: impl Into<String>,
        project_name: impl Into<String>,
        build: BuildJob,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            session_id: build.session_id.clone(),
            repository: repository.into(),
            project_name: project_name.into(),
            status: DeploymentStatus::Pending,
            analysis: None,
            handler: None,
            fallback: false,
            build,
            resource_names: BTreeMap::new(),
            resources: Vec::new(),
            url: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Build log lines flattened to text, in arrival order
    pub fn log_text(&self) -> impl Iterator<Item = &str> {
        self.build.logs.iter().map(|l| l.line.as_str())
    }
}
