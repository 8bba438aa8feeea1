//! Cloud resource naming and provisioning
//!
//! The [`Provisioner`] trait is the seam between the deployment pipeline and
//! the cloud. [`AwsProvisioner`] talks to S3, CloudFront, CodeBuild and STS
//! through [`CloudClients`]; [`DryRunProvisioner`] plans the same resources
//! without touching the network.

pub mod aws;
pub mod clients;
pub mod dry_run;
pub mod naming;

pub use aws::{AwsProvisioner, ManagedBuildSettings};
pub use clients::{CloudClients, CloudSettings};
pub use dry_run::DryRunProvisioner;
pub use naming::{is_valid_bucket_name, ResourceNamer, MAX_NAME_LEN};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Kind of cloud resource a deployment may need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Storage,
    Cdn,
    ManagedBuild,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Storage, Self::Cdn, Self::ManagedBuild];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Cdn => "cdn",
            Self::ManagedBuild => "managed-build",
        }
    }

    /// Segment used inside generated resource names
    pub fn name_segment(&self) -> &'static str {
        match self {
            Self::Storage => "site",
            Self::Cdn => "cdn",
            Self::ManagedBuild => "build",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Created,
    /// Computed but not created (dry run)
    Planned,
    Failed,
    /// Not attempted because a resource it depends on failed
    Skipped,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Planned => "planned",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for a single cloud resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub region: String,
    pub status: ResourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProvisionedResource {
    fn with_status(kind: ResourceKind, name: &str, region: &str, status: ResourceStatus) -> Self {
        Self {
            kind,
            name: name.to_string(),
            region: region.to_string(),
            status,
            endpoint: None,
            detail: None,
        }
    }

    pub fn created(kind: ResourceKind, name: &str, region: &str) -> Self {
        Self::with_status(kind, name, region, ResourceStatus::Created)
    }

    pub fn planned(kind: ResourceKind, name: &str, region: &str) -> Self {
        Self::with_status(kind, name, region, ResourceStatus::Planned)
    }

    pub fn failed(kind: ResourceKind, name: &str, region: &str, detail: impl Into<String>) -> Self {
        Self::with_status(kind, name, region, ResourceStatus::Failed).with_detail(detail)
    }

    pub fn skipped(kind: ResourceKind, name: &str, region: &str, detail: impl Into<String>) -> Self {
        Self::with_status(kind, name, region, ResourceStatus::Skipped).with_detail(detail)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == ResourceStatus::Failed
    }
}

/// Everything a provisioner needs to publish one deployment
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub deployment_id: String,
    pub project: String,
    /// Generated name per requested resource kind
    pub names: BTreeMap<ResourceKind, String>,
    pub staging_dir: PathBuf,
    pub entry_file: String,
    pub repository_url: String,
    pub install_command: Option<String>,
    pub build_command: Option<String>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReport {
    pub resources: Vec<ProvisionedResource>,
    pub url: Option<String>,
}

impl ProvisionReport {
    pub fn failures(&self) -> impl Iterator<Item = &ProvisionedResource> {
        self.resources.iter().filter(|r| r.is_failed())
    }

    /// `Ok` when no resource failed, otherwise an error carrying every
    /// resource outcome so partial results are not lost
    pub fn into_result(self) -> Result<ProvisionReport, ProvisioningError> {
        let failed: Vec<String> = self
            .failures()
            .map(|r| {
                format!(
                    "{} {}: {}",
                    r.kind,
                    r.name,
                    r.detail.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();
        if failed.is_empty() {
            return Ok(self);
        }
        Err(ProvisioningError {
            message: format!(
                "{} of {} resources failed ({})",
                failed.len(),
                self.resources.len(),
                failed.join("; ")
            ),
            resources: self.resources,
        })
    }
}

/// One or more resources could not be created. No rollback is attempted.
#[derive(Debug, Clone, Error)]
#[error("Provisioning failed: {message}")]
pub struct ProvisioningError {
    pub message: String,
    pub resources: Vec<ProvisionedResource>,
}

impl ProvisioningError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resources: Vec::new(),
        }
    }
}

/// Caller identity could not be established
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Credential validation failed: {0}")]
pub struct CredentialError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub account: Option<String>,
    pub arn: Option<String>,
    pub user_id: Option<String>,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn validate_credentials(&self) -> Result<CallerIdentity, CredentialError>;

    /// Creates every resource named in `request`, reporting each independently
    async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionReport, ProvisioningError>;
}
