use super::{
    CallerIdentity, CredentialError, ProvisionReport, ProvisionRequest, ProvisionedResource,
    Provisioner, ProvisioningError,
};
use async_trait::async_trait;
use tracing::info;
use url::Url;

/// Plans resources without calling the cloud. The site URL points at the
/// staged entry file on the local filesystem.
#[derive(Debug, Clone)]
pub struct DryRunProvisioner {
    region: String,
}

impl DryRunProvisioner {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

#[async_trait]
impl Provisioner for DryRunProvisioner {
    async fn validate_credentials(&self) -> Result<CallerIdentity, CredentialError> {
        Ok(CallerIdentity {
            account: None,
            arn: Some("arn:siteforge:dry-run".to_string()),
            user_id: None,
        })
    }

    async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionReport, ProvisioningError> {
        let resources = request
            .names
            .iter()
            .map(|(kind, name)| ProvisionedResource::planned(*kind, name, &self.region))
            .collect::<Vec<_>>();
        let entry = request.staging_dir.join(&request.entry_file);
        let url = Url::from_file_path(&entry)
            .map(|u| u.to_string())
            .map_err(|_| ProvisioningError::new(format!("Staging path is not absolute: {}", entry.display())))?;

        info!(deployment = %request.deployment_id, resources = resources.len(), "Dry run, nothing provisioned");
        Ok(ProvisionReport {
            resources,
            url: Some(url),
        })
    }
}
