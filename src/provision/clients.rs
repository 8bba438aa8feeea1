//! Capability-scoped cloud clients sharing one SDK configuration

use super::{CallerIdentity, CredentialError};
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSettings {
    pub region: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Factory for storage, CDN, managed-build and identity clients.
///
/// Every client is built from the same [`SdkConfig`], so region, credentials
/// and timeouts are uniform across capabilities.
#[derive(Debug, Clone)]
pub struct CloudClients {
    config: SdkConfig,
    region: String,
}

impl CloudClients {
    /// Loads credentials from the default provider chain
    pub async fn connect(settings: &CloudSettings) -> Self {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build();
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .timeout_config(timeouts)
            .load()
            .await;
        debug!(region = %settings.region, "Cloud SDK configuration loaded");
        Self::from_config(config)
    }

    pub fn from_config(config: SdkConfig) -> Self {
        let region = config
            .region()
            .map(|r| r.as_ref().to_string())
            .unwrap_or_else(|| "us-east-1".to_string());
        Self { config, region }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn storage(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(&self.config)
    }

    pub fn cdn(&self) -> aws_sdk_cloudfront::Client {
        aws_sdk_cloudfront::Client::new(&self.config)
    }

    pub fn build_service(&self) -> aws_sdk_codebuild::Client {
        aws_sdk_codebuild::Client::new(&self.config)
    }

    pub fn identity(&self) -> aws_sdk_sts::Client {
        aws_sdk_sts::Client::new(&self.config)
    }

    /// Confirms the configured credentials resolve to a caller identity
    pub async fn validate_credentials(&self) -> Result<CallerIdentity, CredentialError> {
        let output = self
            .identity()
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| {
                CredentialError(aws_sdk_sts::error::DisplayErrorContext(&e).to_string())
            })?;

        let identity = CallerIdentity {
            account: output.account().map(String::from),
            arn: output.arn().map(String::from),
            user_id: output.user_id().map(String::from),
        };
        info!(
            account = identity.account.as_deref().unwrap_or("unknown"),
            "Cloud credentials validated"
        );
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config(region: Option<&str>) -> SdkConfig {
        let mut builder = SdkConfig::builder().behavior_version(BehaviorVersion::latest());
        if let Some(region) = region {
            builder = builder.region(Region::new(region.to_string()));
        }
        builder.build()
    }

    #[test]
    fn test_region_comes_from_config() {
        let clients = CloudClients::from_config(offline_config(Some("eu-west-1")));
        assert_eq!(clients.region(), "eu-west-1");
        assert_eq!(
            clients.storage().config().region().map(|r| r.as_ref()),
            Some("eu-west-1")
        );
    }

    #[test]
    fn test_missing_region_defaults() {
        let clients = CloudClients::from_config(offline_config(None));
        assert_eq!(clients.region(), "us-east-1");
    }

    #[test]
    fn test_default_settings() {
        let settings = CloudSettings::default();
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.read_timeout, Duration::from_secs(60));
    }
}
