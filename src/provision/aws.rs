//! AWS provisioner: S3 website hosting, CloudFront, CodeBuild

use super::clients::CloudClients;
use super::{
    CallerIdentity, CredentialError, ProvisionReport, ProvisionRequest, ProvisionedResource,
    Provisioner, ProvisioningError, ResourceKind,
};
use crate::build::staging::list_files;
use async_trait::async_trait;
use aws_sdk_cloudfront::types::{
    CustomOriginConfig, DefaultCacheBehavior, DistributionConfig, Origin, OriginProtocolPolicy,
    Origins, ViewerProtocolPolicy,
};
use aws_sdk_codebuild::types::{
    ArtifactsType, ComputeType, EnvironmentType, ProjectArtifacts, ProjectEnvironment,
    ProjectSource, SourceType,
};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, ErrorDocument, IndexDocument,
    PublicAccessBlockConfiguration, WebsiteConfiguration,
};
use std::path::Path;
use tracing::{debug, info, warn};

/// AWS managed `CachingOptimized` cache policy
const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

/// Regions whose website endpoint uses the legacy `s3-website-<region>` form
const DASH_WEBSITE_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "sa-east-1",
    "us-gov-west-1",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBuildSettings {
    pub image: String,
    pub compute_type: String,
    pub service_role: Option<String>,
    pub timeout_minutes: i32,
}

impl Default for ManagedBuildSettings {
    fn default() -> Self {
        Self {
            image: "aws/codebuild/standard:7.0".to_string(),
            compute_type: "BUILD_GENERAL1_SMALL".to_string(),
            service_role: None,
            timeout_minutes: 60,
        }
    }
}

pub struct AwsProvisioner {
    clients: CloudClients,
    build: ManagedBuildSettings,
}

impl AwsProvisioner {
    pub fn new(clients: CloudClients, build: ManagedBuildSettings) -> Self {
        Self { clients, build }
    }

    pub fn clients(&self) -> &CloudClients {
        &self.clients
    }

    /// Returns the bucket's website host on success
    async fn provision_storage(
        &self,
        bucket: &str,
        request: &ProvisionRequest,
    ) -> Result<String, String> {
        let s3 = self.clients.storage();
        let region = self.clients.region();

        let mut create = s3.create_bucket().bucket(bucket);
        if region != "us-east-1" {
            create = create.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        create.send().await.map_err(|e| sdk_failure("CreateBucket", e))?;

        s3.put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(false)
                    .ignore_public_acls(false)
                    .block_public_policy(false)
                    .restrict_public_buckets(false)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_failure("PutPublicAccessBlock", e))?;

        s3.put_bucket_policy()
            .bucket(bucket)
            .policy(public_read_policy(bucket))
            .send()
            .await
            .map_err(|e| sdk_failure("PutBucketPolicy", e))?;

        let website = WebsiteConfiguration::builder()
            .index_document(
                IndexDocument::builder()
                    .suffix(&request.entry_file)
                    .build()
                    .map_err(|e| format!("Failed to build request: {}", e))?,
            )
            .error_document(
                ErrorDocument::builder()
                    .key(&request.entry_file)
                    .build()
                    .map_err(|e| format!("Failed to build request: {}", e))?,
            )
            .build();
        s3.put_bucket_website()
            .bucket(bucket)
            .website_configuration(website)
            .send()
            .await
            .map_err(|e| sdk_failure("PutBucketWebsite", e))?;

        let staging_dir = request.staging_dir.clone();
        let files = tokio::task::spawn_blocking(move || list_files(&staging_dir))
            .await
            .map_err(|e| format!("File listing task failed: {}", e))?
            .map_err(|e| format!("Failed to list staged files: {}", e))?;

        for relative in &files {
            let key = object_key(relative);
            let body = ByteStream::from_path(request.staging_dir.join(relative))
                .await
                .map_err(|e| format!("Failed to read {}: {}", relative.display(), e))?;
            s3.put_object()
                .bucket(bucket)
                .key(&key)
                .body(body)
                .content_type(content_type_for(relative))
                .send()
                .await
                .map_err(|e| sdk_failure("PutObject", e))?;
            debug!(bucket, key = %key, "Uploaded object");
        }
        info!(bucket, files = files.len(), "Site uploaded");

        Ok(website_host(bucket, region))
    }

    /// Returns the distribution's domain name on success
    async fn provision_cdn(&self, name: &str, origin_host: &str, entry_file: &str) -> Result<String, String> {
        let origin_id = format!("{}-origin", name);
        let build_err = |e: aws_sdk_cloudfront::error::BuildError| format!("Failed to build request: {}", e);

        let origin = Origin::builder()
            .id(&origin_id)
            .domain_name(origin_host)
            .custom_origin_config(
                CustomOriginConfig::builder()
                    .http_port(80)
                    .https_port(443)
                    .origin_protocol_policy(OriginProtocolPolicy::HttpOnly)
                    .build()
                    .map_err(build_err)?,
            )
            .build()
            .map_err(build_err)?;
        let origins = Origins::builder()
            .quantity(1)
            .items(origin)
            .build()
            .map_err(build_err)?;
        let behavior = DefaultCacheBehavior::builder()
            .target_origin_id(&origin_id)
            .viewer_protocol_policy(ViewerProtocolPolicy::RedirectToHttps)
            .cache_policy_id(CACHING_OPTIMIZED_POLICY_ID)
            .compress(true)
            .build()
            .map_err(build_err)?;
        let config = DistributionConfig::builder()
            .caller_reference(name)
            .comment(format!("siteforge {}", name))
            .enabled(true)
            .default_root_object(entry_file)
            .origins(origins)
            .default_cache_behavior(behavior)
            .build()
            .map_err(build_err)?;

        let output = self
            .clients
            .cdn()
            .create_distribution()
            .distribution_config(config)
            .send()
            .await
            .map_err(|e| sdk_failure("CreateDistribution", e))?;

        output
            .distribution()
            .map(|d| d.domain_name().to_string())
            .ok_or_else(|| "CreateDistribution returned no distribution".to_string())
    }

    async fn provision_build_project(&self, name: &str, request: &ProvisionRequest) -> Result<(), String> {
        let role = self
            .build
            .service_role
            .as_deref()
            .ok_or("No build service role configured (SITEFORGE_BUILD_SERVICE_ROLE)")?;
        let build_err = |e: aws_sdk_codebuild::error::BuildError| format!("Failed to build request: {}", e);

        let source = ProjectSource::builder()
            .r#type(SourceType::Github)
            .location(&request.repository_url)
            .buildspec(buildspec(request))
            .build()
            .map_err(build_err)?;
        let artifacts = ProjectArtifacts::builder()
            .r#type(ArtifactsType::NoArtifacts)
            .build()
            .map_err(build_err)?;
        let environment = ProjectEnvironment::builder()
            .r#type(EnvironmentType::LinuxContainer)
            .image(&self.build.image)
            .compute_type(ComputeType::from(self.build.compute_type.as_str()))
            .build()
            .map_err(build_err)?;

        self.clients
            .build_service()
            .create_project()
            .name(name)
            .source(source)
            .artifacts(artifacts)
            .environment(environment)
            .service_role(role)
            .timeout_in_minutes(self.build.timeout_minutes)
            .send()
            .await
            .map_err(|e| sdk_failure("CreateProject", e))?;
        Ok(())
    }
}

#[async_trait]
impl Provisioner for AwsProvisioner {
    async fn validate_credentials(&self) -> Result<CallerIdentity, CredentialError> {
        self.clients.validate_credentials().await
    }

    async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionReport, ProvisioningError> {
        let region = self.clients.region().to_string();
        let mut resources = Vec::new();
        let mut website = None;
        let mut cdn_domain = None;

        if let Some(bucket) = request.names.get(&ResourceKind::Storage) {
            match self.provision_storage(bucket, request).await {
                Ok(host) => {
                    resources.push(
                        ProvisionedResource::created(ResourceKind::Storage, bucket, &region)
                            .with_endpoint(format!("http://{}", host)),
                    );
                    website = Some(host);
                }
                Err(detail) => {
                    warn!(bucket = %bucket, error = %detail, "Storage provisioning failed");
                    resources.push(ProvisionedResource::failed(ResourceKind::Storage, bucket, &region, detail));
                }
            }
        }

        if let Some(name) = request.names.get(&ResourceKind::Cdn) {
            match &website {
                None => resources.push(ProvisionedResource::skipped(
                    ResourceKind::Cdn,
                    name,
                    &region,
                    "Storage was not provisioned",
                )),
                Some(host) => match self.provision_cdn(name, host, &request.entry_file).await {
                    Ok(domain) => {
                        resources.push(
                            ProvisionedResource::created(ResourceKind::Cdn, name, &region)
                                .with_endpoint(format!("https://{}", domain)),
                        );
                        cdn_domain = Some(domain);
                    }
                    Err(detail) => {
                        warn!(distribution = %name, error = %detail, "CDN provisioning failed");
                        resources.push(ProvisionedResource::failed(ResourceKind::Cdn, name, &region, detail));
                    }
                },
            }
        }

        if let Some(name) = request.names.get(&ResourceKind::ManagedBuild) {
            match self.provision_build_project(name, request).await {
                Ok(()) => resources.push(ProvisionedResource::created(ResourceKind::ManagedBuild, name, &region)),
                Err(detail) => {
                    warn!(project = %name, error = %detail, "Managed build provisioning failed");
                    resources.push(ProvisionedResource::failed(
                        ResourceKind::ManagedBuild,
                        name,
                        &region,
                        detail,
                    ));
                }
            }
        }

        let url = cdn_domain
            .map(|domain| format!("https://{}", domain))
            .or_else(|| website.map(|host| format!("http://{}", host)));

        ProvisionReport { resources, url }.into_result()
    }
}

fn sdk_failure<E>(operation: &str, err: E) -> String
where
    E: std::error::Error,
{
    format!("{} failed: {}", operation, aws_sdk_s3::error::DisplayErrorContext(&err))
}

pub fn website_host(bucket: &str, region: &str) -> String {
    if DASH_WEBSITE_REGIONS.contains(&region) {
        format!("{}.s3-website-{}.amazonaws.com", bucket, region)
    } else {
        format!("{}.s3-website.{}.amazonaws.com", bucket, region)
    }
}

pub fn public_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "PublicReadGetObject",
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": format!("arn:aws:s3:::{}/*", bucket),
        }]
    })
    .to_string()
}

fn object_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn content_type_for(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

/// CodeBuild buildspec reproducing the local install and build phases
pub fn buildspec(request: &ProvisionRequest) -> String {
    let mut spec = String::from("version: 0.2\nphases:\n");
    if let Some(install) = &request.install_command {
        spec.push_str(&format!("  install:\n    commands:\n      - {}\n", yaml_quote(install)));
    }
    let build = request.build_command.as_deref().unwrap_or("echo \"no build step\"");
    spec.push_str(&format!("  build:\n    commands:\n      - {}\n", yaml_quote(build)));
    spec.push_str(&format!(
        "artifacts:\n  base-directory: {}\n  files:\n    - '**/*'\n",
        yaml_quote(&object_key(&request.output_dir))
    ));
    spec
}

fn yaml_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            deployment_id: "d1".to_string(),
            project: "acme-site".to_string(),
            names: BTreeMap::new(),
            staging_dir: PathBuf::from("/tmp/staging"),
            entry_file: "index.html".to_string(),
            repository_url: "https://github.com/acme/site".to_string(),
            install_command: Some("npm ci".to_string()),
            build_command: Some("echo 'done' && npm run build".to_string()),
            output_dir: PathBuf::from("build"),
        }
    }

    #[test]
    fn test_website_host_forms() {
        assert_eq!(
            website_host("sf-a", "us-east-1"),
            "sf-a.s3-website-us-east-1.amazonaws.com"
        );
        assert_eq!(
            website_host("sf-a", "eu-central-1"),
            "sf-a.s3-website.eu-central-1.amazonaws.com"
        );
    }

    #[test]
    fn test_public_read_policy_targets_bucket_objects() {
        let policy: serde_json::Value = serde_json::from_str(&public_read_policy("sf-a")).unwrap();
        assert_eq!(policy["Statement"][0]["Resource"], "arn:aws:s3:::sf-a/*");
        assert_eq!(policy["Statement"][0]["Action"], "s3:GetObject");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("assets/app.css")), "text/css; charset=utf-8");
        assert_eq!(content_type_for(Path::new("logo.png")), "image/png");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_object_key_uses_forward_slashes() {
        assert_eq!(object_key(Path::new("assets/js/app.js")), "assets/js/app.js");
    }

    #[test]
    fn test_buildspec_quotes_commands() {
        let spec = buildspec(&request());
        assert!(spec.contains("      - 'npm ci'\n"));
        assert!(spec.contains("      - 'echo ''done'' && npm run build'\n"));
        assert!(spec.contains("base-directory: 'build'"));
    }

    #[test]
    fn test_buildspec_without_install() {
        let mut req = request();
        req.install_command = None;
        let spec = buildspec(&req);
        assert!(!spec.contains("install:"));
        assert!(spec.contains("build:"));
    }
}
