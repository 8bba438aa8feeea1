//! Configuration management for siteforge
//!
//! Settings are loaded from environment variables with defaults; CLI flags
//! override individual fields afterwards. Call [`SiteforgeConfig::validate`]
//! before using a configuration.
//!
//! # Environment Variables
//!
//! - `SITEFORGE_REGION`: cloud region - default: "us-east-1"
//! - `SITEFORGE_RESOURCE_PREFIX`: prefix of generated resource names - default: "sf-"
//! - `SITEFORGE_BUILD_TIMEOUT_MINUTES`: per-phase build timeout - default: "60"
//! - `SITEFORGE_RATE_LIMIT_RPM`: requests per session per minute - default: "60"
//! - `SITEFORGE_BUILD_IMAGE`: managed build image - default: "aws/codebuild/standard:7.0"
//! - `SITEFORGE_BUILD_COMPUTE_TYPE`: managed build compute type - default: "BUILD_GENERAL1_SMALL"
//! - `SITEFORGE_BUILD_SERVICE_ROLE`: IAM role for managed builds - default: unset
//! - `SITEFORGE_SESSION_TIMEOUT_MINUTES`: idle session expiry - default: "30"
//! - `SITEFORGE_CONNECT_TIMEOUT_SECS`: cloud connect timeout - default: "10"
//! - `SITEFORGE_READ_TIMEOUT_SECS`: cloud read timeout - default: "60"
//! - `SITEFORGE_WORK_DIR`: checkouts and staging - default: user cache dir + "siteforge"
//! - `SITEFORGE_ALLOWED_HOSTS`: comma-separated repository hosts - default: "github.com"
//! - `SITEFORGE_LISTEN`: API listen address - default: "127.0.0.1:8080"
//! - `SITEFORGE_LOG_LEVEL`: logging level - default: "info"
//! - `SITEFORGE_LOG_JSON`: JSON log output (true|false) - default: "false"
//! - `SITEFORGE_KEEP_WORKDIRS`: keep checkouts after a deployment (true|false) - default: "false"
//!
//! # Example
//!
//! ```no_run
//! use siteforge::SiteforgeConfig;
//!
//! let config = SiteforgeConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("{}", config);
//! ```

use crate::build::ExecutorOptions;
use crate::provision::{CloudSettings, ManagedBuildSettings, ResourceNamer};
use crate::session::GuardConfig;
use crate::util::LoggingConfig;
use regex::Regex;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_RESOURCE_PREFIX: &str = "sf-";
const DEFAULT_BUILD_TIMEOUT_MINUTES: u64 = 60;
const DEFAULT_RATE_LIMIT_RPM: usize = 60;
const DEFAULT_BUILD_IMAGE: &str = "aws/codebuild/standard:7.0";
const DEFAULT_BUILD_COMPUTE_TYPE: &str = "BUILD_GENERAL1_SMALL";
const DEFAULT_SESSION_TIMEOUT_MINUTES: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ALLOWED_HOSTS: &str = "github.com";
const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
const DEFAULT_LOG_LEVEL: &str = "info";

/// CodeBuild accepts at most eight hours
const MAX_BUILD_TIMEOUT_MINUTES: u64 = 480;

static PREFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,9}$").expect("prefix pattern"));

static REGION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("region pattern"));

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

#[derive(Debug, Clone)]
pub struct SiteforgeConfig {
    pub region: String,

    /// Prepended to every generated resource name
    pub resource_prefix: String,

    /// Wall-clock bound per build phase, in minutes
    pub build_timeout_minutes: u64,

    /// Requests admitted per session per minute
    pub rate_limit_rpm: usize,

    pub build_image: String,
    pub build_compute_type: String,
    pub build_service_role: Option<String>,

    /// Idle time after which a session is evicted
    pub session_timeout_minutes: u64,

    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,

    /// Root of checkouts and staged output
    pub work_dir: PathBuf,

    pub allowed_hosts: Vec<String>,
    pub listen: String,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_json: bool,

    /// Keep checkouts and failed staging output for inspection
    pub keep_workdirs: bool,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Default for SiteforgeConfig {
    /// Loads from `SITEFORGE_*` environment variables, falling back to
    /// defaults for anything missing or unparsable
    fn default() -> Self {
        let work_dir = env_string("SITEFORGE_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(env::temp_dir)
                    .join("siteforge")
            });

        let allowed_hosts = env_string("SITEFORGE_ALLOWED_HOSTS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_HOSTS.to_string())
            .split(',')
            .map(|h| h.trim().to_lowercase())
            .filter(|h| !h.is_empty())
            .collect();

        Self {
            region: env_string("SITEFORGE_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            resource_prefix: env_string("SITEFORGE_RESOURCE_PREFIX")
                .unwrap_or_else(|| DEFAULT_RESOURCE_PREFIX.to_string()),
            build_timeout_minutes: env_parse("SITEFORGE_BUILD_TIMEOUT_MINUTES")
                .unwrap_or(DEFAULT_BUILD_TIMEOUT_MINUTES),
            rate_limit_rpm: env_parse("SITEFORGE_RATE_LIMIT_RPM").unwrap_or(DEFAULT_RATE_LIMIT_RPM),
            build_image: env_string("SITEFORGE_BUILD_IMAGE")
                .unwrap_or_else(|| DEFAULT_BUILD_IMAGE.to_string()),
            build_compute_type: env_string("SITEFORGE_BUILD_COMPUTE_TYPE")
                .unwrap_or_else(|| DEFAULT_BUILD_COMPUTE_TYPE.to_string()),
            build_service_role: env_string("SITEFORGE_BUILD_SERVICE_ROLE"),
            session_timeout_minutes: env_parse("SITEFORGE_SESSION_TIMEOUT_MINUTES")
                .unwrap_or(DEFAULT_SESSION_TIMEOUT_MINUTES),
            connect_timeout_secs: env_parse("SITEFORGE_CONNECT_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout_secs: env_parse("SITEFORGE_READ_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            work_dir,
            allowed_hosts,
            listen: env_string("SITEFORGE_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            log_level: env_string("SITEFORGE_LOG_LEVEL")
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
            log_json: env_parse("SITEFORGE_LOG_JSON").unwrap_or(false),
            keep_workdirs: env_parse("SITEFORGE_KEEP_WORKDIRS").unwrap_or(false),
        }
    }
}

impl SiteforgeConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for the first value out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationFailed(msg));

        if !REGION_PATTERN.is_match(&self.region) {
            return fail(format!("Invalid region: {}", self.region));
        }
        if !PREFIX_PATTERN.is_match(&self.resource_prefix) || self.resource_prefix.starts_with("xn--") {
            return fail(format!(
                "Invalid resource prefix: {}. Use 1-10 lower-case letters, digits or hyphens, starting with a letter",
                self.resource_prefix
            ));
        }
        if self.build_timeout_minutes == 0 || self.build_timeout_minutes > MAX_BUILD_TIMEOUT_MINUTES {
            return fail(format!(
                "Build timeout must be between 1 and {} minutes",
                MAX_BUILD_TIMEOUT_MINUTES
            ));
        }
        if self.rate_limit_rpm == 0 {
            return fail("Rate limit must allow at least 1 request per minute".to_string());
        }
        if self.session_timeout_minutes == 0 {
            return fail("Session timeout must be at least 1 minute".to_string());
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return fail("Cloud timeouts must be at least 1 second".to_string());
        }
        if self.build_image.is_empty() || self.build_compute_type.is_empty() {
            return fail("Managed build image and compute type must be set".to_string());
        }
        if self.allowed_hosts.is_empty() {
            return fail("At least one allowed repository host is required".to_string());
        }
        self.listen_addr()?;

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return fail(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                ))
            }
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|e: std::net::AddrParseError| ConfigError::ParseError {
            field: "SITEFORGE_LISTEN".to_string(),
            error: e.to_string(),
        })
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_minutes * 60)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes * 60)
    }

    pub fn cloud_settings(&self) -> CloudSettings {
        CloudSettings {
            region: self.region.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }

    pub fn managed_build_settings(&self) -> ManagedBuildSettings {
        ManagedBuildSettings {
            image: self.build_image.clone(),
            compute_type: self.build_compute_type.clone(),
            service_role: self.build_service_role.clone(),
            timeout_minutes: i32::try_from(self.build_timeout_minutes).unwrap_or(i32::MAX),
        }
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            rate_limit_per_minute: self.rate_limit_rpm,
            allowed_hosts: self.allowed_hosts.clone(),
        }
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions::new(self.work_dir.join("staging")).with_timeout(self.build_timeout())
    }

    pub fn namer(&self) -> ResourceNamer {
        ResourceNamer::new(self.resource_prefix.clone())
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: crate::util::logging::parse_level(&self.log_level),
            use_json: self.log_json,
            ..Default::default()
        }
    }
}

impl fmt::Display for SiteforgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Siteforge Configuration:")?;
        writeln!(f, "  Region: {}", self.region)?;
        writeln!(f, "  Resource Prefix: {}", self.resource_prefix)?;
        writeln!(f, "  Build Timeout: {}m", self.build_timeout_minutes)?;
        writeln!(f, "  Rate Limit: {}/min per session", self.rate_limit_rpm)?;
        writeln!(f, "  Build Image: {} ({})", self.build_image, self.build_compute_type)?;
        writeln!(
            f,
            "  Build Service Role: {}",
            self.build_service_role.as_deref().unwrap_or("(not set)")
        )?;
        writeln!(f, "  Session Timeout: {}m", self.session_timeout_minutes)?;
        writeln!(
            f,
            "  Cloud Timeouts: connect {}s, read {}s",
            self.connect_timeout_secs, self.read_timeout_secs
        )?;
        writeln!(f, "  Work Dir: {}", self.work_dir.display())?;
        writeln!(f, "  Allowed Hosts: {}", self.allowed_hosts.join(", "))?;
        writeln!(f, "  Listen: {}", self.listen)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
