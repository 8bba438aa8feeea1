//! Structured logging setup
//!
//! Logs go to stderr so that command output on stdout stays machine-readable.
//! `RUST_LOG` is honoured on top of the configured level.
//!
//! # Example
//!
//! ```no_run
//! use siteforge::util::logging;
//! use tracing::{info, warn};
//!
//! logging::init_from_env();
//!
//! info!("Service started");
//! warn!(deployment = "d-123", "Build output directory missing");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Noisy dependencies held at warn unless `RUST_LOG` says otherwise
const QUIET_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "aws_smithy_runtime", "aws_config"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level for siteforge targets
    pub level: Level,

    /// JSON lines instead of pretty console output
    pub use_json: bool,

    /// Include the module target (e.g. siteforge::deploy) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with location and thread metadata, for the API server
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            ..Default::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = format!("siteforge={}", self.level).parse() {
            filter = filter.add_directive(directive);
        }
        if env::var("RUST_LOG").is_err() {
            for target in QUIET_TARGETS {
                if let Ok(directive) = format!("{}=warn", target).parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }
        filter
    }
}

/// Parses a log level, case-insensitively, defaulting to INFO
///
/// ```
/// use siteforge::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("DEBUG"), Level::DEBUG);
/// assert_eq!(parse_level("nonsense"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Installs the global subscriber. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.filter();
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_thread_names(config.include_thread_ids);

        let registry = tracing_subscriber::registry().with(filter);
        let result = if config.use_json {
            registry.with(layer.json()).try_init()
        } else {
            registry.with(layer).try_init()
        };
        if let Err(e) = result {
            eprintln!("Logging already initialized: {}", e);
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `SITEFORGE_LOG_LEVEL` and `SITEFORGE_LOG_JSON`
pub fn init_from_env() {
    let level_str = env::var("SITEFORGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let use_json = env::var("SITEFORGE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level: parse_level(&level_str),
        use_json,
        ..Default::default()
    });
}

pub fn with_level(level_str: &str) {
    init_logging(LoggingConfig::with_level(parse_level(level_str)));
}
