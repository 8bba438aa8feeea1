//! siteforge - repository to hosted static site
//!
//! A deployment takes a repository URL through a fixed pipeline: the session
//! guard admits the request, the source is fetched, an analyzer reports the
//! stack, the handler registry turns that into a build plan, the build
//! executor runs it in a scoped subprocess, and a provisioner creates the
//! cloud resources under generated names.
//!
//! # Example Usage
//!
//! ```no_run
//! use siteforge::deploy::{DeploymentRequest, DeploymentService};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), siteforge::DeployError> {
//! let service = Arc::new(DeploymentService::builder("/var/lib/siteforge").build());
//! let session = service.create_session();
//!
//! let submitted = service.submit(
//!     DeploymentRequest::new("https://github.com/acme/site").with_session(session.as_str()),
//! )?;
//! let record = service.wait_terminal(&submitted.deployment_id).await?;
//! println!("{} -> {:?}", record.status, record.url);
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`session`]: session ids, rate limiting and request admission
//! - [`stack`]: stack identifiers and the handler registry
//! - [`build`]: build jobs, scoped subprocesses and output staging
//! - [`provision`]: resource naming, cloud clients and provisioners
//! - [`deploy`]: the orchestrating service and deployment records
//! - [`api`]: the HTTP boundary

pub mod analysis;
pub mod api;
pub mod build;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod progress;
pub mod provision;
pub mod session;
pub mod source;
pub mod stack;
pub mod util;

pub use analysis::{AnalysisResult, ManifestAnalyzer, StackAnalyzer};
pub use build::{BuildExecutor, BuildJob, BuildPlan, BuildState};
pub use config::{ConfigError, SiteforgeConfig};
pub use deploy::{DeploymentRecord, DeploymentRequest, DeploymentService, DeploymentStatus};
pub use error::{DeployError, ErrorBody, ValidationError};
pub use provision::{Provisioner, ResourceKind, ResourceNamer};
pub use session::{SessionGuard, SessionId};
pub use stack::{HandlerRegistry, StackId};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
