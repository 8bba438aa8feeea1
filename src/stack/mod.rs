//! Stack routing: from an analyzer's stack id to a deployment handler.
//!
//! Supported stacks form a closed set of [`StackId`] variants; anything else
//! the analyzer reports arrives as `StackId::Custom` and is served by the
//! generic fallback handler. Resolution never fails.
//!
//! # Example
//!
//! ```no_run
//! use siteforge::analysis::AnalysisResult;
//! use siteforge::stack::{HandlerRegistry, StackId};
//! use std::path::Path;
//!
//! let registry = HandlerRegistry::with_defaults();
//! let handler = registry.resolve_handler(&StackId::parse("react"));
//! let plan = handler.plan(Path::new("./checkout"), &AnalysisResult::unknown());
//! println!("{} builds into {}", handler.name(), plan.output_dir.display());
//! ```

pub mod id_enum_macro;

pub mod handler;
pub mod handlers;
pub mod package_manager;
pub mod registry;
pub mod stack_id;

pub use handler::DeploymentHandler;
pub use handlers::{GenericHandler, NodeSiteHandler, StaticSiteHandler};
pub use package_manager::{PackageManager, PackageManifest};
pub use registry::{HandlerLoadError, HandlerLoader, HandlerRegistry, Resolution};
pub use stack_id::StackId;
