//! Fallback for stacks without a dedicated handler

use super::static_site::StaticSiteHandler;
use crate::analysis::AnalysisResult;
use crate::build::BuildPlan;
use crate::stack::package_manager::{PackageManager, PackageManifest};
use crate::stack::{DeploymentHandler, StackId};
use std::path::Path;

/// Runs the repository's own `build` script when it has one, otherwise
/// serves it like a static site.
pub struct GenericHandler;

impl GenericHandler {
    pub const NAME: &'static str = "generic";
}

impl DeploymentHandler for GenericHandler {
    fn id(&self) -> StackId {
        StackId::Custom(Self::NAME.to_string())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn plan(&self, source_dir: &Path, _analysis: &AnalysisResult) -> BuildPlan {
        match PackageManifest::read(source_dir) {
            Some(manifest) if manifest.has_script("build") => {
                let pm = PackageManager::detect(source_dir);
                BuildPlan::serve_only("dist")
                    .with_install(pm.install_command(source_dir))
                    .with_build(pm.run_script("build"))
            }
            _ => BuildPlan::serve_only(StaticSiteHandler::locate_output(source_dir)),
        }
    }
}
