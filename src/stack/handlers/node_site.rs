//! Node-built single page apps and static-site generators

use crate::analysis::AnalysisResult;
use crate::build::BuildPlan;
use crate::stack::package_manager::{PackageManager, PackageManifest};
use crate::stack::{DeploymentHandler, StackId};
use std::path::{Path, PathBuf};

const NODE_TOOLS: &[&str] = &["node", "npm"];

/// One handler type for every Node stack; they differ only in where output
/// lands and in a few build-time variables.
pub struct NodeSiteHandler {
    stack: StackId,
}

impl NodeSiteHandler {
    pub fn react() -> Self {
        Self {
            stack: StackId::React,
        }
    }

    pub fn vue() -> Self {
        Self { stack: StackId::Vue }
    }

    pub fn nextjs() -> Self {
        Self {
            stack: StackId::NextJs,
        }
    }

    pub fn gatsby() -> Self {
        Self {
            stack: StackId::Gatsby,
        }
    }

    fn output_dir(&self, manifest: Option<&PackageManifest>) -> PathBuf {
        let dir = match &self.stack {
            StackId::React if manifest.is_some_and(|m| m.has_dependency("vite")) => "dist",
            StackId::React => "build",
            StackId::NextJs => "out",
            StackId::Gatsby => "public",
            _ => "dist",
        };
        PathBuf::from(dir)
    }
}

impl DeploymentHandler for NodeSiteHandler {
    fn id(&self) -> StackId {
        self.stack.clone()
    }

    fn name(&self) -> &'static str {
        match self.stack {
            StackId::React => "react",
            StackId::Vue => "vue",
            StackId::NextJs => "nextjs",
            StackId::Gatsby => "gatsby",
            _ => "node",
        }
    }

    fn prerequisites(&self) -> &[&'static str] {
        NODE_TOOLS
    }

    fn plan(&self, source_dir: &Path, _analysis: &AnalysisResult) -> BuildPlan {
        let manifest = PackageManifest::read(source_dir);
        let pm = PackageManager::detect(source_dir);

        let mut plan = BuildPlan::serve_only(self.output_dir(manifest.as_ref()))
            .with_install(pm.install_command(source_dir))
            .with_build(pm.run_script("build"));

        match self.stack {
            StackId::NextJs => plan = plan.with_env("NEXT_TELEMETRY_DISABLED", "1"),
            StackId::Gatsby => plan = plan.with_env("GATSBY_TELEMETRY_DISABLED", "1"),
            StackId::React => plan = plan.with_env("GENERATE_SOURCEMAP", "false"),
            _ => {}
        }
        plan
    }
}
