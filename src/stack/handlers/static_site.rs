//! Plain HTML sites served as-is

use crate::analysis::{AnalysisResult, STATIC_CANDIDATE_DIRS};
use crate::build::BuildPlan;
use crate::stack::{DeploymentHandler, StackId};
use std::path::{Path, PathBuf};

pub struct StaticSiteHandler;

impl StaticSiteHandler {
    /// First conventional publish directory holding an `index.html`, else the
    /// repository root
    pub fn locate_output(source_dir: &Path) -> PathBuf {
        STATIC_CANDIDATE_DIRS
            .iter()
            .find(|dir| {
                source_dir
                    .join(dir)
                    .join(BuildPlan::DEFAULT_ENTRY_FILE)
                    .is_file()
            })
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl DeploymentHandler for StaticSiteHandler {
    fn id(&self) -> StackId {
        StackId::Static
    }

    fn name(&self) -> &'static str {
        "static"
    }

    fn plan(&self, source_dir: &Path, _analysis: &AnalysisResult) -> BuildPlan {
        BuildPlan::serve_only(Self::locate_output(source_dir))
    }
}
