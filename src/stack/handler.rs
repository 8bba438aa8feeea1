use crate::analysis::{AnalysisResult, RecommendedInfra};
use crate::build::BuildPlan;
use crate::provision::ResourceKind;
use crate::stack::StackId;
use std::path::Path;

/// Stack-specific deployment behavior.
///
/// A handler turns a checked-out repository into a [`BuildPlan`] and declares
/// which cloud resources the deployment needs.
pub trait DeploymentHandler: Send + Sync {
    fn id(&self) -> StackId;

    /// Short handler name shown in records and logs
    fn name(&self) -> &'static str;

    /// Tools that must be on `PATH` before the handler can load
    fn prerequisites(&self) -> &[&'static str] {
        &[]
    }

    fn plan(&self, source_dir: &Path, analysis: &AnalysisResult) -> BuildPlan;

    fn resources(&self, analysis: &AnalysisResult) -> Vec<ResourceKind> {
        let mut kinds = vec![ResourceKind::Storage, ResourceKind::Cdn];
        if analysis.recommended_infra == RecommendedInfra::StaticHostingWithManagedBuild {
            kinds.push(ResourceKind::ManagedBuild);
        }
        kinds
    }
}
