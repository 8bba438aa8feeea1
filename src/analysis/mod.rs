//! Stack analysis
//!
//! Deciding what a repository contains is the analyzer's job; the pipeline
//! only consumes its [`AnalysisResult`]. [`ManifestAnalyzer`] is the built-in
//! implementation: it reads `package.json` dependencies and looks for a
//! servable `index.html`. Anything it cannot place is reported as a custom
//! stack, which the registry routes to the generic handler.

use crate::stack::package_manager::PackageManifest;
use crate::stack::StackId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Infrastructure shape the analyzer recommends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedInfra {
    #[default]
    StaticHosting,
    StaticHostingWithManagedBuild,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub stack_type: StackId,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default)]
    pub recommended_infra: RecommendedInfra,
}

impl AnalysisResult {
    pub const UNKNOWN_STACK: &'static str = "unknown";

    pub fn new(stack_type: StackId, confidence: f32) -> Self {
        Self {
            stack_type,
            confidence: confidence.clamp(0.0, 1.0),
            framework: None,
            recommended_infra: RecommendedInfra::default(),
        }
    }

    /// Nothing recognizable; routes to the generic handler
    pub fn unknown() -> Self {
        Self::new(StackId::Custom(Self::UNKNOWN_STACK.to_string()), 0.0)
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_infra(mut self, infra: RecommendedInfra) -> Self {
        self.recommended_infra = infra;
        self
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),
    #[error("Analysis error: {0}")]
    Other(String),
}

#[async_trait]
pub trait StackAnalyzer: Send + Sync {
    async fn analyze(&self, source_dir: &Path) -> Result<AnalysisResult, AnalysisError>;
}

/// Directories a plain static site commonly publishes from
pub const STATIC_CANDIDATE_DIRS: &[&str] = &["build", "dist", "public", "site", "_site"];

#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestAnalyzer;

impl ManifestAnalyzer {
    pub fn detect(source_dir: &Path) -> AnalysisResult {
        if let Some(manifest) = PackageManifest::read(source_dir) {
            let detected = if manifest.has_dependency("next") {
                Some(AnalysisResult::new(StackId::NextJs, 0.95).with_framework("next"))
            } else if manifest.has_dependency("gatsby") {
                Some(AnalysisResult::new(StackId::Gatsby, 0.95).with_framework("gatsby"))
            } else if manifest.has_dependency("vue") {
                let framework = if manifest.has_dependency("vite") { "vite" } else { "vue-cli" };
                Some(AnalysisResult::new(StackId::Vue, 0.9).with_framework(framework))
            } else if manifest.has_dependency("react") {
                let framework = if manifest.has_dependency("vite") {
                    "vite"
                } else {
                    "create-react-app"
                };
                Some(AnalysisResult::new(StackId::React, 0.9).with_framework(framework))
            } else {
                None
            };
            if let Some(result) = detected {
                return result;
            }
        }

        let has_index = source_dir.join("index.html").is_file()
            || STATIC_CANDIDATE_DIRS
                .iter()
                .any(|dir| source_dir.join(dir).join("index.html").is_file());
        if has_index {
            return AnalysisResult::new(StackId::Static, 0.8);
        }

        AnalysisResult::unknown()
    }
}

#[async_trait]
impl StackAnalyzer for ManifestAnalyzer {
    async fn analyze(&self, source_dir: &Path) -> Result<AnalysisResult, AnalysisError> {
        if !source_dir.is_dir() {
            return Err(AnalysisError::PathNotFound(source_dir.to_path_buf()));
        }
        let result = Self::detect(source_dir);
        debug!(
            stack = %result.stack_type,
            confidence = result.confidence,
            framework = ?result.framework,
            "Manifest analysis complete"
        );
        Ok(result)
    }
}

/// Returns a preset result regardless of the source tree
#[derive(Debug, Clone)]
pub struct FixedAnalyzer(pub AnalysisResult);

impl FixedAnalyzer {
    pub fn stack(stack: StackId) -> Self {
        Self(AnalysisResult::new(stack, 1.0))
    }
}

#[async_trait]
impl StackAnalyzer for FixedAnalyzer {
    async fn analyze(&self, _source_dir: &Path) -> Result<AnalysisResult, AnalysisError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn with_package_json(content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), content).unwrap();
        dir
    }

    #[test]
    fn test_detects_node_frameworks() {
        let cases = [
            (r#"{"dependencies":{"next":"14","react":"18"}}"#, StackId::NextJs),
            (r#"{"dependencies":{"gatsby":"5","react":"18"}}"#, StackId::Gatsby),
            (r#"{"dependencies":{"vue":"3"},"devDependencies":{"vite":"5"}}"#, StackId::Vue),
            (r#"{"dependencies":{"react":"18","react-dom":"18"}}"#, StackId::React),
        ];
        for (manifest, expected) in cases {
            let dir = with_package_json(manifest);
            assert_eq!(ManifestAnalyzer::detect(dir.path()).stack_type, expected);
        }
    }

    #[test]
    fn test_react_framework_flavour() {
        let dir = with_package_json(r#"{"dependencies":{"react":"18"},"devDependencies":{"vite":"5"}}"#);
        let result = ManifestAnalyzer::detect(dir.path());
        assert_eq!(result.framework.as_deref(), Some("vite"));
    }

    #[test]
    fn test_static_index_in_candidate_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("public")).unwrap();
        fs::write(dir.path().join("public/index.html"), "<h1>hi</h1>").unwrap();
        assert_eq!(ManifestAnalyzer::detect(dir.path()).stack_type, StackId::Static);
    }

    #[test]
    fn test_unrecognized_is_custom_unknown() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("MAIN.cbl"), "IDENTIFICATION DIVISION.").unwrap();
        let result = ManifestAnalyzer::detect(dir.path());
        assert!(result.stack_type.is_custom());
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_missing_path_is_error() {
        let err = ManifestAnalyzer
            .analyze(Path::new("/nonexistent/siteforge/repo"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::PathNotFound(_)));
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{"stackType":"cobol-legacy","confidence":0.4,"recommendedInfra":"static-hosting-with-managed-build"}"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.stack_type, StackId::Custom("cobol-legacy".to_string()));
        assert_eq!(
            result.recommended_infra,
            RecommendedInfra::StaticHostingWithManagedBuild
        );
        assert!(result.framework.is_none());

        let back = serde_json::to_value(AnalysisResult::new(StackId::Static, 2.0)).unwrap();
        assert_eq!(back["stackType"], "static");
        assert_eq!(back["confidence"], 1.0);
        assert_eq!(back["recommendedInfra"], "static-hosting");
    }
}
