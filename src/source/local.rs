//! Serves a local directory in place of a clone

use super::{RepositoryRef, SourceError, SourceFetcher};
use crate::build::{stage_output, LogPhase, OutputStream, SharedBuildJob};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Copies a local checkout into the workspace, ignoring the repository URL.
///
/// Used by `siteforge deploy --source-dir` and in tests.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceFetcher for LocalFetcher {
    async fn fetch(
        &self,
        repo: &RepositoryRef,
        _token: Option<&str>,
        dest: &Path,
        job: &SharedBuildJob,
    ) -> Result<(), SourceError> {
        let (src, target) = (self.root.clone(), dest.to_path_buf());
        let copied = tokio::task::spawn_blocking(move || stage_output(&src, &target))
            .await
            .map_err(|e| SourceError::Spawn(e.to_string()))?
            .map_err(|source| SourceError::Io {
                path: self.root.clone(),
                source,
            })?;

        job.push_log(
            LogPhase::Source,
            OutputStream::System,
            format!(
                "Copied {} files from {} for {}",
                copied,
                self.root.display(),
                repo
            ),
        );
        Ok(())
    }
}
