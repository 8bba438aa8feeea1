#![allow(dead_code)]

use async_trait::async_trait;
use siteforge::analysis::{FixedAnalyzer, StackAnalyzer};
use siteforge::build::{stage_output, ExecutorOptions, SharedBuildJob};
use siteforge::deploy::{DeploymentService, DeploymentServiceBuilder};
use siteforge::session::{GuardConfig, InMemorySessionStore, SessionGuard};
use siteforge::source::{LocalFetcher, RepositoryRef, SourceError, SourceFetcher};
use siteforge::stack::StackId;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

pub const SITE_REPO: &str = "https://github.com/acme/site";

/// A repository whose published output is `build/index.html`
pub fn static_site(root: &Path) -> PathBuf {
    let repo = root.join("repo");
    fs::create_dir_all(repo.join("build/assets")).unwrap();
    fs::write(repo.join("build/index.html"), "<h1>acme</h1>").unwrap();
    fs::write(repo.join("build/assets/site.css"), "h1 { color: teal }").unwrap();
    fs::write(repo.join("README.md"), "# acme site").unwrap();
    repo
}

pub struct Harness {
    pub work: TempDir,
    pub repo: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let work = TempDir::new().unwrap();
        let repo = static_site(work.path());
        Self { work, repo }
    }

    pub fn service(&self, stack: &str, rate_limit: usize) -> Arc<DeploymentService> {
        self.service_with(
            Arc::new(FixedAnalyzer::stack(StackId::parse(stack))),
            Arc::new(LocalFetcher::new(&self.repo)),
            rate_limit,
        )
    }

    pub fn service_with(
        &self,
        analyzer: Arc<dyn StackAnalyzer>,
        fetcher: Arc<dyn SourceFetcher>,
        rate_limit: usize,
    ) -> Arc<DeploymentService> {
        Arc::new(self.builder(analyzer, fetcher, rate_limit).build())
    }

    pub fn builder(
        &self,
        analyzer: Arc<dyn StackAnalyzer>,
        fetcher: Arc<dyn SourceFetcher>,
        rate_limit: usize,
    ) -> DeploymentServiceBuilder {
        let guard = SessionGuard::new(
            Arc::new(InMemorySessionStore::new()),
            GuardConfig {
                rate_limit_per_minute: rate_limit,
                ..GuardConfig::default()
            },
        );
        let work_dir = self.work.path().join("work");
        DeploymentService::builder(&work_dir)
            .guard(guard)
            .analyzer(analyzer)
            .fetcher(fetcher)
            .executor_options(
                ExecutorOptions::new(work_dir.join("staging")).with_timeout(Duration::from_secs(30)),
            )
    }
}

/// Holds every fetch until the gate opens, then copies the fixture
pub struct GatedFetcher {
    gate: watch::Receiver<bool>,
    root: PathBuf,
}

impl GatedFetcher {
    pub fn new(root: impl Into<PathBuf>) -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (
            tx,
            Self {
                gate: rx,
                root: root.into(),
            },
        )
    }
}

#[async_trait]
impl SourceFetcher for GatedFetcher {
    async fn fetch(
        &self,
        _repo: &RepositoryRef,
        _token: Option<&str>,
        dest: &Path,
        _job: &SharedBuildJob,
    ) -> Result<(), SourceError> {
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open)
            .await
            .map_err(|e| SourceError::Spawn(e.to_string()))?;
        stage_output(&self.root, dest).map_err(|source| SourceError::Io {
            path: self.root.clone(),
            source,
        })?;
        Ok(())
    }
}
