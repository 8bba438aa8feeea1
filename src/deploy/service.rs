use super::{DeploymentRecord, DeploymentRequest, DeploymentStatus};
use crate::analysis::{AnalysisResult, ManifestAnalyzer, StackAnalyzer};
use crate::build::{
    BuildExecutor, BuildJob, BuildState, ExecutorOptions, LogPhase, OutputStream, SharedBuildJob,
};
use crate::error::{DeployError, ErrorBody};
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::provision::{DryRunProvisioner, ProvisionRequest, Provisioner, ResourceNamer};
use crate::session::{
    lock, AdmittedRequest, GuardConfig, InMemorySessionStore, SessionGuard, SessionHandle, SessionId,
};
use crate::source::{GitFetcher, SourceFetcher};
use crate::stack::HandlerRegistry;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Acknowledgement returned when a deployment is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitted {
    pub deployment_id: String,
    pub status: DeploymentStatus,
}

/// Live state of one deployment
struct Tracked {
    job: SharedBuildJob,
    record: Mutex<DeploymentRecord>,
    status: watch::Sender<DeploymentStatus>,
}

impl Tracked {
    fn lock(&self) -> MutexGuard<'_, DeploymentRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, f: impl FnOnce(&mut DeploymentRecord) -> R) -> R {
        let mut record = self.lock();
        let out = f(&mut record);
        record.updated_at = Utc::now();
        out
    }

    fn set_status(&self, status: DeploymentStatus) {
        self.update(|r| r.status = status);
        self.status.send_replace(status);
    }

    fn is_terminal(&self) -> bool {
        self.status.borrow().is_terminal()
    }

    fn finish(&self, status: DeploymentStatus, url: Option<String>, error: Option<ErrorBody>) {
        self.update(|r| {
            r.url = url;
            r.error = error;
            r.finished_at = Some(Utc::now());
        });
        self.set_status(status);
    }

    fn snapshot(&self) -> DeploymentRecord {
        let mut record = self.lock().clone();
        record.build = self.job.snapshot();
        record
    }
}

/// Holds a session's build slot for the lifetime of a deployment worker.
///
/// The slot is released before the deployment is marked terminal, so a
/// caller that observed the terminal status can submit again immediately.
/// Dropping an unfinished slot marks the deployment failed.
struct BuildSlot {
    session: SessionHandle,
    deployment_id: String,
    tracked: Arc<Tracked>,
    released: bool,
}

impl BuildSlot {
    fn release(&mut self) {
        if !self.released {
            lock(&self.session).release_build(&self.deployment_id);
            self.released = true;
            debug!(deployment = %self.deployment_id, "Build slot released");
        }
    }

    fn finish(mut self, outcome: Result<Option<String>, DeployError>) {
        self.release();
        match outcome {
            Ok(url) => self.tracked.finish(DeploymentStatus::Ready, url, None),
            Err(err) => self
                .tracked
                .finish(DeploymentStatus::Failed, None, Some(err.to_body())),
        }
    }
}

impl Drop for BuildSlot {
    fn drop(&mut self) {
        self.release();
        if !self.tracked.is_terminal() {
            warn!(deployment = %self.deployment_id, "Deployment worker stopped before finishing");
            if !self.tracked.job.state().is_terminal() {
                let _ = self.tracked.job.transition(BuildState::Failed);
            }
            self.tracked.finish(
                DeploymentStatus::Failed,
                None,
                Some(DeployError::Internal("deployment worker stopped unexpectedly".to_string()).to_body()),
            );
        }
    }
}

/// Accepts deployment requests and runs each on its own task
pub struct DeploymentService {
    guard: SessionGuard,
    registry: Arc<HandlerRegistry>,
    analyzer: Arc<dyn StackAnalyzer>,
    fetcher: Arc<dyn SourceFetcher>,
    executor: BuildExecutor,
    provisioner: Arc<dyn Provisioner>,
    namer: ResourceNamer,
    progress: Arc<dyn ProgressHandler>,
    work_dir: PathBuf,
    keep_workdirs: bool,
    deployments: DashMap<String, Arc<Tracked>>,
}

impl DeploymentService {
    pub fn builder(work_dir: impl Into<PathBuf>) -> DeploymentServiceBuilder {
        DeploymentServiceBuilder::new(work_dir)
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn provisioner(&self) -> &Arc<dyn Provisioner> {
        &self.provisioner
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Mints a new session and registers it with the store
    pub fn create_session(&self) -> SessionId {
        let id = SessionId::generate();
        self.guard.store().get_or_create(&id, Instant::now());
        info!(session = %id, "Session created");
        id
    }

    /// Admits `request`, claims the session's build slot and starts the
    /// deployment in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(self: &Arc<Self>, request: DeploymentRequest) -> Result<Submitted, DeployError> {
        let admitted = self.guard.admit(
            request.session_id.as_deref(),
            &request.repository_url,
            request.project_name.as_deref(),
        )?;

        let deployment_id = Uuid::new_v4().to_string();
        lock(&admitted.session)
            .claim_build(&deployment_id)
            .map_err(|existing| {
                warn!(session = %admitted.session_id, active = %existing, "Deployment rejected, build in progress");
                DeployError::Conflict {
                    session_id: admitted.session_id.to_string(),
                    deployment_id: existing,
                }
            })?;

        let workspace = self.work_dir.join("deployments").join(&deployment_id);
        let job = SharedBuildJob::new(BuildJob::new(
            admitted.session_id.clone(),
            workspace.join("source"),
        ));
        let (status, _) = watch::channel(DeploymentStatus::Pending);
        let tracked = Arc::new(Tracked {
            record: Mutex::new(DeploymentRecord::new(
                deployment_id.clone(),
                admitted.repository.to_string(),
                admitted.project_name.clone(),
                job.snapshot(),
            )),
            job,
            status,
        });
        self.deployments
            .insert(deployment_id.clone(), Arc::clone(&tracked));

        let slot = BuildSlot {
            session: Arc::clone(&admitted.session),
            deployment_id: deployment_id.clone(),
            tracked: Arc::clone(&tracked),
            released: false,
        };
        info!(
            deployment = %deployment_id,
            session = %admitted.session_id,
            project = %admitted.project_name,
            "Deployment accepted"
        );

        let service = Arc::clone(self);
        let token = request.github_token;
        tokio::spawn(async move {
            let outcome = service
                .run(&tracked, &admitted, token.as_deref(), &workspace)
                .await;
            slot.finish(outcome);
        });

        Ok(Submitted {
            deployment_id,
            status: DeploymentStatus::Pending,
        })
    }

    /// Snapshot of a deployment owned by `session`.
    ///
    /// Deployments of other sessions are reported as not found.
    pub fn get(&self, deployment_id: &str, session: &SessionId) -> Result<DeploymentRecord, DeployError> {
        let record = self.tracked(deployment_id)?.snapshot();
        if &record.session_id != session {
            return Err(DeployError::NotFound(deployment_id.to_string()));
        }
        Ok(record)
    }

    /// Session-guarded read for pollers; does not count against the rate limit
    pub fn status(
        &self,
        deployment_id: &str,
        raw_session: Option<&str>,
    ) -> Result<DeploymentRecord, DeployError> {
        let session = self.guard.authorize(raw_session)?;
        self.get(deployment_id, &session)
    }

    /// Waits until the deployment is `ready` or `failed`
    pub async fn wait_terminal(&self, deployment_id: &str) -> Result<DeploymentRecord, DeployError> {
        let tracked = self.tracked(deployment_id)?;
        let mut status = tracked.status.subscribe();
        status
            .wait_for(|s| s.is_terminal())
            .await
            .map_err(|_| DeployError::Internal("deployment status channel closed".to_string()))?;
        Ok(tracked.snapshot())
    }

    /// Drops the finished deployments of expired sessions along with their
    /// staged output. Deployments still running are left alone.
    ///
    /// Returns the number of records removed.
    pub fn purge_sessions(&self, sessions: &[SessionId]) -> usize {
        let mut staging_dirs = Vec::new();
        let before = self.deployments.len();
        self.deployments.retain(|_, tracked| {
            let owned = sessions.contains(&tracked.lock().session_id);
            if !owned || !tracked.is_terminal() {
                return true;
            }
            staging_dirs.extend(tracked.job.snapshot().staging_dir);
            false
        });
        let removed = before.saturating_sub(self.deployments.len());

        for dir in staging_dirs {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %dir.display(), error = %e, "Failed to remove staged output");
                }
            }
        }
        if removed > 0 {
            info!(removed, sessions = sessions.len(), "Purged deployments of expired sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }

    fn tracked(&self, deployment_id: &str) -> Result<Arc<Tracked>, DeployError> {
        self.deployments
            .get(deployment_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DeployError::NotFound(deployment_id.to_string()))
    }

    /// Runs the pipeline, emits the closing progress event and cleans up.
    /// The caller records the outcome.
    async fn run(
        &self,
        tracked: &Tracked,
        admitted: &AdmittedRequest,
        token: Option<&str>,
        workspace: &Path,
    ) -> Result<Option<String>, DeployError> {
        let started = Instant::now();
        let deployment_id = tracked.lock().id.clone();
        self.progress.on_progress(&ProgressEvent::DeploymentStarted {
            deployment_id: deployment_id.clone(),
            repository: admitted.repository.to_string(),
        });

        let outcome = self.execute(tracked, &deployment_id, admitted, token).await;
        match &outcome {
            Ok(url) => {
                self.progress.on_progress(&ProgressEvent::Completed {
                    deployment_id,
                    url: url.clone(),
                    total_time: started.elapsed(),
                });
            }
            Err(err) => {
                let job = &tracked.job;
                if !job.state().is_terminal() {
                    job.push_log(LogPhase::Source, OutputStream::System, err.to_string());
                    let _ = job.transition(BuildState::Failed);
                }
                self.progress.on_progress(&ProgressEvent::Failed {
                    deployment_id,
                    error: err.to_string(),
                });
            }
        }

        if !self.keep_workdirs {
            remove_dir(workspace).await;
            // Staged output of a ready deployment is its published artifact
            if outcome.is_err() {
                if let Some(staging) = tracked.job.snapshot().staging_dir {
                    remove_dir(&staging).await;
                }
            }
        }
        outcome
    }

    async fn execute(
        &self,
        tracked: &Tracked,
        deployment_id: &str,
        admitted: &AdmittedRequest,
        token: Option<&str>,
    ) -> Result<Option<String>, DeployError> {
        let job = &tracked.job;
        let source_dir = job.source_dir();

        tracked.set_status(DeploymentStatus::Fetching);
        let fetch_started = Instant::now();
        self.fetcher
            .fetch(&admitted.repository, token, &source_dir, job)
            .await?;
        self.progress.on_progress(&ProgressEvent::SourceFetched {
            deployment_id: deployment_id.to_string(),
            duration: fetch_started.elapsed(),
        });

        tracked.set_status(DeploymentStatus::Analyzing);
        let analysis = match self.analyzer.analyze(&source_dir).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(deployment = %deployment_id, error = %e, "Analysis failed, continuing as unknown stack");
                AnalysisResult::unknown()
            }
        };

        let resolution = self.registry.resolve(&analysis.stack_type);
        let handler = resolution.handler;
        self.progress.on_progress(&ProgressEvent::StackResolved {
            deployment_id: deployment_id.to_string(),
            stack: analysis.stack_type.to_string(),
            handler: handler.name().to_string(),
            fallback: resolution.fallback,
        });
        let plan = handler.plan(&source_dir, &analysis);
        let kinds = handler.resources(&analysis);
        tracked.update(|r| {
            r.analysis = Some(analysis.clone());
            r.handler = Some(handler.name().to_string());
            r.fallback = resolution.fallback;
        });

        tracked.set_status(DeploymentStatus::Building);
        let staging_dir = self.executor.run(job, &plan).await?;

        tracked.set_status(DeploymentStatus::Provisioning);
        let identity = self.provisioner.validate_credentials().await?;
        debug!(deployment = %deployment_id, arn = ?identity.arn, "Provisioning as caller");

        let names = self
            .namer
            .names_for(&admitted.project_name, &admitted.session_id, &kinds);
        tracked.update(|r| r.resource_names = names.clone());

        let request = ProvisionRequest {
            deployment_id: deployment_id.to_string(),
            project: admitted.project_name.clone(),
            names,
            staging_dir,
            entry_file: plan.entry_file.clone(),
            repository_url: admitted.repository.url.clone(),
            install_command: plan.install_command.clone(),
            build_command: plan.build_command.clone(),
            output_dir: plan.output_dir.clone(),
        };
        let result = self.provisioner.provision(&request).await;

        let resources = match &result {
            Ok(report) => report.resources.clone(),
            Err(e) => e.resources.clone(),
        };
        for resource in &resources {
            self.progress.on_progress(&ProgressEvent::ResourceProvisioned {
                deployment_id: deployment_id.to_string(),
                kind: resource.kind,
                name: resource.name.clone(),
                status: resource.status,
            });
        }
        tracked.update(|r| r.resources = resources);

        Ok(result?.url)
    }
}

async fn remove_dir(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove working directory");
        }
    }
}

/// Assembles a [`DeploymentService`]; unset collaborators get local defaults
pub struct DeploymentServiceBuilder {
    work_dir: PathBuf,
    guard: Option<SessionGuard>,
    registry: Option<Arc<HandlerRegistry>>,
    analyzer: Option<Arc<dyn StackAnalyzer>>,
    fetcher: Option<Arc<dyn SourceFetcher>>,
    executor_options: Option<ExecutorOptions>,
    provisioner: Option<Arc<dyn Provisioner>>,
    namer: ResourceNamer,
    progress: Arc<dyn ProgressHandler>,
    keep_workdirs: bool,
}

impl DeploymentServiceBuilder {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            guard: None,
            registry: None,
            analyzer: None,
            fetcher: None,
            executor_options: None,
            provisioner: None,
            namer: ResourceNamer::default(),
            progress: Arc::new(NoOpHandler),
            keep_workdirs: false,
        }
    }

    pub fn guard(mut self, guard: SessionGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn StackAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn executor_options(mut self, options: ExecutorOptions) -> Self {
        self.executor_options = Some(options);
        self
    }

    pub fn provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn namer(mut self, namer: ResourceNamer) -> Self {
        self.namer = namer;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn keep_workdirs(mut self, keep: bool) -> Self {
        self.keep_workdirs = keep;
        self
    }

    pub fn build(self) -> DeploymentService {
        let options = self
            .executor_options
            .unwrap_or_else(|| ExecutorOptions::new(self.work_dir.join("staging")));
        DeploymentService {
            guard: self.guard.unwrap_or_else(|| {
                SessionGuard::new(Arc::new(InMemorySessionStore::new()), GuardConfig::default())
            }),
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(HandlerRegistry::with_defaults())),
            analyzer: self.analyzer.unwrap_or_else(|| Arc::new(ManifestAnalyzer)),
            fetcher: self
                .fetcher
                .unwrap_or_else(|| Arc::new(GitFetcher::default())),
            executor: BuildExecutor::new(options).with_progress(Arc::clone(&self.progress)),
            provisioner: self
                .provisioner
                .unwrap_or_else(|| Arc::new(DryRunProvisioner::new("us-east-1"))),
            namer: self.namer,
            progress: self.progress,
            work_dir: self.work_dir,
            keep_workdirs: self.keep_workdirs,
            deployments: DashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FixedAnalyzer;
    use crate::error::ValidationError;
    use crate::source::{LocalFetcher, RepositoryRef, SourceError};
    use crate::stack::StackId;
    use async_trait::async_trait;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const REPO: &str = "https://github.com/acme/site";

    fn static_site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/index.html"), "<h1>acme</h1>").unwrap();
        dir
    }

    fn service(work: &TempDir, fetcher: Arc<dyn SourceFetcher>) -> Arc<DeploymentService> {
        Arc::new(
            DeploymentService::builder(work.path())
                .fetcher(fetcher)
                .analyzer(Arc::new(FixedAnalyzer::stack(StackId::Static)))
                .build(),
        )
    }

    /// Blocks inside fetch until the gate opens, then fails the clone
    struct GatedFetcher {
        gate: watch::Receiver<bool>,
    }

    #[async_trait]
    impl SourceFetcher for GatedFetcher {
        async fn fetch(
            &self,
            _repo: &RepositoryRef,
            _token: Option<&str>,
            _dest: &Path,
            _job: &SharedBuildJob,
        ) -> Result<(), SourceError> {
            let mut gate = self.gate.clone();
            let _ = gate.wait_for(|open| *open).await;
            Err(SourceError::CloneFailed {
                exit_code: Some(128),
                message: "repository not found".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_static_deploy_reaches_ready() {
        let (work, site) = (TempDir::new().unwrap(), static_site());
        let service = service(&work, Arc::new(LocalFetcher::new(site.path())));
        let session = service.create_session();

        let submitted = service
            .submit(DeploymentRequest::new(REPO).with_session(session.as_str()))
            .unwrap();
        assert_eq!(submitted.status, DeploymentStatus::Pending);

        let record = service.wait_terminal(&submitted.deployment_id).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Ready, "{:?}", record.error);
        assert_eq!(record.build.state, BuildState::Ready);
        assert_eq!(record.handler.as_deref(), Some("static"));
        assert_eq!(record.project_name, "site");
        assert!(record.url.unwrap().starts_with("file://"));
        assert_eq!(record.resource_names.len(), 2);
    }

    #[tokio::test]
    async fn test_second_deploy_for_busy_session_conflicts() {
        let work = TempDir::new().unwrap();
        let (open, gate) = watch::channel(false);
        let service = service(&work, Arc::new(GatedFetcher { gate }));
        let busy = service.create_session();
        let other = service.create_session();

        let first = service
            .submit(DeploymentRequest::new(REPO).with_session(busy.as_str()))
            .unwrap();
        let err = service
            .submit(DeploymentRequest::new(REPO).with_session(busy.as_str()))
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
        match err {
            DeployError::Conflict { deployment_id, .. } => {
                assert_eq!(deployment_id, first.deployment_id)
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        let second = service
            .submit(DeploymentRequest::new(REPO).with_session(other.as_str()))
            .unwrap();

        open.send_replace(true);
        let record = service.wait_terminal(&first.deployment_id).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(record.error.unwrap().error, "source-error");
        assert_eq!(record.build.state, BuildState::Failed);
        service.wait_terminal(&second.deployment_id).await.unwrap();

        // The slot is free as soon as the terminal status is visible
        let retry = service
            .submit(DeploymentRequest::new(REPO).with_session(busy.as_str()))
            .unwrap();
        service.wait_terminal(&retry.deployment_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_other_sessions_cannot_read_record() {
        let (work, site) = (TempDir::new().unwrap(), static_site());
        let service = service(&work, Arc::new(LocalFetcher::new(site.path())));
        let owner = service.create_session();
        let stranger = service.create_session();

        let submitted = service
            .submit(DeploymentRequest::new(REPO).with_session(owner.as_str()))
            .unwrap();
        service.wait_terminal(&submitted.deployment_id).await.unwrap();

        assert!(service.get(&submitted.deployment_id, &owner).is_ok());
        assert!(matches!(
            service.get(&submitted.deployment_id, &stranger),
            Err(DeployError::NotFound(_))
        ));
        assert!(matches!(
            service.status("missing", Some(owner.as_str())),
            Err(DeployError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_deployments_are_purged() {
        let (work, site) = (TempDir::new().unwrap(), static_site());
        let service = service(&work, Arc::new(LocalFetcher::new(site.path())));
        let idle = service.create_session();
        let active = service.create_session();

        let gone = service
            .submit(DeploymentRequest::new(REPO).with_session(idle.as_str()))
            .unwrap();
        let kept = service
            .submit(DeploymentRequest::new(REPO).with_session(active.as_str()))
            .unwrap();
        let gone_record = service.wait_terminal(&gone.deployment_id).await.unwrap();
        service.wait_terminal(&kept.deployment_id).await.unwrap();
        let staging = gone_record.build.staging_dir.unwrap();
        assert!(staging.is_dir());

        let store = service.guard().store();
        let later = Instant::now() + Duration::from_secs(600);
        lock(&store.get(&active).unwrap()).touch(later);
        let expired = store.evict_expired(later, Duration::from_secs(300));
        assert_eq!(expired, vec![idle.clone()]);

        assert_eq!(service.purge_sessions(&expired), 1);
        assert!(matches!(
            service.get(&gone.deployment_id, &idle),
            Err(DeployError::NotFound(_))
        ));
        assert!(!staging.exists());
        assert!(service.get(&kept.deployment_id, &active).is_ok());
        assert_eq!(service.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_keeps_running_deployments() {
        let work = TempDir::new().unwrap();
        let (open, gate) = watch::channel(false);
        let service = service(&work, Arc::new(GatedFetcher { gate }));
        let session = service.create_session();

        let running = service
            .submit(DeploymentRequest::new(REPO).with_session(session.as_str()))
            .unwrap();
        assert_eq!(service.purge_sessions(std::slice::from_ref(&session)), 0);
        assert_eq!(service.len(), 1);

        open.send_replace(true);
        service.wait_terminal(&running.deployment_id).await.unwrap();
        assert_eq!(service.purge_sessions(&[session]), 1);
        assert!(service.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected_before_work() {
        let work = TempDir::new().unwrap();
        let service = service(&work, Arc::new(LocalFetcher::new(work.path())));

        let err = service.submit(DeploymentRequest::new(REPO)).unwrap_err();
        assert!(matches!(err, DeployError::Validation(ValidationError::MissingSession)));

        let session = service.create_session();
        let err = service
            .submit(DeploymentRequest::new("http://example.com/a/b").with_session(session.as_str()))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(service.is_empty());
    }

    #[tokio::test]
    async fn test_missing_entry_file_fails_verification() {
        let (work, site) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        fs::write(site.path().join("README.md"), "no site here").unwrap();
        let service = service(&work, Arc::new(LocalFetcher::new(site.path())));
        let session = service.create_session();

        let submitted = service
            .submit(DeploymentRequest::new(REPO).with_session(session.as_str()))
            .unwrap();
        let record = service.wait_terminal(&submitted.deployment_id).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(record.error.unwrap().error, "verification-failure");
        assert!(record.resources.is_empty());
    }
}
