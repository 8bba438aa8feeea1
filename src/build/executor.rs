//! Drives a build job through install, build, verification and staging

use super::process::{run_scoped, CommandSpec, ProcessOutcome};
use super::staging::stage_output;
use super::{
    BuildErrorKind, BuildFailure, BuildPlan, BuildState, LogPhase, OutputStream, SharedBuildJob,
};
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Wall-clock bound applied to each subprocess phase
    pub timeout: Duration,
    /// Parent of the per-job staging directories
    pub staging_root: PathBuf,
}

impl ExecutorOptions {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            timeout: DEFAULT_BUILD_TIMEOUT,
            staging_root: staging_root.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct BuildExecutor {
    options: ExecutorOptions,
    progress: Arc<dyn ProgressHandler>,
}

impl BuildExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            options,
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Runs `plan` for a pending `job`, returning the staging directory.
    ///
    /// Every failure leaves the job in `failed` with the failure recorded and
    /// a system line appended to the log of the phase that broke.
    pub async fn run(&self, job: &SharedBuildJob, plan: &BuildPlan) -> Result<PathBuf, BuildFailure> {
        let result = self.execute(job, plan).await;

        if let Err(failure) = &result {
            let phase = phase_of(job.state());
            job.push_log(phase, OutputStream::System, failure.to_string());
            if let Err(e) = job.fail(failure.clone()) {
                warn!(job = %job.id(), error = %e, "Could not mark job failed");
            }
            warn!(job = %job.id(), kind = failure.kind.as_str(), "Build failed: {}", failure.message);
        }

        result
    }

    async fn execute(&self, job: &SharedBuildJob, plan: &BuildPlan) -> Result<PathBuf, BuildFailure> {
        let source_dir = job.source_dir();
        job.update(|j| {
            j.install_command = plan.install_command.clone();
            j.build_command = plan.build_command.clone();
        });

        let started = self.enter(job, BuildState::Installing)?;
        self.run_phase(
            job,
            LogPhase::Install,
            plan.install_command.as_deref(),
            &source_dir,
            &plan.env,
            BuildErrorKind::InstallFailure,
        )
        .await?;
        self.complete(job, BuildState::Installing, started);

        let started = self.enter(job, BuildState::Building)?;
        self.run_phase(
            job,
            LogPhase::Build,
            plan.build_command.as_deref(),
            &source_dir,
            &plan.env,
            BuildErrorKind::BuildFailure,
        )
        .await?;
        self.complete(job, BuildState::Building, started);

        let started = self.enter(job, BuildState::Verifying)?;
        let output_dir = verify_output(job, plan, &source_dir)?;
        self.complete(job, BuildState::Verifying, started);

        let started = self.enter(job, BuildState::Staging)?;
        let staging_dir = self.stage(job, &output_dir).await?;
        self.complete(job, BuildState::Staging, started);

        self.enter(job, BuildState::Ready)?;
        info!(job = %job.id(), staging = %staging_dir.display(), "Build ready");
        Ok(staging_dir)
    }

    fn enter(&self, job: &SharedBuildJob, state: BuildState) -> Result<Instant, BuildFailure> {
        job.transition(state)
            .map_err(|e| BuildFailure::new(failure_kind_for(state), e.to_string()))?;
        self.progress.on_progress(&ProgressEvent::PhaseStarted {
            job_id: job.id(),
            state,
        });
        Ok(Instant::now())
    }

    fn complete(&self, job: &SharedBuildJob, state: BuildState, started: Instant) {
        self.progress.on_progress(&ProgressEvent::PhaseComplete {
            job_id: job.id(),
            state,
            duration: started.elapsed(),
        });
    }

    async fn run_phase(
        &self,
        job: &SharedBuildJob,
        phase: LogPhase,
        command: Option<&str>,
        cwd: &Path,
        env: &[(String, String)],
        kind: BuildErrorKind,
    ) -> Result<(), BuildFailure> {
        let Some(command) = command.filter(|c| !c.trim().is_empty()) else {
            job.push_log(phase, OutputStream::System, "No command configured, skipping");
            return Ok(());
        };

        job.push_log(phase, OutputStream::System, format!("$ {}", command));
        let spec = CommandSpec::shell(command, cwd)
            .env("CI", "true")
            .envs(env.iter().cloned());

        let timeout = self.options.timeout;
        let outcome = run_scoped(&spec, timeout, |stream, line| job.push_log(phase, stream, line))
            .await
            .map_err(|e| BuildFailure::new(kind, format!("Failed to start `{}`: {}", command, e)))?;

        match outcome {
            ProcessOutcome::Exited(status) if status.success() => {
                debug!(job = %job.id(), ?phase, "Phase command succeeded");
                Ok(())
            }
            ProcessOutcome::Exited(status) => Err(BuildFailure::new(
                kind,
                describe_exit(command, status),
            )
            .with_exit_code(status.code())),
            ProcessOutcome::TimedOut => Err(BuildFailure::new(
                BuildErrorKind::Timeout,
                format!("`{}` exceeded the {}s timeout", command, timeout.as_secs_f64()),
            )),
        }
    }

    async fn stage(&self, job: &SharedBuildJob, output_dir: &Path) -> Result<PathBuf, BuildFailure> {
        let staging_dir = self.options.staging_root.join(job.id().to_string());

        let (src, dest) = (output_dir.to_path_buf(), staging_dir.clone());
        let copied = tokio::task::spawn_blocking(move || stage_output(&src, &dest))
            .await
            .map_err(|e| {
                BuildFailure::new(BuildErrorKind::StagingError, format!("Staging task failed: {}", e))
            })?
            .map_err(|e| {
                BuildFailure::new(
                    BuildErrorKind::StagingError,
                    format!("Failed to stage {}: {}", output_dir.display(), e),
                )
            })?;

        job.update(|j| j.staging_dir = Some(staging_dir.clone()));
        job.push_log(
            LogPhase::Stage,
            OutputStream::System,
            format!("Staged {} files into {}", copied, staging_dir.display()),
        );
        Ok(staging_dir)
    }
}

fn verify_output(
    job: &SharedBuildJob,
    plan: &BuildPlan,
    source_dir: &Path,
) -> Result<PathBuf, BuildFailure> {
    let output_dir = plan.output_path(source_dir).ok_or_else(|| {
        BuildFailure::new(
            BuildErrorKind::VerificationFailure,
            format!(
                "Output directory {} is outside the source tree",
                plan.output_dir.display()
            ),
        )
    })?;

    if !output_dir.is_dir() {
        return Err(BuildFailure::new(
            BuildErrorKind::VerificationFailure,
            format!("Output directory {} does not exist", plan.output_dir.display()),
        ));
    }

    let entry = output_dir.join(&plan.entry_file);
    if !entry.is_file() {
        return Err(BuildFailure::new(
            BuildErrorKind::VerificationFailure,
            format!(
                "Required entry file {} not found in {}",
                plan.entry_file,
                plan.output_dir.display()
            ),
        ));
    }

    job.update(|j| j.output_dir = Some(output_dir.clone()));
    job.push_log(
        LogPhase::Verify,
        OutputStream::System,
        format!("Found {}", entry.display()),
    );
    Ok(output_dir)
}

fn phase_of(state: BuildState) -> LogPhase {
    match state {
        BuildState::Pending | BuildState::Installing => LogPhase::Install,
        BuildState::Building => LogPhase::Build,
        BuildState::Verifying => LogPhase::Verify,
        BuildState::Staging | BuildState::Ready | BuildState::Failed => LogPhase::Stage,
    }
}

fn failure_kind_for(state: BuildState) -> BuildErrorKind {
    match state {
        BuildState::Pending | BuildState::Installing => BuildErrorKind::InstallFailure,
        BuildState::Building => BuildErrorKind::BuildFailure,
        BuildState::Verifying => BuildErrorKind::VerificationFailure,
        BuildState::Staging | BuildState::Ready | BuildState::Failed => BuildErrorKind::StagingError,
    }
}

fn describe_exit(command: &str, status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("`{}` exited with code {}", command, code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("`{}` was terminated by signal {}", command, signal);
        }
    }
    format!("`{}` failed: {}", command, status)
}
