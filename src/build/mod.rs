//! Build jobs: state machine, isolated subprocess phases, output staging
//!
//! A [`BuildJob`] moves strictly forward through
//! `pending → installing → building → verifying → staging → ready`, with
//! `failed` reachable from any non-terminal state. The [`BuildExecutor`]
//! drives a job through those states for a [`BuildPlan`] produced by a stack
//! handler.

pub mod executor;
pub mod process;
pub mod staging;

pub use executor::{BuildExecutor, ExecutorOptions, DEFAULT_BUILD_TIMEOUT};
pub use process::{run_scoped, CommandSpec, ProcessOutcome};
pub use staging::stage_output;

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Pending,
    Installing,
    Building,
    Verifying,
    Staging,
    Ready,
    Failed,
}

impl BuildState {
    /// The next state on the success path
    pub fn successor(&self) -> Option<BuildState> {
        match self {
            BuildState::Pending => Some(BuildState::Installing),
            BuildState::Installing => Some(BuildState::Building),
            BuildState::Building => Some(BuildState::Verifying),
            BuildState::Verifying => Some(BuildState::Staging),
            BuildState::Staging => Some(BuildState::Ready),
            BuildState::Ready | BuildState::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Ready | BuildState::Failed)
    }

    pub fn can_transition_to(&self, next: BuildState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == BuildState::Failed || self.successor() == Some(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::Pending => "pending",
            BuildState::Installing => "installing",
            BuildState::Building => "building",
            BuildState::Verifying => "verifying",
            BuildState::Staging => "staging",
            BuildState::Ready => "ready",
            BuildState::Failed => "failed",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline phase a log line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogPhase {
    Source,
    Install,
    Build,
    Verify,
    Stage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
    /// Lines written by the pipeline itself
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub phase: LogPhase,
    pub stream: OutputStream,
    pub line: String,
}

/// What a stack handler asks the executor to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPlan {
    pub install_command: Option<String>,
    pub build_command: Option<String>,
    /// Relative to the source directory; `.` is the repository root
    pub output_dir: PathBuf,
    pub entry_file: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
}

impl BuildPlan {
    pub const DEFAULT_ENTRY_FILE: &'static str = "index.html";

    /// A plan that serves `output_dir` as-is
    pub fn serve_only(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_command: None,
            build_command: None,
            output_dir: output_dir.into(),
            entry_file: Self::DEFAULT_ENTRY_FILE.to_string(),
            env: Vec::new(),
        }
    }

    pub fn with_install(mut self, command: impl Into<String>) -> Self {
        self.install_command = Some(command.into());
        self
    }

    pub fn with_build(mut self, command: impl Into<String>) -> Self {
        self.build_command = Some(command.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Resolves the output directory under `source_dir`, refusing absolute
    /// paths and parent traversal
    pub fn output_path(&self, source_dir: &Path) -> Option<PathBuf> {
        let contained = self
            .output_dir
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        contained.then(|| source_dir.join(&self.output_dir))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildErrorKind {
    InstallFailure,
    BuildFailure,
    Timeout,
    VerificationFailure,
    StagingError,
}

impl BuildErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildErrorKind::InstallFailure => "install-failure",
            BuildErrorKind::BuildFailure => "build-failure",
            BuildErrorKind::Timeout => "timeout",
            BuildErrorKind::VerificationFailure => "verification-failure",
            BuildErrorKind::StagingError => "staging-error",
        }
    }
}

/// Terminal failure of a build job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{}: {message}", .kind.as_str())]
pub struct BuildFailure {
    pub kind: BuildErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl BuildFailure {
    pub fn new(kind: BuildErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid build state transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: BuildState,
    pub to: BuildState,
}

/// One build attempt for a deployment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    pub id: Uuid,
    pub session_id: SessionId,
    pub source_dir: PathBuf,
    pub install_command: Option<String>,
    pub build_command: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub state: BuildState,
    pub logs: Vec<LogLine>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<BuildFailure>,
}

impl BuildJob {
    pub fn new(session_id: SessionId, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            source_dir: source_dir.into(),
            install_command: None,
            build_command: None,
            output_dir: None,
            staging_dir: None,
            state: BuildState::Pending,
            logs: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Moves to `next`; rejected transitions leave the job untouched
    pub fn transition(&mut self, next: BuildState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        let now = Utc::now();
        if self.state == BuildState::Pending {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.state = next;
        Ok(())
    }

    /// Records `failure` and moves to `failed` unless already terminal
    pub fn fail(&mut self, failure: BuildFailure) -> Result<(), TransitionError> {
        self.transition(BuildState::Failed)?;
        self.error = Some(failure);
        Ok(())
    }

    pub fn push_log(&mut self, phase: LogPhase, stream: OutputStream, line: impl Into<String>) {
        self.logs.push(LogLine {
            at: Utc::now(),
            phase,
            stream,
            line: line.into(),
        });
    }

    /// Log lines of one phase, in arrival order
    pub fn phase_logs(&self, phase: LogPhase) -> impl Iterator<Item = &LogLine> {
        self.logs.iter().filter(move |l| l.phase == phase)
    }
}

/// A [`BuildJob`] shared between the executor and pollers
#[derive(Debug, Clone)]
pub struct SharedBuildJob(Arc<Mutex<BuildJob>>);

impl SharedBuildJob {
    pub fn new(job: BuildJob) -> Self {
        Self(Arc::new(Mutex::new(job)))
    }

    fn lock(&self) -> MutexGuard<'_, BuildJob> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.lock().id
    }

    pub fn state(&self) -> BuildState {
        self.lock().state
    }

    pub fn source_dir(&self) -> PathBuf {
        self.lock().source_dir.clone()
    }

    pub fn transition(&self, next: BuildState) -> Result<(), TransitionError> {
        self.lock().transition(next)
    }

    pub fn fail(&self, failure: BuildFailure) -> Result<(), TransitionError> {
        self.lock().fail(failure)
    }

    pub fn push_log(&self, phase: LogPhase, stream: OutputStream, line: impl Into<String>) {
        self.lock().push_log(phase, stream, line);
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut BuildJob) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> BuildJob {
        self.lock().clone()
    }
}
