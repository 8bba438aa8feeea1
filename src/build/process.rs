//! Scoped subprocess execution
//!
//! [`run_scoped`] spawns a command in its own process group, streams its
//! stdout and stderr line by line, and enforces a wall-clock deadline. On
//! every exit path the whole process group is killed, the leader is reaped and
//! the pipe readers are torn down, so nothing started by the command outlives
//! the call. Dropping the future mid-run has the same effect.

use super::OutputStream;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// How long to keep collecting buffered output once the group is dead
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
        }
    }

    /// `sh -c <command>` in `cwd`
    pub fn shell(command: &str, cwd: &Path) -> Self {
        Self::new("sh", cwd).arg("-c").arg(command)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(ExitStatus),
    TimedOut,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ProcessOutcome::Exited(status) if status.success())
    }

    /// Exit code, `None` on timeout or death by signal
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessOutcome::Exited(status) => status.code(),
            ProcessOutcome::TimedOut => None,
        }
    }
}

/// Owns the child; kills its process group when dropped before cleanup ran
struct ScopedChild {
    child: Child,
    pgid: Option<u32>,
    cleaned_up: bool,
}

impl ScopedChild {
    fn kill_group(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            // SAFETY: kill(2) with a negative pid signals the group and has no
            // memory-safety preconditions
            unsafe {
                libc::kill(-(pgid as libc::pid_t), libc::SIGKILL);
            }
        }
        #[cfg(not(unix))]
        let _ = self.pgid;

        let _ = self.child.start_kill();
    }
}

impl Drop for ScopedChild {
    fn drop(&mut self) {
        if !self.cleaned_up {
            self.kill_group();
        }
    }
}

fn spawn_reader<R>(
    reader: R,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<(OutputStream, String)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(&['\n', '\r'][..])
                        .to_string();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(?stream, error = %e, "Output reader stopped");
                    break;
                }
            }
        }
    })
}

/// Runs `spec` to completion or until `timeout` elapses.
///
/// Output lines are passed to `on_line` in arrival order. Spawn failures are
/// returned as errors; a non-zero exit is a normal [`ProcessOutcome`].
pub async fn run_scoped<F>(
    spec: &CommandSpec,
    timeout: Duration,
    mut on_line: F,
) -> io::Result<ProcessOutcome>
where
    F: FnMut(OutputStream, String),
{
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn()?;
    let pgid = child.id();
    debug!(command = %spec, pid = ?pgid, cwd = %spec.cwd.display(), "Spawned process");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, OutputStream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, OutputStream::Stderr, tx.clone()));
    }
    drop(tx);

    let mut scoped = ScopedChild {
        child,
        pgid,
        cleaned_up: false,
    };

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            Some((stream, line)) = rx.recv() => on_line(stream, line),
            status = scoped.child.wait() => break ProcessOutcome::Exited(status?),
            _ = &mut deadline => break ProcessOutcome::TimedOut,
        }
    };

    // Background jobs the command left behind die with the group
    scoped.kill_group();
    if outcome == ProcessOutcome::TimedOut {
        debug!(command = %spec, timeout_secs = timeout.as_secs(), "Process timed out");
        if let Err(e) = scoped.child.wait().await {
            debug!(error = %e, "Failed to reap timed-out process");
        }
    }
    scoped.cleaned_up = true;

    let drain = async {
        while let Some((stream, line)) = rx.recv().await {
            on_line(stream, line);
        }
    };
    if tokio::time::timeout(DRAIN_GRACE, drain).await.is_err() {
        debug!(command = %spec, "Output still open after process group exit");
    }
    for reader in readers {
        reader.abort();
    }

    Ok(outcome)
}
