//! Shallow clone through the scoped process runner

use super::{auth_header, RepositoryRef, SourceError, SourceFetcher};
use crate::build::{run_scoped, CommandSpec, LogPhase, OutputStream, ProcessOutcome, SharedBuildJob};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Clones with `git clone --depth 1`
#[derive(Debug, Clone)]
pub struct GitFetcher {
    command: Vec<String>,
    timeout: Duration,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self {
            command: vec!["git".to_string()],
            timeout: DEFAULT_CLONE_TIMEOUT,
        }
    }
}

impl GitFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Replaces the `git` invocation, e.g. `["sh", "/path/to/wrapper"]`
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        if !command.is_empty() {
            self.command = command;
        }
        self
    }
}

fn redact(line: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(line.to_string(), |line, secret| line.replace(secret, "***"))
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(
        &self,
        repo: &RepositoryRef,
        token: Option<&str>,
        dest: &Path,
        job: &SharedBuildJob,
    ) -> Result<(), SourceError> {
        let parent = dest.parent().unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| SourceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        if dest.exists() {
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|source| SourceError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
        }

        let mut spec = CommandSpec::new(&self.command[0], parent);
        for arg in &self.command[1..] {
            spec = spec.arg(arg);
        }
        let mut spec = spec
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--single-branch")
            .arg(repo.clone_url())
            .arg(dest.to_string_lossy())
            .env("GIT_TERMINAL_PROMPT", "0");

        // Credentials travel in the environment, which other users cannot read
        let header = auth_header(token);
        if let Some(header) = &header {
            spec = spec
                .env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", header.as_str());
        }
        let secrets: Vec<&str> = token.into_iter().chain(header.as_deref()).collect();

        job.push_log(
            LogPhase::Source,
            OutputStream::System,
            format!("$ git clone --depth 1 {} {}", repo, dest.display()),
        );
        debug!(repo = %repo, dest = %dest.display(), authenticated = token.is_some(), "Cloning repository");

        let mut last_stderr = None;
        let outcome = run_scoped(&spec, self.timeout, |stream, line| {
            let line = redact(&line, &secrets);
            if stream == OutputStream::Stderr && !line.trim().is_empty() {
                last_stderr = Some(line.clone());
            }
            job.push_log(LogPhase::Source, stream, line);
        })
        .await
        .map_err(|e| SourceError::Spawn(e.to_string()))?;

        match outcome {
            ProcessOutcome::Exited(status) if status.success() => {
                info!(repo = %repo, "Repository cloned");
                Ok(())
            }
            ProcessOutcome::Exited(status) => Err(SourceError::CloneFailed {
                exit_code: status.code(),
                message: last_stderr.unwrap_or_else(|| format!("git exited with {}", status)),
            }),
            ProcessOutcome::TimedOut => Err(SourceError::Timeout(self.timeout.as_secs())),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::build::BuildJob;
    use crate::session::SessionId;
    use std::fs;
    use tempfile::TempDir;

    fn repo() -> RepositoryRef {
        RepositoryRef::parse("https://github.com/acme/site", &["github.com".to_string()]).unwrap()
    }

    fn job(dir: &Path) -> SharedBuildJob {
        SharedBuildJob::new(BuildJob::new(SessionId::generate(), dir))
    }

    /// A stand-in for git that echoes its arguments and creates the target
    fn fake_git(dir: &Path, body: &str) -> GitFetcher {
        let script = dir.join("fake-git.sh");
        fs::write(&script, body).unwrap();
        GitFetcher::new(Duration::from_secs(10))
            .with_command(["sh".to_string(), script.to_string_lossy().into_owned()])
    }

    #[tokio::test]
    async fn test_token_travels_in_environment_not_arguments() {
        let tmp = TempDir::new().unwrap();
        let fetcher = fake_git(
            tmp.path(),
            r#"for last; do :; done
echo "cloning $@" >&2
echo "header $GIT_CONFIG_VALUE_0" >&2
mkdir -p "$last" && echo "<h1>hi</h1>" > "$last/index.html"
printf '%s' "$@" > "$last/.args"
printf '%s\n%s\n%s' "$GIT_CONFIG_COUNT" "$GIT_CONFIG_KEY_0" "$GIT_CONFIG_VALUE_0" > "$last/.git-config-env"
"#,
        );
        let dest = tmp.path().join("work/checkout");
        let job = job(&dest);

        fetcher
            .fetch(&repo(), Some("ghp_secret123"), &dest, &job)
            .await
            .unwrap();

        assert!(dest.join("index.html").is_file());
        let args = fs::read_to_string(dest.join(".args")).unwrap();
        assert!(args.contains("https://github.com/acme/site.git"));
        assert!(!args.contains("ghp_secret123"));
        assert!(!args.contains("x-access-token"));

        let header = auth_header(Some("ghp_secret123")).unwrap();
        let env = fs::read_to_string(dest.join(".git-config-env")).unwrap();
        assert_eq!(env, format!("1\nhttp.extraHeader\n{}", header));

        let logs = job.snapshot().logs;
        let stderr: Vec<_> = logs
            .iter()
            .filter(|l| l.stream == OutputStream::Stderr)
            .map(|l| l.line.as_str())
            .collect();
        assert_eq!(stderr.len(), 2);
        assert!(stderr[0].contains("--depth 1"));
        assert_eq!(stderr[1], "header ***");
        assert!(logs
            .iter()
            .all(|l| !l.line.contains("ghp_secret123") && !l.line.contains(&header)));
        assert!(logs.iter().all(|l| l.phase == LogPhase::Source));
    }

    #[tokio::test]
    async fn test_anonymous_clone_sets_no_credentials() {
        let tmp = TempDir::new().unwrap();
        let fetcher = fake_git(
            tmp.path(),
            r#"for last; do :; done
mkdir -p "$last"
printf '%s' "${GIT_CONFIG_COUNT:-unset}" > "$last/.count"
"#,
        );
        let dest = tmp.path().join("checkout");

        fetcher.fetch(&repo(), None, &dest, &job(&dest)).await.unwrap();
        assert_eq!(fs::read_to_string(dest.join(".count")).unwrap(), "unset");
    }

    #[tokio::test]
    async fn test_clone_failure_reports_last_stderr_line() {
        let tmp = TempDir::new().unwrap();
        let fetcher = fake_git(
            tmp.path(),
            "echo \"Cloning into 'checkout'...\" >&2\necho 'fatal: repository not found' >&2\nexit 128\n",
        );
        let dest = tmp.path().join("checkout");

        let err = fetcher
            .fetch(&repo(), None, &dest, &job(&dest))
            .await
            .unwrap_err();
        match err {
            SourceError::CloneFailed { exit_code, message } => {
                assert_eq!(exit_code, Some(128));
                assert_eq!(message, "fatal: repository not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_clone_timeout() {
        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("slow.sh");
        fs::write(&script, "sleep 30\n").unwrap();
        let fetcher = GitFetcher::new(Duration::from_millis(300))
            .with_command(["sh".to_string(), script.to_string_lossy().into_owned()]);
        let dest = tmp.path().join("checkout");

        let err = fetcher
            .fetch(&repo(), None, &dest, &job(&dest))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout(_)));
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("https://x:tok@h", &["tok"]), "https://x:***@h");
        assert_eq!(redact("Basic abc tok", &["tok", "abc"]), "Basic *** ***");
        assert_eq!(redact("plain", &[]), "plain");
        assert_eq!(redact("plain", &[""]), "plain");
    }
}
