//! Request admission: identifier checks, rate limiting, input validation

use super::{lock, SessionHandle, SessionId, SessionStore, RATE_WINDOW};
use crate::error::{DeployError, RateLimitError, ValidationError};
use crate::source::RepositoryRef;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, warn};

static PROJECT_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{1,49}$").expect("project name pattern")
});

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Requests admitted per session inside the sliding window
    pub rate_limit_per_minute: usize,
    /// Hosts repository URLs may point at, compared case-insensitively
    pub allowed_hosts: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 60,
            allowed_hosts: vec!["github.com".to_string()],
        }
    }
}

/// A deployment request that passed every admission check
#[derive(Debug, Clone)]
pub struct AdmittedRequest {
    pub session_id: SessionId,
    pub session: SessionHandle,
    pub repository: RepositoryRef,
    pub project_name: String,
    /// Requests left in the current window
    pub remaining: usize,
}

pub struct SessionGuard {
    store: Arc<dyn SessionStore>,
    config: GuardConfig,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn SessionStore>, config: GuardConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Validates the identifier and refreshes the session without counting
    /// against its rate limit. Used for reads such as status polling.
    pub fn authorize(&self, raw_session: Option<&str>) -> Result<SessionId, ValidationError> {
        let id = SessionId::parse(raw_session.unwrap_or_default())?;
        let now = Instant::now();
        let handle = self.store.get_or_create(&id, now);
        lock(&handle).touch(now);
        Ok(id)
    }

    /// Validates the identifier and counts the request against the session's
    /// sliding window.
    pub fn admit_session(
        &self,
        raw_session: Option<&str>,
        now: Instant,
    ) -> Result<(SessionId, SessionHandle, usize), DeployError> {
        let id = SessionId::parse(raw_session.unwrap_or_default())?;
        let handle = self.store.get_or_create(&id, now);

        let remaining = {
            let mut session = lock(&handle);
            session.touch(now);
            session
                .window_mut()
                .try_admit(now, self.config.rate_limit_per_minute)
        };

        match remaining {
            Ok(remaining) => {
                debug!(session = %id, remaining, "Request admitted");
                Ok((id, handle, remaining))
            }
            Err(retry_after) => {
                // Round up so a client honouring the header is never early
                let retry_after_secs = retry_after.as_secs()
                    + u64::from(retry_after.subsec_nanos() > 0);
                warn!(session = %id, retry_after_secs, "Rate limit exceeded");
                Err(RateLimitError {
                    limit: self.config.rate_limit_per_minute,
                    window_secs: RATE_WINDOW.as_secs(),
                    retry_after_secs: retry_after_secs.max(1),
                }
                .into())
            }
        }
    }

    /// Full admission for a deployment request: session, rate limit, then
    /// repository URL and project name.
    pub fn admit(
        &self,
        raw_session: Option<&str>,
        repository_url: &str,
        project_name: Option<&str>,
    ) -> Result<AdmittedRequest, DeployError> {
        self.admit_at(raw_session, repository_url, project_name, Instant::now())
    }

    pub fn admit_at(
        &self,
        raw_session: Option<&str>,
        repository_url: &str,
        project_name: Option<&str>,
        now: Instant,
    ) -> Result<AdmittedRequest, DeployError> {
        let (session_id, session, remaining) = self.admit_session(raw_session, now)?;

        let repository = RepositoryRef::parse(repository_url, &self.config.allowed_hosts)?;
        let project_name = match project_name.map(str::trim).filter(|p| !p.is_empty()) {
            Some(name) => validate_project_name(name)?.to_string(),
            None => derive_project_name(&repository.name),
        };

        Ok(AdmittedRequest {
            session_id,
            session,
            repository,
            project_name,
            remaining,
        })
    }
}

pub fn validate_project_name(name: &str) -> Result<&str, ValidationError> {
    if PROJECT_NAME_PATTERN.is_match(name) {
        Ok(name)
    } else {
        let shown: String = name.chars().take(80).collect();
        Err(ValidationError::InvalidProjectName(shown))
    }
}

/// Builds a valid project name from a repository name
pub fn derive_project_name(repo_name: &str) -> String {
    let mapped: String = repo_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let mut name: String = mapped
        .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
        .chars()
        .take(50)
        .collect();

    if name.is_empty() {
        return "site".to_string();
    }
    if name.len() < 2 {
        name.push_str("-site");
    }
    name
}
