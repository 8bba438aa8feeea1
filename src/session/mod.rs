//! Session-scoped admission control
//!
//! A session is the client-side context that bounds rate limits and build
//! concurrency for one deployment workflow. Sessions are created on first
//! request, own their sliding request window exclusively, and expire after a
//! period of inactivity unless a build is holding their slot.

pub mod guard;
pub mod limiter;
pub mod store;

pub use guard::{derive_project_name, validate_project_name, AdmittedRequest, GuardConfig, SessionGuard};
pub use limiter::SlidingWindow;
pub use store::{lock, spawn_expiry_sweeper, InMemorySessionStore, SessionHandle, SessionStore};

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Length of the rate-limit window
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static SESSION_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sess_[A-Za-z0-9]{16,64}$").expect("session id pattern"));

/// Validated session identifier: `sess_` followed by 16 to 64 ASCII alphanumerics
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub const PREFIX: &'static str = "sess_";

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingSession);
        }
        if !SESSION_ID_PATTERN.is_match(trimmed) {
            let shown: String = trimmed.chars().take(80).collect();
            return Err(ValidationError::InvalidSession(shown));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Mints a fresh random identifier
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The random part after the `sess_` tag
    pub fn body(&self) -> &str {
        &self.0[Self::PREFIX.len()..]
    }

    /// Segment of at most `len` lower-case characters used in resource names.
    ///
    /// A body whose leading `len` characters are already lower-case yields
    /// that prefix. Otherwise the segment is a base-36 digest of the whole
    /// body, so ids differing only in letter case never share a segment.
    pub fn short(&self, len: usize) -> String {
        let prefix: String = self.body().chars().take(len).collect();
        if !prefix.bytes().any(|b| b.is_ascii_uppercase()) {
            return prefix;
        }
        let digest = Sha256::digest(self.body().as_bytes());
        let mut n = digest[..16]
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
        let mut out = String::with_capacity(len);
        for _ in 0..len.min(24) {
            out.push(BASE36[(n % 36) as usize] as char);
            n /= 36;
        }
        out
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-session state held in the [`SessionStore`]
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    last_activity: Instant,
    window: SlidingWindow,
    active_deployment: Option<String>,
}

impl Session {
    pub fn new(id: SessionId, now: Instant) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            last_activity: now,
            window: SlidingWindow::new(RATE_WINDOW),
            active_deployment: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut SlidingWindow {
        &mut self.window
    }

    /// Sessions holding a build slot never expire
    pub fn is_expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        self.active_deployment.is_none()
            && now.saturating_duration_since(self.last_activity) >= idle_timeout
    }

    pub fn active_deployment(&self) -> Option<&str> {
        self.active_deployment.as_deref()
    }

    /// Claims the session's single build slot.
    ///
    /// Returns the id of the deployment already holding it on conflict.
    pub fn claim_build(&mut self, deployment_id: &str) -> Result<(), String> {
        match &self.active_deployment {
            Some(existing) => Err(existing.clone()),
            None => {
                self.active_deployment = Some(deployment_id.to_string());
                Ok(())
            }
        }
    }

    /// Releases the slot if `deployment_id` still holds it
    pub fn release_build(&mut self, deployment_id: &str) {
        if self.active_deployment.as_deref() == Some(deployment_id) {
            self.active_deployment = None;
        }
    }
}
