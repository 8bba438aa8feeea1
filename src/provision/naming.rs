//! Resource name generation
//!
//! `prefix + project + "-" + session + "-" + kind + "-" + time`, where every
//! segment is restricted to lower-case ASCII letters, digits and hyphens so
//! the result is a valid S3 bucket name. Not idempotent: each call draws a
//! fresh time suffix.

use super::ResourceKind;
use crate::session::SessionId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAX_NAME_LEN: usize = 63;
pub const PROJECT_SEGMENT_LEN: usize = 24;
pub const SESSION_SEGMENT_LEN: usize = 8;
pub const TIME_SUFFIX_LEN: usize = 8;
pub const DEFAULT_PREFIX: &str = "sf-";

static LAST_TICK: AtomicU64 = AtomicU64::new(0);

/// Epoch milliseconds, strictly increasing across calls within the process
fn next_tick() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    match LAST_TICK.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last + 1))
    }) {
        Ok(prev) | Err(prev) => now.max(prev + 1),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNamer {
    prefix: String,
}

impl ResourceNamer {
    /// `prefix` is expected to be pre-validated (see `SiteforgeConfig::validate`)
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn generate(&self, project: &str, session: &SessionId, kind: ResourceKind) -> String {
        self.generate_at(project, session, kind, next_tick())
    }

    /// Name for an explicit millisecond timestamp
    pub fn generate_at(
        &self,
        project: &str,
        session: &SessionId,
        kind: ResourceKind,
        millis: u64,
    ) -> String {
        let mut project = sanitize(project, PROJECT_SEGMENT_LEN);
        if project.is_empty() {
            project.push_str("site");
        }
        let name = format!(
            "{}{}-{}-{}-{}",
            self.prefix,
            project,
            session.short(SESSION_SEGMENT_LEN),
            kind.name_segment(),
            time_suffix(millis)
        );
        debug_assert!(name.len() <= MAX_NAME_LEN);
        name
    }

    /// One name per kind, all sharing a single timestamp
    pub fn names_for(
        &self,
        project: &str,
        session: &SessionId,
        kinds: &[ResourceKind],
    ) -> BTreeMap<ResourceKind, String> {
        let millis = next_tick();
        kinds
            .iter()
            .map(|&kind| (kind, self.generate_at(project, session, kind, millis)))
            .collect()
    }
}

impl Default for ResourceNamer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

/// Lower-cases, maps anything outside `[a-z0-9-]` to `-`, collapses and trims
/// hyphen runs, then truncates to `max` characters
pub fn sanitize(raw: &str, max: usize) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    out.truncate(max);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Base-36 rendering of `millis`, keeping only the last 8 characters
pub fn time_suffix(millis: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if millis == 0 {
        return "0".to_string();
    }
    let mut n = millis;
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.truncate(TIME_SUFFIX_LEN);
    digits.iter().rev().map(|&b| b as char).collect()
}

/// S3 bucket naming rules for the subset of names this crate produces
pub fn is_valid_bucket_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    (3..=MAX_NAME_LEN).contains(&bytes.len())
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-' || *b == b'.')
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && !name.contains("..")
        && !name.starts_with("xn--")
        && !name.starts_with("sthree-")
        && !name.ends_with("-s3alias")
        && !name.ends_with("--ol-s3")
}
