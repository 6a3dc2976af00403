// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema version strings.
//!
//! Versions are numeric with an optional `v`/`V` prefix (`v1`, `v2`, `v1.0.1`,
//! `3`).  Anything else is a *non-numeric* version: it can still be stored and
//! requested explicitly, but it is never ordered and never resolves as
//! `latest`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sentinel accepted wherever a concrete version may be requested.
pub const LATEST: &str = "latest";

/// Parse a version string into its numeric parts.
///
/// Returns `None` for empty or non-numeric versions.
pub fn parse_version(version: &str) -> Option<Vec<u64>> {
    let trimmed = version.trim();
    let digits = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return None;
    }

    digits
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                part.parse::<u64>().ok()
            }
        })
        .collect()
}

/// Whether `version` takes part in ordering (and therefore `latest`).
pub fn is_numeric(version: &str) -> bool {
    parse_version(version).is_some()
}

/// Compare two versions by their numeric parts.
///
/// Missing trailing parts count as zero, so `v1.0 == v1.0.0`.  Returns
/// `None` when either side is non-numeric.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    let len = a.len().max(b.len());

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}

/// Pick the highest numeric version from an iterator, ignoring
/// non-numeric entries.
pub fn highest<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter(|v| is_numeric(v))
        .fold(None, |best: Option<&'a str>, v| match best {
            Some(b) if compare_versions(v, b) != Some(Ordering::Greater) => Some(b),
            _ => Some(v),
        })
}

// ---------------------------------------------------------------------------
// SubscribedVersion
// ---------------------------------------------------------------------------

/// The schema version a handler subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscribedVersion {
    /// Always follow the newest version of the topic.
    Latest,
    /// A concrete version string.
    Exact(String),
}

impl SubscribedVersion {
    /// Build from an optional version; absence means `Latest`.
    pub fn from_option(version: Option<&str>) -> Self {
        match version {
            None => Self::Latest,
            Some(v) => Self::from(v.to_string()),
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Latest => LATEST,
            Self::Exact(v) => v,
        }
    }
}

impl From<String> for SubscribedVersion {
    fn from(value: String) -> Self {
        if value == LATEST {
            Self::Latest
        } else {
            Self::Exact(value)
        }
    }
}

impl From<&str> for SubscribedVersion {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<SubscribedVersion> for String {
    fn from(value: SubscribedVersion) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for SubscribedVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl Default for SubscribedVersion {
    fn default() -> Self {
        Self::Latest
    }
}

impl fmt::Display for SubscribedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
