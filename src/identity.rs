//! Work-item identities.
//!
//! An identity is `{YYYYmmdd_HHMMSS}_{topic_slug}`, assigned once when the
//! text artifact is written and never changed afterwards. Text files dropped
//! into `data/` by hand keep whatever stem they have.
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

fn slug_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static slug regex"))
}

fn identity_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{8}_\d{6})_(.+)$").expect("static identity regex"))
}

/// Unique key of one work item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemIdentity(String);

/// Timestamp and topic recovered from a conventional identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityParts<'a> {
    pub timestamp: &'a str,
    pub topic_slug: &'a str,
}

impl ItemIdentity {
    /// Build the identity for a freshly generated item.
    pub fn new_for_topic(now: NaiveDateTime, topic: &str) -> Self {
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        let slug = slugify(topic);
        if slug.is_empty() {
            return Self(format!("{stamp}_untitled"));
        }
        Self(format!("{stamp}_{slug}"))
    }

    /// Accept a file stem verbatim as an identity; rejects empty or path-like
    /// stems. Whitespace is kept so the identity maps back to the same file.
    pub fn from_stem(stem: &str) -> Option<Self> {
        if stem.is_empty() || stem.contains('/') || stem.contains('\\') || stem.starts_with('.') {
            return None;
        }
        Some(Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a conventional identity; `None` for hand-named items.
    pub fn parts(&self) -> Option<IdentityParts<'_>> {
        let caps = identity_shape().captures(&self.0)?;
        Some(IdentityParts {
            timestamp: caps.get(1)?.as_str(),
            topic_slug: caps.get(2)?.as_str(),
        })
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase a topic and collapse non-alphanumeric runs to `_`.
pub fn slugify(topic: &str) -> String {
    let lowered = topic.to_lowercase();
    slug_separator()
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}
