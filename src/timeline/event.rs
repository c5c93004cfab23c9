use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

/// A matching message, merged across every folder and keyword it was found by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub message_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Folder of the first observation.
    pub primary_folder: String,
    pub source_folders: BTreeSet<String>,
    pub matched_keywords: BTreeSet<String>,
    pub snippet: String,
    pub has_attachments: bool,
    pub size_bytes: u64,
}

/// Identity of a message across folders.
///
/// The Message-ID header when there is one. Otherwise a composite of the
/// normalized subject, the sender and the timestamp truncated to the minute,
/// so two distinct messages sharing all three within the same minute merge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn of(event: &Event) -> Self {
        match &event.message_id {
            Some(id) => Identity(id.clone()),
            None => {
                let minute = event
                    .timestamp
                    .duration_trunc(TimeDelta::minutes(1))
                    .unwrap_or(event.timestamp);
                Identity(format!(
                    "{}\u{1f}{}\u{1f}{}",
                    normalize_subject(&event.subject),
                    event.sender.trim().to_lowercase(),
                    minute.format("%Y-%m-%dT%H:%MZ")
                ))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

pub fn normalize_subject(subject: &str) -> String {
    whitespace()
        .replace_all(subject.trim(), " ")
        .to_lowercase()
}

#[cfg(test)]
pub(crate) fn sample_event(id: Option<&str>, folder: &str, timestamp: DateTime<Utc>) -> Event {
    Event {
        message_id: id.map(str::to_string),
        subject: "quarterly numbers".to_string(),
        sender: "alice@example.com".to_string(),
        recipients: vec!["bob@example.com".to_string()],
        timestamp,
        primary_folder: folder.to_string(),
        source_folders: BTreeSet::from([folder.to_string()]),
        matched_keywords: BTreeSet::from(["numbers".to_string()]),
        snippet: "quarterly numbers".to_string(),
        has_attachments: false,
        size_bytes: 512,
    }
}
