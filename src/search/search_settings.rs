use chrono::{DateTime, Duration as ChronoDuration, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

use crate::report::OutputFormat;

/// Upper bound on concurrent folder sessions when none is configured.
pub const MAX_DEFAULT_WORKERS: usize = 4;

/// Half-open `[start, end)` interval of message timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn days_back(now: DateTime<Utc>, days: u32) -> Result<Self, RequestError> {
        let start = ChronoDuration::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or(RequestError::DaysBackOutOfRange(days))?;
        Ok(DateRange { start, end: now })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn length(&self) -> ChronoDuration {
        self.end - self.start
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("at least one keyword is required")]
    NoKeywords,

    #[error("date range ends before it starts")]
    InvertedDateRange,

    #[error("cannot search {0} days back")]
    DaysBackOutOfRange(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Lowercased, any one of them qualifies a message.
    pub keywords: BTreeSet<String>,
    /// Empty means "discover from the server".
    pub folders: Vec<String>,
    pub include_sent: bool,
    pub date_range: DateRange,
    pub output_format: OutputFormat,
}

impl SearchRequest {
    pub fn new<I, S>(
        keywords: I,
        folders: Vec<String>,
        include_sent: bool,
        date_range: DateRange,
        output_format: OutputFormat,
    ) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: BTreeSet<String> = keywords
            .into_iter()
            .map(|keyword| keyword.as_ref().trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        if keywords.is_empty() {
            return Err(RequestError::NoKeywords);
        }
        if date_range.end < date_range.start {
            return Err(RequestError::InvertedDateRange);
        }
        let folders = folders
            .into_iter()
            .map(|folder| folder.trim().to_string())
            .filter(|folder| !folder.is_empty())
            .unique()
            .collect();

        Ok(SearchRequest {
            keywords,
            folders,
            include_sent,
            date_range,
            output_format,
        })
    }
}

/// How keyword matching is split between server and client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// One server-side SEARCH per folder and keyword.
    #[default]
    ServerSide,
    /// Fetch everything in the date range and match locally.
    ClientSide,
}

/// Execution limits for one run, kept out of the request echo.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    pub concurrency: Option<usize>,
    pub timeout: Duration,
    pub strategy: SearchStrategy,
    pub sent_folder: String,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits {
            concurrency: None,
            timeout: Duration::from_secs(120),
            strategy: SearchStrategy::ServerSide,
            sent_folder: "Sent Items".to_string(),
        }
    }
}

impl SearchStrategy {
    /// Server-side SEARCH only carries ASCII keywords reliably, so any
    /// other keyword moves the whole run to local matching.
    pub fn for_keywords(self, keywords: &BTreeSet<String>) -> Self {
        match self {
            SearchStrategy::ServerSide if keywords.iter().any(|keyword| !keyword.is_ascii()) => {
                SearchStrategy::ClientSide
            }
            strategy => strategy,
        }
    }
}

impl SearchLimits {
    pub fn worker_count(&self, folders: usize) -> usize {
        match self.concurrency {
            Some(limit) => limit.max(1),
            None => folders.clamp(1, MAX_DEFAULT_WORKERS),
        }
    }
}
