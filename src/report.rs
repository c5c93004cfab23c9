pub mod csv;
pub mod html;
pub mod text;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::search::search_settings::SearchRequest;
use crate::timeline::{Event, Stats};

/// Timestamp layout shared by the human-readable formats.
pub const DISPLAY_TIME: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
    Html,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Text => "text/plain; charset=utf-8",
            OutputFormat::Json => "application/json",
            OutputFormat::Csv => "text/csv; charset=utf-8",
            OutputFormat::Html => "text/html; charset=utf-8",
        }
    }
}

/// Chronological timeline plus statistics for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub events: Vec<Event>,
    pub stats: Stats,
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "requestEcho")]
    pub request: SearchRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

impl Rendered {
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.bytes).with_context(|| format!("Cannot write report to {}", path.display()))?;
        info!("Report saved to {}", path.display());
        Ok(())
    }
}

/// Renders `report` without touching the mailbox again.
pub fn render(report: &Report, format: OutputFormat) -> Result<Rendered> {
    let bytes = match format {
        OutputFormat::Text => text::render(report).into_bytes(),
        OutputFormat::Json => serde_json::to_vec_pretty(report)?,
        OutputFormat::Csv => csv::render(report).into_bytes(),
        OutputFormat::Html => html::render(report)?.into_bytes(),
    };
    Ok(Rendered {
        bytes,
        content_type: format.content_type(),
    })
}

#[cfg(test)]
pub(crate) fn sample_report() -> Report {
    use crate::search::search_settings::DateRange;
    use crate::timeline::{builder, dedup, event::sample_event, stats, EventSet};
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    let range = DateRange::days_back(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(), 9).unwrap();
    let request = SearchRequest::new(["urgent", "breach"], vec!["INBOX".into()], true, range, OutputFormat::Json)
        .expect("valid request");

    let mut events = EventSet::new();
    dedup::merge(
        &mut events,
        Event {
            subject: "urgent outage".to_string(),
            matched_keywords: BTreeSet::from(["urgent".to_string()]),
            snippet: "urgent outage, all hands".to_string(),
            source_folders: BTreeSet::from(["INBOX".to_string(), "Sent Items".to_string()]),
            ..sample_event(Some("m1"), "INBOX", Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap())
        },
    );
    dedup::merge(
        &mut events,
        Event {
            subject: "security breach report".to_string(),
            matched_keywords: BTreeSet::from(["breach".to_string()]),
            snippet: "<b>breach</b> & co".to_string(),
            has_attachments: true,
            ..sample_event(Some("m2"), "INBOX", Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap())
        },
    );
    let events = builder::build(events);
    let stats = stats::aggregate(&events, &range);
    Report {
        events,
        stats,
        generated_at: range.end,
        request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trips_to_equal_report() {
        let report = sample_report();
        let rendered = render(&report, OutputFormat::Json).unwrap();
        assert_eq!(rendered.content_type, "application/json");

        let decoded: Report = serde_json::from_slice(&rendered.bytes).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn json_field_names_are_stable() {
        let rendered = render(&sample_report(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&rendered.bytes).unwrap();

        let first = &value["events"][0];
        assert_eq!(first["messageId"], "m2");
        assert_eq!(first["sourceFolders"], serde_json::json!(["INBOX"]));
        assert_eq!(value["stats"]["keywordCounts"]["urgent"], 1);
        assert_eq!(value["stats"]["timeHistogram"].as_array().unwrap().len(), 9);
        assert_eq!(value["requestEcho"]["outputFormat"], "json");
        assert_eq!(value["requestEcho"]["includeSent"], true);
        assert!(value.get("request").is_none());
        assert_eq!(value["generatedAt"], "2024-01-10T00:00:00Z");
    }

    #[test]
    fn every_format_renders_from_the_report_alone() {
        let report = sample_report();
        for format in [OutputFormat::Text, OutputFormat::Json, OutputFormat::Csv, OutputFormat::Html] {
            let rendered = render(&report, format).unwrap();
            assert!(!rendered.bytes.is_empty());
            assert_eq!(rendered.content_type, format.content_type());
        }
    }

    #[test]
    fn save_writes_the_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let rendered = render(&sample_report(), OutputFormat::Csv).unwrap();

        rendered.save(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), rendered.bytes);
    }
}
