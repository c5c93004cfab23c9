use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::event::Event;
use crate::search::search_settings::DateRange;

/// Ranges up to this many days get daily buckets, longer ones weekly.
const DAILY_BUCKET_LIMIT_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketWidth {
    Day,
    Week,
}

impl BucketWidth {
    pub fn for_range(range: &DateRange) -> Self {
        if range.length().num_days() <= DAILY_BUCKET_LIMIT_DAYS {
            BucketWidth::Day
        } else {
            BucketWidth::Week
        }
    }

    pub fn delta(self) -> TimeDelta {
        match self {
            BucketWidth::Day => TimeDelta::days(1),
            BucketWidth::Week => TimeDelta::weeks(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBucket {
    pub bucket_start: DateTime<Utc>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub keyword_counts: BTreeMap<String, usize>,
    pub folder_counts: BTreeMap<String, usize>,
    pub bucket_width: BucketWidth,
    pub time_histogram: Vec<HistogramBucket>,
}

/// Summarizes a finished timeline.
///
/// Keyword and folder counts are per occurrence: an event found by two
/// keywords counts once for each. The histogram covers the whole date
/// range, empty buckets included.
pub fn aggregate(events: &[Event], range: &DateRange) -> Stats {
    let mut keyword_counts = BTreeMap::new();
    let mut folder_counts = BTreeMap::new();
    for event in events {
        for keyword in &event.matched_keywords {
            *keyword_counts.entry(keyword.clone()).or_insert(0) += 1;
        }
        for folder in &event.source_folders {
            *folder_counts.entry(folder.clone()).or_insert(0) += 1;
        }
    }

    let bucket_width = BucketWidth::for_range(range);
    Stats {
        keyword_counts,
        folder_counts,
        bucket_width,
        time_histogram: histogram(events, range, bucket_width),
    }
}

fn histogram(events: &[Event], range: &DateRange, width: BucketWidth) -> Vec<HistogramBucket> {
    let step = width.delta();
    let first = range
        .start
        .duration_trunc(TimeDelta::days(1))
        .unwrap_or(range.start);

    let mut buckets = Vec::new();
    let mut bucket_start = first;
    while bucket_start < range.end {
        buckets.push(HistogramBucket {
            bucket_start,
            count: 0,
        });
        bucket_start += step;
    }

    for event in events {
        if event.timestamp < first {
            continue;
        }
        let index = (event.timestamp - first).num_seconds() / step.num_seconds();
        if let Some(bucket) = usize::try_from(index).ok().and_then(|i| buckets.get_mut(i)) {
            bucket.count += 1;
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::event::sample_event;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn january() -> DateRange {
        DateRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 11, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn keywords_and_folders_are_multi_counted() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let both = Event {
            matched_keywords: BTreeSet::from(["a".to_string(), "b".to_string()]),
            source_folders: BTreeSet::from(["INBOX".to_string(), "Sent Items".to_string()]),
            ..sample_event(Some("m1"), "INBOX", at)
        };
        let only_a = Event {
            matched_keywords: BTreeSet::from(["a".to_string()]),
            ..sample_event(Some("m2"), "INBOX", at)
        };

        let stats = aggregate(&[both, only_a], &january());

        assert_eq!(stats.keyword_counts, BTreeMap::from([("a".to_string(), 2), ("b".to_string(), 1)]));
        assert_eq!(
            stats.folder_counts,
            BTreeMap::from([("INBOX".to_string(), 2), ("Sent Items".to_string(), 1)])
        );
    }

    #[test]
    fn histogram_keeps_empty_days() {
        let events = vec![
            sample_event(Some("m1"), "INBOX", Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap()),
            sample_event(Some("m2"), "INBOX", Utc.with_ymd_and_hms(2024, 1, 3, 23, 59, 0).unwrap()),
            sample_event(Some("m3"), "INBOX", Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap()),
        ];

        let stats = aggregate(&events, &january());

        assert_eq!(stats.bucket_width, BucketWidth::Day);
        // Jan 1 through Jan 11, the last one partially covered.
        assert_eq!(stats.time_histogram.len(), 11);
        assert_eq!(
            stats.time_histogram[0].bucket_start,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        let counts: Vec<_> = stats.time_histogram.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![0, 0, 2, 0, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn long_ranges_use_weekly_buckets() {
        let range = DateRange::days_back(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(), 180).unwrap();
        let stats = aggregate(&[], &range);

        assert_eq!(stats.bucket_width, BucketWidth::Week);
        assert_eq!(stats.time_histogram.len(), 26);
        assert!(stats.time_histogram.iter().all(|bucket| bucket.count == 0));
    }
}
