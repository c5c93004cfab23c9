use log::debug;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::event::{Event, Identity};

/// Working set of events keyed by identity.
pub type EventSet = BTreeMap<Identity, Event>;

/// Folds `incoming` into `existing`.
///
/// The first observation keeps its scalar fields (subject, sender, snippet,
/// primary folder). Folders and keywords are unioned and the earliest
/// timestamp is kept. Only called from the single reducer after all folder
/// searches have reported.
pub fn merge(existing: &mut EventSet, incoming: Event) {
    match existing.entry(Identity::of(&incoming)) {
        Entry::Vacant(slot) => {
            slot.insert(incoming);
        }
        Entry::Occupied(mut slot) => {
            debug!(
                "Merging duplicate of {} seen in {:?}",
                slot.key(),
                incoming.source_folders
            );
            let current = slot.get_mut();
            current.source_folders.extend(incoming.source_folders);
            current.matched_keywords.extend(incoming.matched_keywords);
            current.timestamp = current.timestamp.min(incoming.timestamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::event::sample_event;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    #[test]
    fn same_message_id_in_two_folders_merges() {
        let inbox_copy = sample_event(
            Some("m1"),
            "INBOX",
            Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 3).unwrap(),
        );
        let sent_copy = sample_event(
            Some("m1"),
            "Sent Items",
            Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap(),
        );

        let mut events = EventSet::new();
        merge(&mut events, inbox_copy);
        merge(&mut events, sent_copy);

        assert_eq!(events.len(), 1);
        let event = events.values().next().unwrap();
        assert_eq!(
            event.source_folders,
            BTreeSet::from(["INBOX".to_string(), "Sent Items".to_string()])
        );
        assert_eq!(event.primary_folder, "INBOX");
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap());
    }

    #[test]
    fn first_writer_keeps_scalar_fields() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let first = Event {
            snippet: "from the inbox".to_string(),
            ..sample_event(Some("m1"), "INBOX", at)
        };
        let second = Event {
            snippet: "from the archive".to_string(),
            subject: "Re: something else".to_string(),
            matched_keywords: BTreeSet::from(["archive".to_string()]),
            ..sample_event(Some("m1"), "Archive", at)
        };

        let mut events = EventSet::new();
        merge(&mut events, first);
        merge(&mut events, second);

        let event = events.values().next().unwrap();
        assert_eq!(event.snippet, "from the inbox");
        assert_eq!(event.subject, "quarterly numbers");
        assert_eq!(
            event.matched_keywords,
            BTreeSet::from(["archive".to_string(), "numbers".to_string()])
        );
    }

    #[test]
    fn distinct_ids_stay_separate() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let mut events = EventSet::new();
        merge(&mut events, sample_event(Some("m1"), "INBOX", at));
        merge(&mut events, sample_event(Some("m2"), "INBOX", at));
        assert_eq!(events.len(), 2);
    }
}
