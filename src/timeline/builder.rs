use super::dedup::EventSet;
use super::event::Event;

/// Orders events by timestamp, then primary folder, then identity.
///
/// The order is total, so it does not depend on which folder search
/// happened to finish first.
pub fn build(events: EventSet) -> Vec<Event> {
    let mut keyed: Vec<_> = events.into_iter().collect();
    keyed.sort_by(|(left_id, left), (right_id, right)| {
        left.timestamp
            .cmp(&right.timestamp)
            .then_with(|| left.primary_folder.cmp(&right.primary_folder))
            .then_with(|| left_id.cmp(right_id))
    });
    keyed.into_iter().map(|(_, event)| event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::dedup::merge;
    use crate::timeline::event::sample_event;
    use chrono::{TimeZone, Utc};

    fn ids(events: &[Event]) -> Vec<&str> {
        events
            .iter()
            .map(|event| event.message_id.as_deref().unwrap_or("-"))
            .collect()
    }

    #[test]
    fn sorts_chronologically() {
        let mut events = EventSet::new();
        merge(&mut events, sample_event(Some("late"), "INBOX", Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap()));
        merge(&mut events, sample_event(Some("early"), "INBOX", Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap()));

        assert_eq!(ids(&build(events)), vec!["early", "late"]);
    }

    #[test]
    fn equal_timestamps_break_on_folder_then_identity() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let mut events = EventSet::new();
        merge(&mut events, sample_event(Some("b"), "INBOX", at));
        merge(&mut events, sample_event(Some("z"), "Archive", at));
        merge(&mut events, sample_event(Some("a"), "INBOX", at));

        assert_eq!(ids(&build(events)), vec!["z", "a", "b"]);
    }

    #[test]
    fn order_is_independent_of_insertion_order() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let samples = vec![
            sample_event(Some("c"), "INBOX", at),
            sample_event(Some("a"), "Sent Items", at),
            sample_event(Some("b"), "INBOX", at),
        ];

        let mut forward = EventSet::new();
        samples.iter().cloned().for_each(|event| merge(&mut forward, event));
        let mut backward = EventSet::new();
        samples.into_iter().rev().for_each(|event| merge(&mut backward, event));

        assert_eq!(build(forward), build(backward));
    }
}
