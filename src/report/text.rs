use itertools::Itertools;
use std::fmt::Write;

use super::{Report, DISPLAY_TIME};

const RULE_WIDTH: usize = 80;

/// Plain chronological listing, one block per event.
pub fn render(report: &Report) -> String {
    let request = &report.request;
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "=== Mail timeline report ===");
    let _ = writeln!(out, "Generated:  {}", report.generated_at.format(DISPLAY_TIME));
    let _ = writeln!(out, "Keywords:   {}", request.keywords.iter().join(", "));
    let _ = writeln!(
        out,
        "Range:      {} .. {}",
        request.date_range.start.format(DISPLAY_TIME),
        request.date_range.end.format(DISPLAY_TIME)
    );
    let _ = writeln!(out, "Events:     {}", report.events.len());
    let _ = writeln!(out);

    if report.events.is_empty() {
        let _ = writeln!(out, "No matching messages.");
        return out;
    }

    for (number, event) in report.events.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", number + 1, event.timestamp.format(DISPLAY_TIME));
        let _ = writeln!(out, "    Folders:  {}", event.source_folders.iter().join(", "));
        let _ = writeln!(out, "    Keywords: {}", event.matched_keywords.iter().join(", "));
        let _ = writeln!(out, "    Subject:  {}", event.subject);
        let _ = writeln!(out, "    From:     {}", event.sender);
        let _ = writeln!(out, "    Snippet:  {}", event.snippet);
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::sample_report;

    #[test]
    fn lists_events_in_report_order() {
        let text = render(&sample_report());

        assert!(text.contains("Keywords:   breach, urgent"));
        assert!(text.contains("Events:     2"));
        let breach = text.find("[1] 2024-01-03 08:00:00 UTC").unwrap();
        let urgent = text.find("[2] 2024-01-05 10:00:00 UTC").unwrap();
        assert!(breach < urgent);
        assert!(text.contains("    Folders:  INBOX, Sent Items"));
        assert!(text.contains("    Subject:  security breach report"));
    }

    #[test]
    fn empty_report_says_so() {
        let mut report = sample_report();
        report.events.clear();
        assert!(render(&report).ends_with("No matching messages.\n"));
    }
}
