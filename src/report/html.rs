use anyhow::Result;
use tera::{Context, Tera};

use super::{Report, DISPLAY_TIME};

const TEMPLATE_NAME: &str = "report.html";
const TEMPLATE: &str = include_str!("../../templates/report.html");

fn largest(counts: impl Iterator<Item = usize>) -> usize {
    counts.max().unwrap_or(0).max(1)
}

/// Self-contained page with the charts' data embedded as JSON.
pub fn render(report: &Report) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)?;

    // Keep the JSON from closing the script element early.
    let stats_json = serde_json::to_string(&report.stats)?.replace("</", "<\\/");
    let request = &report.request;

    let mut ctx = Context::new();
    ctx.insert("report", report);
    ctx.insert("stats_json", &stats_json);
    ctx.insert("generated_at", &report.generated_at.format(DISPLAY_TIME).to_string());
    ctx.insert("range_start", &request.date_range.start.format(DISPLAY_TIME).to_string());
    ctx.insert("range_end", &request.date_range.end.format(DISPLAY_TIME).to_string());
    ctx.insert("max_bucket", &largest(report.stats.time_histogram.iter().map(|bucket| bucket.count)));
    ctx.insert("max_keyword", &largest(report.stats.keyword_counts.values().copied()));
    ctx.insert("max_folder", &largest(report.stats.folder_counts.values().copied()));
    ctx.insert("folder_total", &report.stats.folder_counts.len());

    Ok(tera.render(TEMPLATE_NAME, &ctx)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::sample_report;

    #[test]
    fn page_carries_stats_and_escaped_events() {
        let html = render(&sample_report()).unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("\"keywordCounts\":{\"breach\":1,\"urgent\":1}"));
        assert!(html.contains("security breach report"));
        assert!(html.contains("&lt;b&gt;breach"));
        assert!(!html.contains("<b>breach</b>"));
        assert!(html.find("security breach report").unwrap() < html.find("urgent outage").unwrap());
    }

    #[test]
    fn empty_timeline_shows_notice() {
        let mut report = sample_report();
        report.events.clear();
        let html = render(&report).unwrap();
        assert!(html.contains("No matching messages"));
    }

    #[test]
    fn script_payload_cannot_close_the_element() {
        let mut report = sample_report();
        report
            .stats
            .keyword_counts
            .insert("</script><script>alert(1)".to_string(), 1);
        let html = render(&report).unwrap();
        assert!(html.contains("<\\/script><script>alert(1)"));
        assert_eq!(html.matches("</script>").count(), 1);
    }
}
