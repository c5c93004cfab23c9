use itertools::Itertools;

use super::Report;

const FIELD_DELIMITER: char = ',';
/// Joins multi-valued cells; distinct from the field delimiter.
pub const VALUE_DELIMITER: &str = ";";
const LINE_END: &str = "\r\n";

pub const HEADER: [&str; 7] = [
    "timestamp",
    "folders",
    "matchedKeywords",
    "subject",
    "sender",
    "hasAttachments",
    "sizeBytes",
];

/// Quotes a cell when it holds a delimiter, a quote or a line break.
pub fn escape(value: &str) -> String {
    if value.contains([FIELD_DELIMITER, '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_row<I, S>(out: &mut String, cells: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let row = cells.into_iter().map(|cell| escape(cell.as_ref())).join(",");
    out.push_str(&row);
    out.push_str(LINE_END);
}

/// One row per event in timeline order.
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    write_row(&mut out, HEADER);
    for event in &report.events {
        write_row(
            &mut out,
            [
                event.timestamp.to_rfc3339(),
                event.source_folders.iter().join(VALUE_DELIMITER),
                event.matched_keywords.iter().join(VALUE_DELIMITER),
                event.subject.clone(),
                event.sender.clone(),
                event.has_attachments.to_string(),
                event.size_bytes.to_string(),
            ],
        );
    }
    out
}
