use chrono::{DateTime, Utc};
use mailparse::{addrparse_header, parse_mail, DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::error::SearchError;
use crate::mail_reader::RawMessage;
use crate::timeline::Event;

/// Character budget of a snippet, not counting the ellipsis markers.
pub const SNIPPET_CHARS: usize = 160;
/// How much text before the first match a snippet tries to show.
const LEADING_CONTEXT: usize = 40;
const ELLIPSIS: char = '…';

fn html_tag() -> &'static Regex {
    static HTML_TAG: OnceLock<Regex> = OnceLock::new();
    HTML_TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"))
}

/// Turns fetched messages into timeline events for one set of keywords.
pub struct Normalizer<'a> {
    keywords: &'a BTreeSet<String>,
}

impl<'a> Normalizer<'a> {
    pub fn new(keywords: &'a BTreeSet<String>) -> Self {
        Normalizer { keywords }
    }

    /// Parses `raw` as seen in `folder`.
    ///
    /// `matched` carries the keywords whose server search returned the
    /// message; with `None` the keywords are matched here against subject,
    /// body and sender, and the event may come back with no keywords at all.
    pub fn normalize(
        &self,
        raw: &RawMessage,
        folder: &str,
        matched: Option<&BTreeSet<String>>,
    ) -> Result<Event, SearchError> {
        let parsed_mail = parse_mail(&raw.source)
            .map_err(|e| SearchError::Parse(format!("uid {}: {}", raw.uid, e)))?;

        let timestamp = parse_date(&parsed_mail)
            .map_err(|reason| SearchError::Parse(format!("uid {}: {}", raw.uid, reason)))?;
        let subject = header_text(&parsed_mail, "Subject");
        let sender = header_text(&parsed_mail, "From");
        let message_id = parsed_mail
            .headers
            .get_first_value("Message-ID")
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
            .filter(|id| !id.is_empty());
        let recipients = extract_recipients(&parsed_mail);
        let body = extract_text_content(&parsed_mail).unwrap_or_default();

        let matched_keywords = match matched {
            Some(keywords) => keywords.clone(),
            None => self.keywords_in(&[&subject, &body, &sender]),
        };
        let snippet = build_snippet(&subject, &body, self.keywords);

        Ok(Event {
            message_id,
            subject,
            sender,
            recipients,
            timestamp,
            primary_folder: folder.to_string(),
            source_folders: BTreeSet::from([folder.to_string()]),
            matched_keywords,
            snippet,
            has_attachments: has_attachments(&parsed_mail),
            size_bytes: raw
                .size
                .map(u64::from)
                .unwrap_or(raw.source.len() as u64),
        })
    }

    fn keywords_in(&self, fields: &[&str]) -> BTreeSet<String> {
        let haystacks: Vec<String> = fields.iter().map(|field| field.to_lowercase()).collect();
        self.keywords
            .iter()
            .filter(|keyword| haystacks.iter().any(|text| text.contains(keyword.as_str())))
            .cloned()
            .collect()
    }
}

fn parse_date(parsed_mail: &ParsedMail) -> Result<DateTime<Utc>, String> {
    let date = parsed_mail
        .headers
        .get_first_value("Date")
        .ok_or_else(|| "missing Date header".to_string())?;
    let date = date.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(date) {
        return Ok(parsed.with_timezone(&Utc));
    }

    // dateparse fills whatever it cannot find with zero, so only trust it
    // when the header names a month and a year.
    if !date_like().is_match(date) {
        return Err(format!("unparsable Date header {:?}", date));
    }
    let seconds = mailparse::dateparse(date).map_err(|e| format!("unparsable Date header {:?}: {}", date, e))?;
    if seconds == 0 {
        return Err(format!("unparsable Date header {:?}", date));
    }
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| format!("Date header out of range: {:?}", date))
}

fn date_like() -> &'static Regex {
    static DATE_LIKE: OnceLock<Regex> = OnceLock::new();
    DATE_LIKE.get_or_init(|| {
        Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\b.*\b\d{2,4}\b")
            .expect("valid date pattern")
    })
}

// mailparse already decodes RFC 2047 words, falling back to the raw bytes.
fn header_text(parsed_mail: &ParsedMail, name: &str) -> String {
    parsed_mail
        .headers
        .get_first_value(name)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn extract_recipients(parsed_mail: &ParsedMail) -> Vec<String> {
    let mut recipients = Vec::new();
    for header in parsed_mail
        .headers
        .get_all_headers("To")
        .into_iter()
        .chain(parsed_mail.headers.get_all_headers("Cc"))
    {
        match addrparse_header(header) {
            Ok(addresses) => {
                for address in addresses.iter() {
                    match address {
                        MailAddr::Single(info) => recipients.push(format_address(&info.display_name, &info.addr)),
                        MailAddr::Group(group) => recipients.extend(
                            group
                                .addrs
                                .iter()
                                .map(|info| format_address(&info.display_name, &info.addr)),
                        ),
                    }
                }
            }
            Err(_) => recipients.extend(
                header
                    .get_value()
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string),
            ),
        }
    }
    recipients
}

fn format_address(display_name: &Option<String>, addr: &str) -> String {
    match display_name {
        Some(name) => format!("{} <{}>", name, addr),
        None => addr.to_string(),
    }
}

fn extract_text_content(parsed_mail: &ParsedMail) -> Option<String> {
    fn find_part(part: &ParsedMail, mimetype: &str) -> Option<String> {
        // Attached text files are not the message body.
        if part.get_content_disposition().disposition == DispositionType::Attachment {
            return None;
        }
        if part.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
            return part.get_body().ok();
        }
        part.subparts.iter().find_map(|subpart| find_part(subpart, mimetype))
    }

    find_part(parsed_mail, "text/plain").or_else(|| {
        find_part(parsed_mail, "text/html").map(|html| html_tag().replace_all(&html, " ").into_owned())
    })
}

fn has_attachments(parsed_mail: &ParsedMail) -> bool {
    parsed_mail.get_content_disposition().disposition == DispositionType::Attachment
        || parsed_mail.subparts.iter().any(has_attachments)
}

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Excerpt around the first keyword occurrence in subject or body, trimmed
/// at word boundaries. Falls back to the subject when no keyword occurs in
/// the text (a match on the sender only, for instance).
pub fn build_snippet(subject: &str, body: &str, keywords: &BTreeSet<String>) -> String {
    let text: Vec<char> = format!("{} {}", subject, body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect();
    // One folded char per original char keeps the indices aligned.
    let folded: Vec<char> = text.iter().copied().map(fold_char).collect();

    let first_match = keywords
        .iter()
        .filter_map(|keyword| {
            let needle: Vec<char> = keyword.chars().map(fold_char).collect();
            if needle.is_empty() || needle.len() > folded.len() {
                return None;
            }
            folded
                .windows(needle.len())
                .position(|window| window == needle.as_slice())
                .map(|position| (position, needle.len()))
        })
        .min();

    let Some((match_start, match_len)) = first_match else {
        return subject.trim().to_string();
    };
    let match_end = match_start + match_len;

    let mut start = match_start.saturating_sub(LEADING_CONTEXT);
    let mut end = (start + SNIPPET_CHARS).min(text.len()).max(match_end);
    if end - start > SNIPPET_CHARS {
        start = end.saturating_sub(SNIPPET_CHARS).min(match_start);
    }
    if start > 0 {
        if let Some(space) = text[start..match_start].iter().position(|c| *c == ' ') {
            start += space + 1;
        }
    }
    if end < text.len() && text[end] != ' ' {
        if let Some(space) = text[match_end..end].iter().rposition(|c| *c == ' ') {
            end = match_end + space;
        }
    }

    let mut snippet = String::new();
    if start > 0 {
        snippet.push(ELLIPSIS);
    }
    snippet.extend(&text[start..end]);
    let mut snippet = snippet.trim_end().to_string();
    if end < text.len() {
        snippet.push(ELLIPSIS);
    }
    snippet
}

#[cfg(test)]
pub(crate) fn raw_message(uid: u32, source: &str) -> RawMessage {
    RawMessage {
        uid,
        source: source.replace('\n', "\r\n").into_bytes(),
        size: None,
    }
}
