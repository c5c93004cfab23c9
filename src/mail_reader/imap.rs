use async_imap::{Client, Session};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use futures::TryStreamExt;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use log::{debug, info, warn};

use crate::error::SearchError;
use crate::mail_reader::{MailboxClient, MailboxSession, MessageRef, RawMessage, SearchCriteria};
use crate::settings::ImapConfig;

type ImapStream = Compat<tokio_native_tls::TlsStream<TcpStream>>;

/// Login details for one IMAP account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Opens independent IMAP sessions for the configured account.
#[derive(Debug, Clone)]
pub struct ImapMailbox {
    server: String,
    port: u16,
    credentials: Credentials,
}

impl ImapMailbox {
    pub fn new(config: &ImapConfig, credentials: Credentials) -> Self {
        ImapMailbox {
            server: config.server.clone(),
            port: config.port,
            credentials,
        }
    }
}

// Establish a TLS-encrypted connection to the IMAP server
async fn connect_to_server(server: &str, port: u16) -> Result<tokio_native_tls::TlsStream<TcpStream>, SearchError> {
    let tcp_stream = TcpStream::connect((server, port)).await?;
    let connector = native_tls::TlsConnector::new()
        .map_err(|e| SearchError::Connection(e.to_string()))?;
    let tls = tokio_native_tls::TlsConnector::from(connector);
    let tls_stream = tls
        .connect(server, tcp_stream)
        .await
        .map_err(|e| SearchError::Connection(e.to_string()))?;
    info!("-- connected to {}:{}", server, port);
    Ok(tls_stream)
}

// Login to the IMAP server and return an authenticated session
async fn login_to_server(
    client: Client<ImapStream>,
    credentials: &Credentials,
) -> Result<Session<ImapStream>, SearchError> {
    let imap_session = client
        .login(&credentials.username, &credentials.password)
        .await
        .map_err(|(e, _client)| SearchError::Auth(e.to_string()))?;
    info!("-- logged in as {}", credentials.username);
    Ok(imap_session)
}

#[async_trait]
impl MailboxClient for ImapMailbox {
    type Session = ImapSession;

    async fn connect(&self) -> Result<ImapSession, SearchError> {
        let tls_stream = connect_to_server(&self.server, self.port).await?;
        let client = Client::new(tls_stream.compat());
        let session = login_to_server(client, &self.credentials).await?;
        Ok(ImapSession {
            session,
            selected: None,
        })
    }
}

/// One logged-in IMAP session, owned by a single folder search.
pub struct ImapSession {
    session: Session<ImapStream>,
    selected: Option<String>,
}

impl ImapSession {
    async fn select(&mut self, folder: &str) -> Result<(), SearchError> {
        if self.selected.as_deref() == Some(folder) {
            return Ok(());
        }
        match self.session.select(folder).await {
            Ok(mailbox) => {
                info!("-- {} selected ({} messages)", folder, mailbox.exists);
                self.selected = Some(folder.to_string());
                Ok(())
            }
            Err(async_imap::error::Error::No(reason)) => {
                debug!("SELECT {} rejected: {}", folder, reason);
                Err(SearchError::FolderNotFound(folder.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Builds the `UID SEARCH` criteria. IMAP dates have day granularity, so
/// the range is widened to whole days and refined after parsing.
pub fn search_query(criteria: &SearchCriteria<'_>) -> String {
    let since = criteria.date_range.start.date_naive();
    let before = criteria.date_range.end.date_naive() + Duration::days(1);
    let mut query = format!("SINCE {} BEFORE {}", imap_date(since), imap_date(before));
    if let Some(keyword) = criteria.keyword {
        if !keyword.is_ascii() {
            query.insert_str(0, "CHARSET UTF-8 ");
        }
        let keyword = quote(keyword);
        query.push_str(&format!(" OR OR SUBJECT {k} BODY {k} FROM {k}", k = keyword));
    }
    query
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn list_folders(&mut self) -> Result<Vec<String>, SearchError> {
        let names: Vec<_> = self
            .session
            .list(Some(""), Some("*"))
            .await?
            .try_collect()
            .await?;
        Ok(names.iter().map(|name| name.name().to_string()).collect())
    }

    async fn search(
        &mut self,
        folder: &str,
        criteria: &SearchCriteria<'_>,
    ) -> Result<Vec<MessageRef>, SearchError> {
        self.select(folder).await?;
        let query = search_query(criteria);
        debug!("UID SEARCH {} in {}", query, folder);
        let mut uids: Vec<u32> = self.session.uid_search(&query).await?.into_iter().collect();
        uids.sort_unstable();
        Ok(uids
            .into_iter()
            .map(|uid| MessageRef {
                folder: folder.to_string(),
                uid,
            })
            .collect())
    }

    async fn fetch(&mut self, message: &MessageRef) -> Result<RawMessage, SearchError> {
        self.select(&message.folder).await?;
        // BODY.PEEK leaves the \Seen flag alone
        let fetches: Vec<_> = self
            .session
            .uid_fetch(message.uid.to_string(), "(RFC822.SIZE BODY.PEEK[])")
            .await?
            .try_collect()
            .await?;
        let fetch = fetches
            .iter()
            .find(|fetch| fetch.uid == Some(message.uid))
            .or_else(|| fetches.first())
            .ok_or_else(|| SearchError::Parse(format!("uid {} vanished from {}", message.uid, message.folder)))?;
        let source = fetch
            .body()
            .ok_or_else(|| SearchError::Parse(format!("uid {} has no body", message.uid)))?;
        Ok(RawMessage {
            uid: message.uid,
            source: source.to_vec(),
            size: fetch.size,
        })
    }

    async fn logout(&mut self) -> Result<(), SearchError> {
        if let Err(e) = self.session.logout().await {
            warn!("logout failed: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::search_settings::DateRange;
    use chrono::{TimeZone, Utc};

    fn range() -> DateRange {
        DateRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 31, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn date_only_query_covers_whole_days() {
        let range = range();
        let query = search_query(&SearchCriteria {
            keyword: None,
            date_range: &range,
        });
        assert_eq!(query, "SINCE 01-Jan-2024 BEFORE 01-Feb-2024");
    }

    #[test]
    fn keyword_query_matches_subject_body_and_sender() {
        let range = range();
        let query = search_query(&SearchCriteria {
            keyword: Some("say \"hi\""),
            date_range: &range,
        });
        assert_eq!(
            query,
            "SINCE 01-Jan-2024 BEFORE 01-Feb-2024 \
             OR OR SUBJECT \"say \\\"hi\\\"\" BODY \"say \\\"hi\\\"\" FROM \"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn non_ascii_keyword_declares_utf8_charset() {
        let range = range();
        let query = search_query(&SearchCriteria {
            keyword: Some("緊急"),
            date_range: &range,
        });
        assert_eq!(
            query,
            "CHARSET UTF-8 SINCE 01-Jan-2024 BEFORE 01-Feb-2024 OR OR SUBJECT \"緊急\" BODY \"緊急\" FROM \"緊急\""
        );
    }
}
