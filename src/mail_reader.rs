use async_trait::async_trait;

use crate::error::SearchError;
use crate::search::search_settings::DateRange;

pub mod display;
pub mod encryption;
pub mod imap;
pub mod message;

/// Handle to a message found by a folder search, not fetched yet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageRef {
    pub folder: String,
    pub uid: u32,
}

/// Unparsed fetch result: the full RFC 822 source of the message.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub uid: u32,
    pub source: Vec<u8>,
    /// Server-reported size, when the server sent one.
    pub size: Option<u32>,
}

/// What a single folder search asks the server for.
#[derive(Debug, Clone)]
pub struct SearchCriteria<'a> {
    /// `None` restricts by date only.
    pub keyword: Option<&'a str>,
    pub date_range: &'a DateRange,
}

/// Source of independent mailbox sessions. Concurrent folder searches each
/// get their own session from `connect`.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    type Session: MailboxSession;

    async fn connect(&self) -> Result<Self::Session, SearchError>;
}

#[async_trait]
pub trait MailboxSession: Send {
    async fn list_folders(&mut self) -> Result<Vec<String>, SearchError>;

    async fn search(
        &mut self,
        folder: &str,
        criteria: &SearchCriteria<'_>,
    ) -> Result<Vec<MessageRef>, SearchError>;

    async fn fetch(&mut self, message: &MessageRef) -> Result<RawMessage, SearchError>;

    async fn logout(&mut self) -> Result<(), SearchError>;
}
