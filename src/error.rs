use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failures of a single folder search or of a single message inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum SearchError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("server rejected the command: {0}")]
    Rejected(String),

    #[error("search in folder {0} timed out")]
    Timeout(String),

    /// Scoped to one message; never fails the folder it came from.
    #[error("cannot parse message: {0}")]
    Parse(String),
}

impl From<async_imap::error::Error> for SearchError {
    fn from(err: async_imap::error::Error) -> Self {
        match err {
            async_imap::error::Error::No(reason) | async_imap::error::Error::Bad(reason) => {
                SearchError::Rejected(reason)
            }
            other => SearchError::Connection(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Connection(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderFailure {
    pub folder: String,
    pub error: SearchError,
}

impl fmt::Display for FolderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.folder, self.error)
    }
}

/// Errors that abort a whole search run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("all {} folder searches failed: {}", .0.len(), join_failures(.0))]
    AllFoldersFailed(Vec<FolderFailure>),

    #[error("no folders to search")]
    NoFolders,

    #[error("cannot list folders: {0}")]
    FolderDiscovery(#[source] SearchError),
}

fn join_failures(failures: &[FolderFailure]) -> String {
    itertools::join(failures, "; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_folders_failed_lists_every_folder() {
        let err = RunError::AllFoldersFailed(vec![
            FolderFailure {
                folder: "INBOX".to_string(),
                error: SearchError::Connection("reset by peer".to_string()),
            },
            FolderFailure {
                folder: "Archive".to_string(),
                error: SearchError::FolderNotFound("Archive".to_string()),
            },
        ]);

        let message = err.to_string();
        assert!(message.starts_with("all 2 folder searches failed"));
        assert!(message.contains("INBOX: connection failed: reset by peer"));
        assert!(message.contains("Archive: folder not found: Archive"));
    }

    #[test]
    fn refused_commands_are_not_connection_failures() {
        let refused = SearchError::from(async_imap::error::Error::Bad("Invalid search charset".to_string()));
        assert_eq!(refused, SearchError::Rejected("Invalid search charset".to_string()));

        let declined = SearchError::from(async_imap::error::Error::No("SEARCH failed".to_string()));
        assert_eq!(declined, SearchError::Rejected("SEARCH failed".to_string()));

        let dropped = SearchError::from(async_imap::error::Error::ConnectionLost);
        assert!(matches!(dropped, SearchError::Connection(_)));
    }
}
