pub mod search_settings;

use futures::stream::{self, StreamExt};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::error::{FolderFailure, RunError, SearchError};
use crate::mail_reader::message::Normalizer;
use crate::mail_reader::{MailboxClient, MailboxSession, MessageRef, RawMessage, SearchCriteria};
use crate::report::Report;
use crate::timeline::{builder, dedup, stats, EventSet};
use search_settings::{SearchLimits, SearchRequest, SearchStrategy};

/// Stand-in for "no deadline" when the configured timeout overflows the clock.
const UNBOUNDED_RUN: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// How one folder search ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderOutcome {
    pub folder: String,
    pub status: FolderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum FolderStatus {
    Succeeded { matched: usize, skipped: usize },
    Failed { error: SearchError },
}

impl FolderOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, FolderStatus::Succeeded { .. })
    }
}

/// Result of a run that produced a report.
#[derive(Debug, Clone)]
pub struct SearchRun {
    pub report: Report,
    pub outcomes: Vec<FolderOutcome>,
    pub skipped_messages: usize,
}

impl SearchRun {
    pub fn succeeded_folders(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.succeeded()).count()
    }
}

/// A fetched message and the keywords whose searches returned it.
/// Empty keywords mean matching is left to the normalizer.
struct FetchedMessage {
    raw: RawMessage,
    keywords: BTreeSet<String>,
}

struct FolderHits {
    messages: Vec<FetchedMessage>,
    skipped: usize,
}

/// Runs `request` against the mailbox and builds the report.
///
/// Folder searches run concurrently, each on its own session, until the
/// run timeout; folders still pending at that point are recorded as timed
/// out. Everything after fetching happens here, on one task, in folder
/// order. Fails only when no folder search succeeded.
pub async fn run<C: MailboxClient>(
    request: &SearchRequest,
    client: &C,
    limits: &SearchLimits,
) -> Result<SearchRun, RunError> {
    let deadline = run_deadline(limits.timeout);
    let folders = resolve_folders(request, client, limits, deadline).await?;
    if folders.is_empty() {
        return Err(RunError::NoFolders);
    }
    let workers = limits.worker_count(folders.len());
    info!(
        "Searching {} folder(s) for {} keyword(s) with {} worker(s)",
        folders.len(),
        request.keywords.len(),
        workers
    );

    let strategy = limits.strategy.for_keywords(&request.keywords);
    if strategy != limits.strategy {
        info!("Non-ASCII keywords are matched locally instead of with server-side SEARCH");
    }

    let mut results: Vec<(usize, Result<FolderHits, SearchError>)> = stream::iter(folders.iter().cloned().enumerate())
        .map(move |(index, folder)| async move {
            let searched = timeout_at(deadline, search_folder(client, &folder, request, strategy)).await;
            let result = searched.unwrap_or_else(|_| Err(SearchError::Timeout(folder)));
            (index, result)
        })
        .buffer_unordered(workers)
        .collect()
        .await;
    // Reduce in folder order so first-seen fields are deterministic.
    results.sort_by_key(|(index, _)| *index);

    let normalizer = Normalizer::new(&request.keywords);
    let mut events = EventSet::new();
    let mut outcomes = Vec::with_capacity(folders.len());
    let mut failures = Vec::new();
    let mut skipped_messages = 0;

    for (index, result) in results {
        let folder = &folders[index];
        let hits = match result {
            Ok(hits) => hits,
            Err(error) => {
                warn!("Search in {} failed: {}", folder, error);
                failures.push(FolderFailure {
                    folder: folder.clone(),
                    error: error.clone(),
                });
                outcomes.push(FolderOutcome {
                    folder: folder.clone(),
                    status: FolderStatus::Failed { error },
                });
                continue;
            }
        };

        let mut matched = 0;
        let mut skipped = hits.skipped;
        for message in hits.messages {
            let server_keywords = (!message.keywords.is_empty()).then_some(&message.keywords);
            let event = match normalizer.normalize(&message.raw, folder, server_keywords) {
                Ok(event) => event,
                Err(error) => {
                    warn!("Skipping message in {}: {}", folder, error);
                    skipped += 1;
                    continue;
                }
            };
            if event.matched_keywords.is_empty() {
                continue;
            }
            if !request.date_range.contains(event.timestamp) {
                debug!("uid {} in {} is outside the date range", message.raw.uid, folder);
                continue;
            }
            dedup::merge(&mut events, event);
            matched += 1;
        }
        skipped_messages += skipped;
        outcomes.push(FolderOutcome {
            folder: folder.clone(),
            status: FolderStatus::Succeeded { matched, skipped },
        });
    }

    if failures.len() == outcomes.len() {
        return Err(RunError::AllFoldersFailed(failures));
    }

    let timeline = builder::build(events);
    let stats = stats::aggregate(&timeline, &request.date_range);
    info!("Timeline built with {} event(s)", timeline.len());

    Ok(SearchRun {
        report: Report {
            events: timeline,
            stats,
            generated_at: request.date_range.end,
            request: request.clone(),
        },
        outcomes,
        skipped_messages,
    })
}

/// A timeout too large for the clock leaves the run without a deadline.
fn run_deadline(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(UNBOUNDED_RUN))
        .unwrap_or(now)
}

/// Explicit folders as given, otherwise the server's list. The sent folder
/// is appended when requested and missing, and left out of a discovered
/// list when not requested.
async fn resolve_folders<C: MailboxClient>(
    request: &SearchRequest,
    client: &C,
    limits: &SearchLimits,
    deadline: Instant,
) -> Result<Vec<String>, RunError> {
    let mut folders = if request.folders.is_empty() {
        let discovered = timeout_at(deadline, discover_folders(client))
            .await
            .unwrap_or_else(|_| Err(SearchError::Timeout("folder list".to_string())))
            .map_err(RunError::FolderDiscovery)?;
        debug!("Discovered folders: {:?}", discovered);
        discovered
            .into_iter()
            .filter(|folder| request.include_sent || *folder != limits.sent_folder)
            .unique()
            .collect()
    } else {
        request.folders.clone()
    };

    if request.include_sent && !folders.contains(&limits.sent_folder) {
        folders.push(limits.sent_folder.clone());
    }
    Ok(folders)
}

async fn discover_folders<C: MailboxClient>(client: &C) -> Result<Vec<String>, SearchError> {
    let mut session = client.connect().await?;
    let folders = session.list_folders().await;
    if let Err(e) = session.logout().await {
        debug!("Logout after folder discovery failed: {}", e);
    }
    folders
}

async fn search_folder<C: MailboxClient>(
    client: &C,
    folder: &str,
    request: &SearchRequest,
    strategy: SearchStrategy,
) -> Result<FolderHits, SearchError> {
    let mut session = client.connect().await?;
    let hits = collect_hits(&mut session, folder, request, strategy).await;
    if let Err(e) = session.logout().await {
        debug!("Logout from {} failed: {}", folder, e);
    }
    hits
}

async fn collect_hits<S: MailboxSession>(
    session: &mut S,
    folder: &str,
    request: &SearchRequest,
    strategy: SearchStrategy,
) -> Result<FolderHits, SearchError> {
    // A message found by several keywords is fetched once.
    let mut found: BTreeMap<MessageRef, BTreeSet<String>> = BTreeMap::new();
    match strategy {
        SearchStrategy::ServerSide => {
            for keyword in &request.keywords {
                let criteria = SearchCriteria {
                    keyword: Some(keyword.as_str()),
                    date_range: &request.date_range,
                };
                let refs = session.search(folder, &criteria).await?;
                debug!("{} message(s) in {} match {:?}", refs.len(), folder, keyword);
                for message_ref in refs {
                    found.entry(message_ref).or_default().insert(keyword.clone());
                }
            }
        }
        SearchStrategy::ClientSide => {
            let criteria = SearchCriteria {
                keyword: None,
                date_range: &request.date_range,
            };
            let refs = session.search(folder, &criteria).await?;
            debug!("{} message(s) in {} within the date range", refs.len(), folder);
            for message_ref in refs {
                found.entry(message_ref).or_default();
            }
        }
    }

    let mut messages = Vec::with_capacity(found.len());
    let mut skipped = 0;
    for (message_ref, keywords) in found {
        match session.fetch(&message_ref).await {
            Ok(raw) => messages.push(FetchedMessage { raw, keywords }),
            Err(SearchError::Parse(reason)) => {
                warn!("Skipping uid {} in {}: {}", message_ref.uid, folder, reason);
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    info!("{}: fetched {} message(s), skipped {}", folder, messages.len(), skipped);
    Ok(FolderHits { messages, skipped })
}
