use log::{debug, error, info, warn};

use crate::search::{FolderStatus, SearchRun};

pub fn summary_lines(run: &SearchRun) -> Vec<String> {
    let mut lines = vec![format!(
        "{} of {} folders succeeded, {} event(s), {} message(s) skipped",
        run.succeeded_folders(),
        run.outcomes.len(),
        run.report.events.len(),
        run.skipped_messages
    )];
    lines.extend(run.outcomes.iter().map(|outcome| match &outcome.status {
        FolderStatus::Succeeded { matched, skipped } => {
            format!("  ok     {}: {} matched, {} skipped", outcome.folder, matched, skipped)
        }
        FolderStatus::Failed { error } => format!("  failed {}: {}", outcome.folder, error),
    }));
    lines
}

/// Logs the per-folder breakdown so partial results are visible.
pub fn display_run_summary(run: &SearchRun) {
    let partial = run.succeeded_folders() < run.outcomes.len();
    for line in summary_lines(run) {
        if partial {
            warn!("{}", line);
        } else {
            info!("{}", line);
        }
    }
    match serde_json::to_string_pretty(&run.outcomes) {
        Ok(json) => debug!("{}", json),
        Err(e) => error!("Error converting to JSON: {}", e),
    }
}

pub fn display_folders(folders: &[String]) {
    info!("{} folder(s) on the server", folders.len());
    folders.iter().for_each(|folder| info!("  {}", folder));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::report::sample_report;
    use crate::search::FolderOutcome;

    #[test]
    fn summary_counts_folders_and_skips() {
        let run = SearchRun {
            report: sample_report(),
            outcomes: vec![
                FolderOutcome {
                    folder: "INBOX".to_string(),
                    status: FolderStatus::Succeeded { matched: 2, skipped: 1 },
                },
                FolderOutcome {
                    folder: "Sent Items".to_string(),
                    status: FolderStatus::Failed {
                        error: SearchError::Connection("reset".to_string()),
                    },
                },
            ],
            skipped_messages: 1,
        };

        assert_eq!(
            summary_lines(&run),
            vec![
                "1 of 2 folders succeeded, 2 event(s), 1 message(s) skipped",
                "  ok     INBOX: 2 matched, 1 skipped",
                "  failed Sent Items: connection failed: reset",
            ]
        );
    }
}
