use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use backtrace::Backtrace;
use log::error;
use thiserror::Error;

use crate::report::OutputFormat;
use crate::search::search_settings::{SearchLimits, SearchStrategy};

pub const DEFAULT_SETTINGS_PATH: &str = "src/resources/settings.yaml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot open settings file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot deserialize settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImapConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
}

fn default_port() -> u16 {
    993
}

/// Defaults for a search run; command-line values take precedence.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub days_back: u32,
    pub folders: Vec<String>,
    pub include_sent: bool,
    pub sent_folder: String,
    pub output_format: OutputFormat,
    pub concurrency: Option<usize>,
    pub timeout_seconds: u64,
    pub strategy: SearchStrategy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            days_back: 30,
            folders: Vec::new(),
            include_sent: true,
            sent_folder: "Sent Items".to_string(),
            output_format: OutputFormat::Text,
            concurrency: None,
            timeout_seconds: 120,
            strategy: SearchStrategy::ServerSide,
        }
    }
}

impl SearchConfig {
    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            concurrency: self.concurrency,
            timeout: Duration::from_secs(self.timeout_seconds),
            strategy: self.strategy,
            sent_folder: self.sent_folder.clone(),
        }
    }
}

pub fn load_settings(path: &Path) -> Result<Config, SettingsError> {
    let display = path.display().to_string();
    // Open the YAML file
    let file = File::open(path).map_err(|source| {
        error!("Error: {}", source);
        error!("Backtrace:\n{:?}", Backtrace::new());
        SettingsError::Open {
            path: display.clone(),
            source,
        }
    })?;
    let reader = BufReader::new(file);

    // Parse the YAML file into the Config struct
    serde_yaml::from_reader(reader).map_err(|source| {
        error!("Error: {}", source);
        error!("Backtrace:\n{:?}", Backtrace::new());
        SettingsError::Parse {
            path: display,
            source,
        }
    })
}
