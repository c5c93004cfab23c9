mod error;
mod mail_reader;
mod report;
mod search;
mod settings;
mod timeline;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use std::env;
use std::io::Write;
use std::path::PathBuf;

use mail_reader::display::{display_folders, display_run_summary};
use mail_reader::encryption::{get_credentials, prompt_password, SecretStore, PASSWORD_ENV};
use mail_reader::imap::ImapMailbox;
use mail_reader::{MailboxClient, MailboxSession};
use report::OutputFormat;
use search::search_settings::{DateRange, SearchRequest, SearchStrategy};
use settings::{load_settings, Config, DEFAULT_SETTINGS_PATH};

#[derive(Debug, Parser)]
#[command(name = "mail-timeline", version, about = "Keyword search across mailbox folders, reported as one timeline")]
struct Cli {
    /// YAML settings file
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search the mailbox and print or save the report
    Search(SearchArgs),
    /// Log in and list the server's folders
    Check,
    /// Replace the stored password
    Password,
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// Keywords, any of which qualifies a message
    #[arg(required = true)]
    keywords: Vec<String>,

    /// How many days back to search
    #[arg(short, long)]
    days: Option<u32>,

    /// Folders to search instead of the configured or discovered ones
    #[arg(short, long, num_args = 1..)]
    folders: Vec<String>,

    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Leave the sent folder out
    #[arg(long)]
    no_sent: bool,

    /// Write the report to this file instead of stdout
    #[arg(long)]
    save: Option<PathBuf>,

    /// Match keywords locally instead of with server-side SEARCH
    #[arg(long)]
    client_side: bool,

    /// Run timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Concurrent folder sessions
    #[arg(long)]
    concurrency: Option<usize>,
}

fn setup_logging(verbose: bool) -> Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(if verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .level_for("async_imap", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn mailbox(config: &Config) -> Result<ImapMailbox> {
    let credentials = get_credentials(&config.imap.username, env::var(PASSWORD_ENV).ok(), &SecretStore::default())?;
    Ok(ImapMailbox::new(&config.imap, credentials))
}

async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    let defaults = &config.search;
    let folders = if args.folders.is_empty() {
        defaults.folders.clone()
    } else {
        args.folders
    };
    let format = args.output.unwrap_or(defaults.output_format);
    let date_range = DateRange::days_back(Utc::now(), args.days.unwrap_or(defaults.days_back))?;
    let request = SearchRequest::new(
        &args.keywords,
        folders,
        defaults.include_sent && !args.no_sent,
        date_range,
        format,
    )?;

    let mut limits = defaults.limits();
    if args.client_side {
        limits.strategy = SearchStrategy::ClientSide;
    }
    if let Some(seconds) = args.timeout {
        limits.timeout = std::time::Duration::from_secs(seconds);
    }
    if args.concurrency.is_some() {
        limits.concurrency = args.concurrency;
    }

    let client = mailbox(config)?;
    let run = search::run(&request, &client, &limits).await?;
    display_run_summary(&run);

    let rendered = report::render(&run.report, format)?;
    match args.save {
        Some(path) => rendered.save(&path)?,
        None => std::io::stdout().write_all(&rendered.bytes)?,
    }
    Ok(())
}

async fn check_connection(config: &Config) -> Result<()> {
    let client = mailbox(config)?;
    let mut session = client.connect().await?;
    let folders = session.list_folders().await?;
    display_folders(&folders);
    session.logout().await?;
    info!("Connection to {}:{} works", config.imap.server, config.imap.port);
    Ok(())
}

fn update_password(config: &Config) -> Result<()> {
    let password = prompt_password(&config.imap.username)?;
    SecretStore::default().store_password(&password)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let config = load_settings(&cli.config)?;

    match cli.command {
        Command::Search(args) => run_search(&config, args).await,
        Command::Check => check_connection(&config).await,
        Command::Password => update_password(&config),
    }
}
