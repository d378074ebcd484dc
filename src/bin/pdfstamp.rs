//! PDF Stamp CLI
//!
//! Command-line front end for the stamping service: list, upload, stamp,
//! delete and connection diagnostics. Every command prints one JSON document
//! on stdout; logs go to stderr (`RUST_LOG` controls verbosity).

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pdfstamp_lib::{
    DiagnosisResult, DroppedRecord, FileRecord, FileSession, SessionError, SessionState,
    StampRequest, StamperConfig,
};

#[derive(Parser)]
#[command(name = "pdfstamp")]
#[command(about = "PDF Stamp CLI - upload, stamp and manage PDFs on a stamping service", long_about = None)]
struct Cli {
    /// Base URL of the file API (overrides config file and PDFSTAMP_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored files
    List,
    /// Upload a PDF file
    Upload {
        /// Path to the PDF
        path: PathBuf,
    },
    /// Stamp a PDF with date, name and comment
    Stamp {
        /// File to stamp (default: the selected file)
        identifier: Option<String>,
        /// Stamp date (default: today, dd.mm.yyyy)
        #[arg(short, long)]
        date: Option<String>,
        /// Name shown in the stamp
        #[arg(short, long)]
        name: String,
        /// Optional comment
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Delete a stored file
    Delete {
        identifier: String,
    },
    /// Select a file and show its details
    Select {
        identifier: String,
    },
    /// Print download and thumbnail URLs without contacting the server
    Urls {
        identifier: String,
    },
    /// Test the connection to the backend
    Diagnose,
}

// ============ Output Types ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListOutput {
    files: Vec<FileRecord>,
    selected_identifier: Option<String>,
    degraded: bool,
    dropped: Vec<DroppedRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordOutput {
    record: FileRecord,
    download_url: String,
    thumbnail_url: String,
    state: SessionState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteOutput {
    deleted: String,
    state: SessionState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UrlsOutput {
    identifier: String,
    download_url: String,
    thumbnail_url: String,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnosis: Option<DiagnosisResult>,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let session_err = e.downcast_ref::<SessionError>();
            let error = ErrorOutput {
                error: session_err
                    .map(SessionError::user_message)
                    .unwrap_or_else(|| e.to_string()),
                detail: format!("{:#}", e),
                diagnosis: session_err.and_then(SessionError::diagnosis),
            };
            let json = serde_json::to_string(&error)
                .unwrap_or_else(|_| format!(r#"{{"error": "{}"}}"#, e.to_string().replace('"', "'")));
            println!("{}", json);
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` when set and valid, otherwise warnings only
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let mut config = StamperConfig::load().context("Failed to load configuration")?;
    if let Some(url) = cli.api_url {
        config = config.with_api_url(url)?;
    }
    debug!(api_url = %config.api_url, "Using backend");

    let session = FileSession::new(&config);

    match cli.command {
        Commands::List => handle_list(&session).await,
        Commands::Upload { path } => handle_upload(&session, path).await,
        Commands::Stamp { identifier, date, name, comment } => {
            let mut stamp = StampRequest::new(date.unwrap_or_else(today), name);
            if let Some(comment) = comment {
                stamp = stamp.with_comment(comment);
            }
            handle_stamp(&session, identifier, stamp).await
        }
        Commands::Delete { identifier } => handle_delete(&session, &identifier).await,
        Commands::Select { identifier } => handle_select(&session, &identifier).await,
        Commands::Urls { identifier } => {
            let client = session.client();
            let output = UrlsOutput {
                download_url: client.resource_url(&identifier),
                thumbnail_url: client.thumbnail_url(&identifier),
                identifier,
            };
            Ok(serde_json::to_string(&output)?)
        }
        Commands::Diagnose => {
            let result = session.test_connection().await;
            Ok(serde_json::to_string(&result)?)
        }
    }
}

/// Today's date the way the stamp form pre-fills it
fn today() -> String {
    Local::now().format("%-d.%-m.%Y").to_string()
}

// ============ Handlers ============

async fn handle_list(session: &FileSession) -> anyhow::Result<String> {
    let report = session.refresh().await?;
    let state = session.snapshot();

    let output = ListOutput {
        files: state.files().to_vec(),
        selected_identifier: state.selected_identifier().map(str::to_string),
        degraded: report.is_degraded(),
        dropped: report.dropped,
    };
    Ok(serde_json::to_string(&output)?)
}

async fn handle_upload(session: &FileSession, path: PathBuf) -> anyhow::Result<String> {
    session.refresh().await?;
    let record = session.upload(&path).await?;
    record_output(session, record)
}

async fn handle_stamp(
    session: &FileSession,
    identifier: Option<String>,
    stamp: StampRequest,
) -> anyhow::Result<String> {
    session.refresh().await?;
    let record = session.stamp(identifier.as_deref(), &stamp).await?;
    record_output(session, record)
}

async fn handle_delete(session: &FileSession, identifier: &str) -> anyhow::Result<String> {
    session.refresh().await?;
    session.delete(identifier).await?;

    let output = DeleteOutput {
        deleted: identifier.to_string(),
        state: session.snapshot(),
    };
    Ok(serde_json::to_string(&output)?)
}

async fn handle_select(session: &FileSession, identifier: &str) -> anyhow::Result<String> {
    session.refresh().await?;
    session.select(identifier)?;
    let record = session
        .current_selection()
        .ok_or(SessionError::NoSelection)?;
    record_output(session, record)
}

fn record_output(session: &FileSession, record: FileRecord) -> anyhow::Result<String> {
    let client = session.client();
    let output = RecordOutput {
        download_url: record
            .resource_url
            .clone()
            .unwrap_or_else(|| client.resource_url(&record.identifier)),
        thumbnail_url: record
            .thumbnail_url
            .clone()
            .unwrap_or_else(|| client.thumbnail_url(&record.identifier)),
        record,
        state: session.snapshot(),
    };
    Ok(serde_json::to_string(&output)?)
}
