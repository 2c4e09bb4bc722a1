//! CLI entry point for condget.

use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use clap::Parser;
use condget_core::download::{format_http_date, parse_http_date};
use condget_core::{ClientConfig, Downloader, HttpClient};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

mod cli;

use cli::{Args, Mode};

/// Outcome printed by `--json`.
#[derive(Debug, Serialize)]
struct Report {
    url: String,
    dest: String,
    mode: &'static str,
    changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr so the --json report owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let client = HttpClient::new(client_config(&args)).context("failed to build HTTP client")?;
    let downloader = Downloader::new(client);

    let since = match args.since.as_deref() {
        Some(text) => Some(
            parse_http_date(text).with_context(|| format!("invalid --since date: {text}"))?,
        ),
        None => None,
    };

    let report = run(&downloader, &args, since).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            changed = report.changed,
            status = ?report.status,
            last_modified = ?report.last_modified,
            "done"
        );
    }

    Ok(())
}

fn client_config(args: &Args) -> ClientConfig {
    if let Some(timeout_ms) = args.single_connection {
        return ClientConfig::single_threaded(timeout_ms);
    }

    let mut config = ClientConfig::default_multithreaded();
    if let Some(ms) = args.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = args.read_timeout_ms {
        config.read_timeout = Duration::from_millis(ms);
    }
    if let Some(max) = args.max_connections {
        config.max_connections = usize::from(max);
        config.max_connections_per_route = (usize::from(max) / 2).max(1);
    }
    config
}

async fn run(downloader: &Downloader, args: &Args, since: Option<SystemTime>) -> Result<Report> {
    let dest = args.dest.as_path();
    let mut report = Report {
        url: args.url.clone(),
        dest: dest.display().to_string(),
        mode: args.mode.as_str(),
        changed: false,
        status: None,
        final_url: None,
        last_modified: None,
    };

    match args.mode {
        Mode::Changed => {
            report.changed = match since {
                Some(since) => {
                    downloader
                        .download_if_changed_since(&args.url, Some(since), dest)
                        .await?
                }
                None => downloader.download_if_changed(&args.url, dest).await?,
            };
        }
        Mode::Always | Mode::ModifiedSince => {
            let baseline = match (args.mode, since) {
                (Mode::Always, _) => None,
                (_, Some(since)) => Some(since),
                (_, None) => downloader.store().read(dest).await,
            };
            let status = match baseline {
                Some(baseline) => {
                    downloader
                        .download_if_modified_since(&args.url, baseline, dest)
                        .await?
                }
                None => downloader.download(&args.url, dest).await?,
            };
            report.changed = status.is_success();
            report.status = Some(status.code.as_u16());
            report.final_url = Some(status.final_url.to_string());

            if !status.is_success() && status.code != StatusCode::NOT_MODIFIED {
                bail!(
                    "{} answered {} {}",
                    status.final_url,
                    status.code.as_u16(),
                    status.reason().unwrap_or("")
                );
            }
        }
    }

    report.last_modified = local_timestamp(downloader, dest).await;
    Ok(report)
}

async fn local_timestamp(downloader: &Downloader, dest: &Path) -> Option<String> {
    downloader.store().read(dest).await.map(format_http_date)
}
