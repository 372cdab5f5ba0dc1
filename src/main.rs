//! quotaroll - roll organization quotas and memory metrics up into monthly summaries

use chrono::Utc;
use clap::Parser;
use quotaroll::{
    Result,
    cli::{Cli, Command},
    config::{AggregationConfig, PollConfig},
    notify::WebhookNotifier,
    pipeline::{AggregationReport, SnapshotOutcome, run_aggregation, run_poll},
};
use quotaroll_cf::{CfSession, ResourceFetcher};
use quotaroll_core::snapshot::read_snapshot;
use quotaroll_store::ElasticsearchStore;
use quotaroll_terminal::get_formatter;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first to check for quiet flag
    let cli = Cli::parse();

    // Initialize logging. The --quiet flag should override RUST_LOG.
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("warn")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quotaroll=info"))
    };

    // Reports go to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            if let Some(url) = &cli.notify_webhook {
                WebhookNotifier::new(url.as_str())
                    .notify_failure(cli.command.name(), &e)
                    .await;
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let formatter = get_formatter(cli.json);

    match &cli.command {
        Command::Poll(args) => {
            let config = PollConfig::from_args(args, Utc::now())?;
            info!("Polling quota assignments into {}", config.poll_index);

            let store = ElasticsearchStore::new(
                &config.es_uri,
                Duration::from_secs(quotaroll::config::DEFAULT_QUERY_TIMEOUT_SECS),
            )?;
            let session =
                CfSession::login(&config.cf_api_url, &config.cf_client_id, &config.cf_client_secret)
                    .await?;
            let show_progress = !cli.json && is_terminal::is_terminal(std::io::stdout());
            let fetcher = ResourceFetcher::new(session).with_progress(show_progress);

            let report = run_poll(
                &fetcher,
                &store,
                &config.poll_index,
                config.on_missing_quota,
                Utc::now(),
            )
            .await?;

            println!("{}", formatter.format_poll(&report.documents));
            if !report.skipped.is_empty() {
                eprintln!(
                    "{} organizations skipped for unknown quota definitions",
                    report.skipped.len()
                );
            }
        }
        Command::Aggregate(args) => {
            let config = AggregationConfig::from_aggregate_args(args, Utc::now())?;
            aggregate(config, cli).await?;
        }
        Command::Summarize(args) => {
            let config = AggregationConfig::from_summarize_args(args, Utc::now())?;
            aggregate(config, cli).await?;
        }
        Command::Show { snapshot } => {
            let documents = read_snapshot(snapshot).await?;
            println!("{}", formatter.format_summaries(&documents));
        }
    }

    Ok(())
}

async fn aggregate(config: AggregationConfig, cli: &Cli) -> Result<()> {
    let store = ElasticsearchStore::new(&config.es_uri, config.query_timeout)?;
    let report = run_aggregation(&store, &config.job).await?;
    print_report(report, cli.json)
}

fn print_report(report: AggregationReport, json: bool) -> Result<()> {
    println!("{}", get_formatter(json).format_summaries(&report.documents));

    match report.snapshot {
        SnapshotOutcome::Disabled => Ok(()),
        SnapshotOutcome::Written(path) => {
            info!("Snapshot written to {}", path.display());
            Ok(())
        }
        // The summaries are already in the store; still fail the run
        SnapshotOutcome::Failed(e) => Err(e),
    }
}
