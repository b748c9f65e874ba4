use anyhow::{Context, Result};
use casewatch_pipeline::{DailyRunner, JsonReportWriter, RunConfig};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod outbox;
mod settings;
mod snapshot;

use outbox::OutboxNotifier;
use settings::ReportSettings;
use snapshot::{read_snapshot, render_listing, SnapshotSource};

#[derive(Parser)]
#[command(name = "casewatch")]
#[command(about = "Daily change report over portal case records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one baseline or incremental report cycle
    Run {
        /// JSON array of records exported by the portal scraper
        #[arg(long)]
        snapshot: PathBuf,
        /// Directory holding pre-downloaded `<key>.pdf` artifacts
        #[arg(long)]
        artifact_source: Option<PathBuf>,
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long)]
        artifact_dir: Option<PathBuf>,
    },
    /// Summarize a snapshot and flag duplicate records
    List {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Print the effective settings
    CheckConfig,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            snapshot,
            artifact_source,
            history,
            report,
            artifact_dir,
        } => {
            let mut settings = ReportSettings::from_env();
            if let Some(path) = history {
                settings.history_path = path;
            }
            if let Some(path) = report {
                settings.report_path = path;
            }
            if let Some(path) = artifact_dir {
                settings.artifact_dir = path;
            }

            let runner = DailyRunner::new(RunConfig {
                report_offset: *Local::now().offset(),
                ..settings.run_config()
            });
            let mut source = SnapshotSource::new(snapshot, artifact_source);
            let mut notifier = OutboxNotifier::new(settings.mail.clone(), &settings.outbox_dir);

            let outcome = runner
                .run(&mut source, &mut JsonReportWriter, &mut notifier, Utc::now())
                .context("report run failed")?;

            info!(event = "run_summary", mode = %outcome.mode);
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("failed to render run outcome")?
            );
        }
        Commands::List { snapshot } => {
            let records = read_snapshot(&snapshot)
                .with_context(|| format!("failed to load snapshot {}", snapshot.display()))?;
            println!("{}", render_listing(&records));
        }
        Commands::CheckConfig => {
            let settings = ReportSettings::from_env();
            for (label, value) in settings.describe() {
                println!("{label:16} {value}");
            }

            let missing = settings.mail.missing_mandatory();
            if missing.is_empty() {
                println!("\nmail delivery settings complete");
            } else {
                println!("\nmissing mandatory mail settings: {}", missing.join(", "));
            }
            if !settings.mail.has_credentials() {
                println!("smtp credentials not set; the relay will try unauthenticated delivery");
            }
        }
    }

    Ok(())
}

fn init_logging() {
    let level = std::env::var("CASEWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
