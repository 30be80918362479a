//! catalog-migrate CLI - batch migration and reconciliation for product
//! catalogs.

use catalog_migrate::{
    Config, CsvFileSource, DestinationWriter, MemoryStore, MigrateError, MigrationReport,
    Orchestrator, SourceReader, SqlFileSink,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "catalog-migrate")]
#[command(about = "Batch migration and reconciliation for product catalogs")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to state file for resume capability
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new migration
    Run {
        /// Override number of parallel partitions
        #[arg(long)]
        workers: Option<usize>,

        /// Transform and classify without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Resume a previously interrupted migration
    Resume {
        /// Override number of parallel partitions
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Delete destination records, optionally limited to one category
    Purge {
        /// Only delete records in this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Show destination aggregate statistics
    Stats,
}

/// Concrete destination behind the writer trait, kept around so file-backed
/// sinks can be flushed after the run.
enum Sink {
    Sql(Arc<SqlFileSink>),
    Memory(Arc<MemoryStore>),
}

impl Sink {
    fn writer(&self) -> Arc<dyn DestinationWriter> {
        match self {
            Sink::Sql(sink) => sink.clone(),
            Sink::Memory(store) => store.clone(),
        }
    }

    fn finish(&self) -> Result<(), MigrateError> {
        match self {
            Sink::Sql(sink) => sink.finish(),
            Sink::Memory(_) => Ok(()),
        }
    }
}

fn build_reader(config: &Config) -> Result<Arc<dyn SourceReader>, MigrateError> {
    match config.source.r#type.as_str() {
        "csv" => {
            let delimiter = config.source.delimiter.bytes().next().unwrap_or(b',');
            Ok(Arc::new(CsvFileSource::open_with_delimiter(
                &config.source.path,
                delimiter,
            )?))
        }
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(MigrateError::Config(format!(
            "unsupported source type '{other}'"
        ))),
    }
}

fn build_sink(config: &Config) -> Result<Sink, MigrateError> {
    match config.target.r#type.as_str() {
        "sql" => Ok(Sink::Sql(Arc::new(SqlFileSink::create(
            &config.target.path,
            &config.target.table,
        )?))),
        "memory" => Ok(Sink::Memory(Arc::new(MemoryStore::new()))),
        other => Err(MigrateError::Config(format!(
            "unsupported target type '{other}'"
        ))),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // SIGINT and SIGTERM both request a graceful stop between batches.
    let cancel_token = setup_signal_handler().await?;

    match cli.command {
        Commands::Run { workers, dry_run } => {
            if let Some(w) = workers {
                config.migration.workers = w;
            }
            config.validate()?;

            let reader = build_reader(&config)?;
            let sink = build_sink(&config)?;
            let mut orchestrator = Orchestrator::new(config, reader, sink.writer());
            if let Some(ref path) = cli.state_file {
                orchestrator = orchestrator.with_state_file(path.clone());
            }
            orchestrator = orchestrator.dry_run(dry_run);

            let report = orchestrator.run(cancel_token).await?;
            sink.finish()?;
            print_report(&cli, &report)?;
        }

        Commands::Resume { workers } => {
            // State file is required for resume
            let state_file = cli.state_file.clone().ok_or_else(|| {
                MigrateError::Config("--state-file is required for resume".to_string())
            })?;
            if !state_file.exists() {
                return Err(MigrateError::Config(format!(
                    "state file not found: {state_file:?}"
                )));
            }

            if let Some(w) = workers {
                config.migration.workers = w;
            }
            config.validate()?;

            let reader = build_reader(&config)?;
            let sink = build_sink(&config)?;
            let orchestrator = Orchestrator::new(config, reader, sink.writer())
                .with_state_file(state_file)
                .resume()?;

            info!("Resuming from previous state");

            let report = orchestrator.run(cancel_token).await?;
            sink.finish()?;
            print_report(&cli, &report)?;
        }

        Commands::Purge { category } => {
            let reader = build_reader(&config)?;
            let sink = build_sink(&config)?;
            let orchestrator = Orchestrator::new(config, reader, sink.writer());

            let report = orchestrator
                .purge(category.as_deref(), &cancel_token)
                .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Purge completed!");
                println!("  Targeted: {}", report.targeted);
                println!("  Removed: {}", report.removed);
                if report.failed > 0 {
                    println!("  Failed: {}", report.failed);
                }
            }
        }

        Commands::Stats => {
            let reader = build_reader(&config)?;
            let sink = build_sink(&config)?;
            let orchestrator = Orchestrator::new(config, reader, sink.writer());

            let stats = orchestrator.stats().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Destination statistics:");
                println!("  Records: {}", stats.count);
                println!("  Total stock: {}", stats.total_stock);
                println!("  Total value: {}", stats.total_value);
            }
        }
    }

    Ok(())
}

fn print_report(cli: &Cli, report: &MigrationReport) -> Result<(), MigrateError> {
    if cli.output_json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    let status_msg = if report.dry_run {
        "Dry run completed!"
    } else {
        "Migration completed!"
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!("  Extracted: {}", report.totals.extracted);
    println!("  Inserted: {}", report.totals.inserted);
    println!("  Duplicates skipped: {}", report.totals.duplicates);
    println!("  Failed: {}", report.totals.failed);
    println!("  Rejected: {}", report.totals.rejected);
    println!("  Throughput: {} records/sec", report.records_per_second);
    if let Some(ref reconcile) = report.reconcile {
        if reconcile.is_clean() {
            println!("  Reconciliation: clean");
        } else {
            println!("  Reconciliation: {} mismatch(es)", reconcile.findings.len());
            for finding in &reconcile.findings {
                println!(
                    "    {}: expected {}, destination has {}",
                    finding.field, finding.expected, finding.actual
                );
            }
        }
    }
    if !report.failed_partitions.is_empty() {
        println!("  Failed partitions: {:?}", report.failed_partitions);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    let token_term = cancel_token.clone();

    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Stopping after the current batch...");
        token_int.cancel();
    });

    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Stopping after the current batch...");
        token_term.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only SIGINT/Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to setup Ctrl-C handler");
        eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
        token.cancel();
    });

    Ok(cancel_token)
}
