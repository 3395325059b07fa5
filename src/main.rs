use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use pginfo::config::DbConfig;
use pginfo::orchestrator::RunOptions;
use pginfo::report::{write_output, OutputFormat, Reporter};
use pginfo::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum CliFormat {
    /// Full snapshot as pretty-printed JSON
    #[default]
    Json,
    /// Short human-readable summary
    Text,
}

impl From<CliFormat> for OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Json => OutputFormat::Json,
            CliFormat::Text => OutputFormat::Text,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pginfo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subsets to collect, comma-separated shell wildcards; prefix with ! to exclude
    #[arg(short, long, value_delimiter = ',')]
    filter: Vec<String>,

    /// Database to connect to first (overrides DB_NAME)
    #[arg(long)]
    db: Option<String>,

    /// Role to switch to after connecting
    #[arg(long)]
    session_role: Option<String>,

    /// Skip the injection check on --session-role and --filter
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    trust_input: bool,

    /// Path to .env file for connection config
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = CliFormat::Json)]
    format: CliFormat,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        error!(error = ?e, "Fatal error");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    info!("pginfo v{}", env!("CARGO_PKG_VERSION"));
    info!(
        filter = ?cli.filter,
        db = ?cli.db,
        format = ?cli.format,
        output = ?cli.output,
        "Starting collection"
    );

    let config = DbConfig::load(&cli.env_file)
        .context("Failed to load database configuration")?
        .with_database(cli.db);
    debug!(connection = ?config.redacted_connection_string(), "Loaded configuration");

    let options = RunOptions {
        filter: cli.filter,
        database: config.database.clone(),
        session_role: cli.session_role,
        trust_input: cli.trust_input,
    };

    let snapshot = collect_postgres(config, &options)?;

    let reporter = Reporter::new()?;
    let report = reporter
        .render(&snapshot, cli.format.into())
        .context("Failed to render snapshot")?;
    write_output(&report, cli.output.as_deref()).context("Failed to write snapshot")?;

    Ok(())
}

/// Logs go to stderr so stdout carries only the report. `RUST_LOG` wins
/// over `-v` when set.
fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,pginfo={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

#[cfg(feature = "postgres")]
fn collect_postgres(config: DbConfig, options: &RunOptions) -> Result<Snapshot> {
    use pginfo::orchestrator::gather;
    use pginfo::PostgresConnector;

    info!(connection = ?config.redacted_connection_string(), "Connecting to PostgreSQL");
    let target = config.redacted_connection_string();

    let snapshot = gather(Box::new(PostgresConnector::new(config)), options)
        .with_context(|| format!("Failed to collect server information from {}", target))?;

    info!(subsets = ?snapshot.collected(), "Snapshot ready");
    Ok(snapshot)
}

#[cfg(not(feature = "postgres"))]
fn collect_postgres(_config: DbConfig, _options: &RunOptions) -> Result<Snapshot> {
    use anyhow::bail;

    bail!("PostgreSQL support not enabled. Rebuild with --features postgres")
}
