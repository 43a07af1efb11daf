//! fin-ingest CLI: scheduled ingestion tasks.
//!
//! Commands:
//! - `finam [START] [END]`: daily bars for configured assets from the Finam Trade API
//! - `accounts [START] [END]`: register broker accounts of the Finam session
//! - `import-csv FILE`: trades of one asset from a CSV file
//! - `refresh`: rebuild the materialized views
//!
//! Each command reads the base configuration plus its own task profile.
//! The process exits with status 1 when any item failed.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use fin_ingest_core::store::AggType;
use fin_ingest_runner::tasks::{csv_import, finam_accounts, finam_bars, refresh};
use fin_ingest_runner::{CsvImport, Period, Settings};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "fin-ingest",
    version,
    about = "fin-ingest: idempotent financial data ingestion into PostgreSQL"
)]
struct Cli {
    /// Log level or filter directive. Overrides the configured `log_level`; `RUST_LOG` wins over both.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
struct PeriodArgs {
    /// First day (YYYY-MM-DD). Defaults to `lookback_days` before today.
    start: Option<String>,

    /// Last day (YYYY-MM-DD). Defaults to START, or to today when START is absent.
    end: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load daily bars for configured assets from the Finam Trade API.
    Finam {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Register broker accounts visible to the Finam session.
    Accounts {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Import trades of one asset from a CSV file (`dt` plus any of `o,h,l,c,v`).
    ImportCsv {
        /// CSV file to import.
        file: PathBuf,

        /// Market of the asset, e.g. CBR.
        #[arg(long)]
        market: String,

        /// Asset code within the market, e.g. USD.
        #[arg(long)]
        code: String,

        /// Display name. Defaults to "MARKET CODE[, UNIT]".
        #[arg(long)]
        name: Option<String>,

        /// Unit the values are quoted in.
        #[arg(long)]
        unit: Option<String>,

        /// Aggregation type: I, S, D, O or C.
        #[arg(long, default_value = "D")]
        agg_type: AggType,

        /// Only add missing rows; never overwrite stored values.
        #[arg(long, default_value_t = false)]
        no_update: bool,
    },
    /// Refresh materialized views after loading.
    Refresh,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level.as_deref();

    let ok = match cli.command {
        Commands::Finam { period } => {
            let settings = load_settings(finam_bars::PROFILE, log_level)?;
            let period = resolve_period(&period, &settings)?;
            finam_bars::run(&settings, period).context("Finam bars ingestion failed")?
        }
        Commands::Accounts { period } => {
            let settings = load_settings(finam_accounts::PROFILE, log_level)?;
            let period = resolve_period(&period, &settings)?;
            finam_accounts::run(&settings, period).context("Finam accounts ingestion failed")?
        }
        Commands::ImportCsv {
            file,
            market,
            code,
            name,
            unit,
            agg_type,
            no_update,
        } => {
            let settings = load_settings(csv_import::PROFILE, log_level)?;
            let import = CsvImport {
                market,
                code,
                name,
                unit,
                agg_type,
                update: !no_update,
            };
            csv_import::run(&settings, &import, &file)
                .with_context(|| format!("CSV import of {} failed", file.display()))?;
            true
        }
        Commands::Refresh => {
            let settings = load_settings(refresh::PROFILE, log_level)?;
            refresh::run(&settings).context("Refreshing materialized views failed")?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn load_settings(profile: &str, log_level: Option<&str>) -> Result<Settings> {
    let settings = Settings::load(Some(profile))
        .with_context(|| format!("Failed to load configuration for profile '{profile}'"))?;
    init_logging(log_level.unwrap_or(&settings.log_level));
    info!("Starting task: {profile}");
    Ok(settings)
}

fn resolve_period(args: &PeriodArgs, settings: &Settings) -> Result<Period> {
    let today = Local::now().date_naive();
    let period = Period::from_args(
        args.start.as_deref(),
        args.end.as_deref(),
        today,
        settings.lookback_days,
    )?;
    Ok(period)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
