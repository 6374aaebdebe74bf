//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use biokb_client::BkbClient;
use biokb_core::pipeline::{
    self, EnrichConfig, EnrichSummary, ProgressReporter, QueryOutcome, ScanConfig, ScanSummary,
};
use biokb_shared::{AppConfig, FetchConfig, SearchFilter, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// BioKB Enrich — biomarker knowledge-base enrichment.
#[derive(Parser)]
#[command(
    name = "biokb",
    version,
    about = "Enrich biomarker lists from the BiomarkerKB API and export them to CSV.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich each biomarker name from an input spreadsheet column.
    Entity {
        /// Input CSV holding the biomarker names.
        #[arg(default_value = "Biomarkers_Categorization.csv")]
        input: PathBuf,

        /// Input column to read query terms from.
        #[arg(short, long, default_value = "BioMarker")]
        column: String,

        /// Output CSV for the combined results.
        #[arg(short, long, default_value = "biomarker_results.csv")]
        out: PathBuf,

        /// Starting page-size hint (defaults from config).
        #[arg(long)]
        size: Option<u64>,

        /// Let the server pick the page size (disables escalation).
        #[arg(long, conflicts_with = "size")]
        auto_size: bool,

        /// Maximum size-escalation rounds per query (defaults from config).
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Fetch all records of one record type.
    RecordType {
        /// Record type to scan for (e.g. "biomarker").
        value: String,

        /// Output CSV (defaults to record_type_<value>_biomarkers.csv).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Starting page-size hint (defaults from config).
        #[arg(long)]
        size: Option<u64>,

        /// Let the server pick the page size (disables escalation).
        #[arg(long, conflicts_with = "size")]
        auto_size: bool,

        /// Maximum size-escalation rounds (defaults from config).
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Fetch all records associated with one specimen name.
    Specimen {
        /// Specimen name to scan for (e.g. "cerebrospinal fluid").
        value: String,

        /// Output CSV (defaults to <value>_specimen_biomarkers.csv).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Starting page-size hint (defaults from config).
        #[arg(long)]
        size: Option<u64>,

        /// Let the server pick the page size (disables escalation).
        #[arg(long, conflicts_with = "size")]
        auto_size: bool,

        /// Maximum size-escalation rounds (defaults from config).
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Resolve the effective page-size hint from flags and config defaults.
fn resolve_size(size: Option<u64>, auto_size: bool, config_default: u64) -> Option<u64> {
    if auto_size {
        None
    } else {
        Some(size.unwrap_or(config_default))
    }
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Entity {
            input,
            column,
            out,
            size,
            auto_size,
            max_attempts,
        } => cmd_entity(input, column, out, size, auto_size, max_attempts).await,
        Command::RecordType {
            value,
            out,
            size,
            auto_size,
            max_attempts,
        } => {
            let out =
                out.unwrap_or_else(|| PathBuf::from(format!("record_type_{value}_biomarkers.csv")));
            cmd_scan(SearchFilter::RecordType(value), out, size, auto_size, max_attempts).await
        }
        Command::Specimen {
            value,
            out,
            size,
            auto_size,
            max_attempts,
        } => {
            let out =
                out.unwrap_or_else(|| PathBuf::from(format!("{value}_specimen_biomarkers.csv")));
            cmd_scan(SearchFilter::Specimen(value), out, size, auto_size, max_attempts).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_entity(
    input: PathBuf,
    column: String,
    out: PathBuf,
    size: Option<u64>,
    auto_size: bool,
    max_attempts: Option<u32>,
) -> Result<()> {
    let config = load_config()?;

    if !input.exists() {
        return Err(eyre!("input file '{}' not found", input.display()));
    }

    let client = BkbClient::new(FetchConfig::from(&config))?;
    let enrich_config = EnrichConfig {
        input,
        column,
        output: out,
        initial_size: resolve_size(size, auto_size, config.defaults.entity_initial_size),
        max_attempts: max_attempts.unwrap_or(config.defaults.max_attempts),
    };

    info!(
        input = %enrich_config.input.display(),
        column = %enrich_config.column,
        size = ?enrich_config.initial_size,
        "starting enrichment"
    );

    let reporter = CliProgress::new();
    let summary = pipeline::run_enrichment(&client, &enrich_config, &reporter).await?;
    reporter.finish();

    print_enrich_summary(&summary);
    Ok(())
}

async fn cmd_scan(
    filter: SearchFilter,
    out: PathBuf,
    size: Option<u64>,
    auto_size: bool,
    max_attempts: Option<u32>,
) -> Result<()> {
    let config = load_config()?;

    let client = BkbClient::new(FetchConfig::from(&config))?;
    let scan_config = ScanConfig {
        filter,
        output: out,
        initial_size: resolve_size(size, auto_size, config.defaults.scan_initial_size),
        max_attempts: max_attempts.unwrap_or(config.defaults.max_attempts),
    };

    info!(
        filter = %scan_config.filter.description(),
        size = ?scan_config.initial_size,
        "starting scan"
    );

    let reporter = CliProgress::new();
    let summary = pipeline::run_scan(&client, &scan_config, &reporter).await?;
    reporter.finish();

    print_scan_summary(&summary);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Summary output
// ---------------------------------------------------------------------------

fn print_enrich_summary(summary: &EnrichSummary) {
    println!();
    println!("  Enrichment complete!");
    println!("  Input terms:    {}", summary.total);
    println!("  With data:      {}", summary.with_data);
    println!("  No data found:  {}", summary.empty);
    println!("  Fetch failures: {}", summary.failed);
    println!(
        "  Final table:    {} rows x {} columns",
        summary.output_rows, summary.output_columns
    );
    println!("  Output:         {}", summary.output_path.display());
    println!("  Time:           {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

fn print_scan_summary(summary: &ScanSummary) {
    println!();
    if summary.wrote_output {
        println!("  Scan complete!");
        println!(
            "  Final table: {} rows x {} columns",
            summary.rows, summary.columns
        );
        println!("  Output:      {}", summary.output_path.display());
    } else {
        println!("  No data was found for the requested scan.");
    }
    println!("  Time:        {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn query_started(&self, term: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching [{current}/{total}] {term}"));
    }

    fn query_finished(&self, term: &str, outcome: &QueryOutcome) {
        if let QueryOutcome::Failed(error) = outcome {
            self.spinner.println(format!("  fetch failed for '{term}': {error}"));
        }
    }
}
