//! BioKB Enrich CLI — biomarker knowledge-base enrichment tool.
//!
//! Enriches biomarker query terms against the BiomarkerKB API and exports
//! the combined records to CSV.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
