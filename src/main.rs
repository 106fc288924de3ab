use airphoto_index::log_format::init_tracing;
use airphoto_index::{
    HttpFetcher, RunSummary, ScrapeConfig, failure_exit_code, run_reconcile, run_scrape,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "airphoto_index",
    version,
    about = "Scrape county aerial photography flight indexes and reconcile them with a reference dataset"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape every county and write the flight records (the default)
    Scrape {
        /// Flight records output file (default: AIRPHOTO_OUTPUT or flight_records.csv)
        #[arg(long = "out")]
        out: Option<PathBuf>,
        /// Reference dataset to reconcile against (default: AIRPHOTO_REFERENCE)
        #[arg(long)]
        reference: Option<PathBuf>,
        /// Merged output file (default: AIRPHOTO_MERGED_OUTPUT or merged_records.csv)
        #[arg(long = "merged-out")]
        merged_out: Option<PathBuf>,
    },
    /// Reconcile a previously written flight records file without scraping
    Reconcile {
        /// Flight records written by an earlier scrape (default: AIRPHOTO_OUTPUT)
        #[arg(long)]
        records: Option<PathBuf>,
        /// Reference dataset
        #[arg(long)]
        reference: PathBuf,
        /// Merged output file (default: AIRPHOTO_MERGED_OUTPUT or merged_records.csv)
        #[arg(long = "merged-out")]
        merged_out: Option<PathBuf>,
    },
}

async fn run(cli: Cli) -> Result<RunSummary> {
    let mut config = ScrapeConfig::from_env().context("Invalid configuration")?;

    match cli.command.unwrap_or(Commands::Scrape {
        out: None,
        reference: None,
        merged_out: None,
    }) {
        Commands::Scrape {
            out,
            reference,
            merged_out,
        } => {
            if let Some(out) = out {
                config.output_path = out;
            }
            if reference.is_some() {
                config.reference_path = reference;
            }
            if let Some(merged_out) = merged_out {
                config.merged_output_path = merged_out;
            }

            let fetcher = HttpFetcher::new(&config.user_agent)?;
            run_scrape(&config, fetcher).await
        }
        Commands::Reconcile {
            records,
            reference,
            merged_out,
        } => {
            let records = records.unwrap_or(config.output_path);
            let merged_out = merged_out.unwrap_or(config.merged_output_path);
            run_reconcile(&records, &reference, &merged_out)
        }
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(summary) => println!("{}", summary),
        Err(e) => {
            error!("Run failed: {:#}", e);
            std::process::exit(failure_exit_code(&e));
        }
    }
}
