//! threadsight binary: API server plus the tabular bulk loader.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "threadsight")]
#[command(about = "Customer-support conversation insights service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server and the analysis worker.
    Serve {
        #[arg(short, long, default_value = "8000")]
        port: u16,
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
    },
    /// Bulk-load conversations from a support-tweets CSV export.
    LoadCsv {
        /// Path to the CSV file (columns: tweet_id, author_id, inbound,
        /// created_at, text, in_response_to_tweet_id).
        #[arg(long, default_value = "data/twcs.csv")]
        csv: PathBuf,
        /// Max conversations to load.
        #[arg(long, default_value = "5000")]
        limit: usize,
        #[arg(long, default_value = "http://localhost:8000")]
        base_url: String,
        /// Only rebuild conversations from the CSV, do not POST.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(&host, port).await,
        Commands::LoadCsv { csv, limit, base_url, dry_run } => {
            commands::load_csv::run(&csv, limit, &base_url, dry_run).await
        },
    }
}
