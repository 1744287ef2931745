//! Ledger maintenance tool
//!
//! Command-line access to the engine against a running ledger store:
//! duplicate analysis reports, view-consistent statistics, and full CSV
//! export.
//!
//! Usage:
//!   ledger_tool --store-url http://localhost:8080/api analyze
//!   ledger_tool stats --host-name Dunwoody
//!   ledger_tool export --output ledger.csv

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sandwich_ledger::duplicates::DuplicateDetector;
use sandwich_ledger::export::export_full_ledger;
use sandwich_ledger::hosts::HostStatus;
use sandwich_ledger::models::{Config, FilterState};
use sandwich_ledger::stats;
use sandwich_ledger::store::{LedgerStore, RestLedgerStore};
use sandwich_ledger::view::apply_filters;
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ledger_tool")]
#[command(about = "Inspect and maintain the sandwich collection ledger")]
struct Cli {
    /// Base URL of the ledger store API
    #[arg(long, env = "LEDGER_STORE_URL")]
    store_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run all three duplicate-detection modes over the full ledger
    Analyze {
        /// Emit the full analysis as JSON instead of a text report
        #[arg(long)]
        json: bool,
    },

    /// Show totals, optionally for a filtered subset
    Stats {
        /// Host name substring filter
        #[arg(long)]
        host_name: Option<String>,

        /// Global search filter
        #[arg(long)]
        search: Option<String>,
    },

    /// Export the full unfiltered ledger as CSV
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let base_url = cli.store_url.unwrap_or(config.store_base_url);
    let store = RestLedgerStore::new(&base_url, config.api_key.as_deref())?;

    match cli.command {
        Commands::Analyze { json } => {
            let ledger = store.fetch_all(config.fetch_cap).await?;
            let hosts = store.host_directory().await.unwrap_or_default();
            let analysis = DuplicateDetector::default().analyze(&ledger);

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
                return Ok(());
            }

            if analysis.is_clean() {
                println!("No duplicates or suspicious entries found.");
                return Ok(());
            }

            println!("Exact duplicate clusters: {}", analysis.exact_clusters.len());
            for cluster in &analysis.exact_clusters {
                println!("  key {}", cluster.key);
                for member in &cluster.members {
                    let marker = if member.id == cluster.keep_candidate_id {
                        "keep"
                    } else {
                        "delete"
                    };
                    let status = match hosts.status(&member.host_name) {
                        Some(HostStatus::Inactive) => " (inactive host)",
                        _ => "",
                    };
                    println!(
                        "    [{}] #{} {} {}{} ({} sandwiches, by {})",
                        marker,
                        member.id,
                        member.formatted_collection_date(),
                        member.host_name,
                        status,
                        member.total_sandwiches(),
                        member.created_by
                    );
                }
            }

            println!("Suspicious entries: {}", analysis.suspicious.len());
            for entry in &analysis.suspicious {
                println!("  #{} {} — {}", entry.id, entry.collection_date, entry.reason);
            }

            println!("Historical aggregate pairs: {}", analysis.aggregate_pairs.len());
            for pair in &analysis.aggregate_pairs {
                println!("  aggregate #{}: {}", pair.aggregate_id, pair.reason);
            }
        }

        Commands::Stats { host_name, search } => {
            let filter = FilterState {
                host_name,
                global_search: search,
                ..Default::default()
            };

            let view_stats = if filter.is_empty() {
                store.global_stats().await?
            } else {
                let ledger = store.fetch_all(config.fetch_cap).await?;
                stats::compute(&apply_filters(&ledger, &filter))
            };

            println!("Entries:     {}", view_stats.total_entries);
            println!("Individual:  {}", view_stats.individual_total);
            println!("Group:       {}", view_stats.group_total);
            println!("Grand total: {}", view_stats.grand_total);
        }

        Commands::Export { output } => {
            let file = File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let rows = export_full_ledger(&store, config.fetch_cap, file).await?;
            info!(rows, path = %output.display(), "export complete");
            println!("Wrote {} rows to {}", rows, output.display());
        }
    }

    Ok(())
}
