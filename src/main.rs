use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use cct_consolidator::app::consolidate::ConsolidateUseCase;
use cct_consolidator::app::ports::{FetchPort, SecondaryFeedPort};
use cct_consolidator::config::Config;
use cct_consolidator::infra::{HttpFetcher, WhoFeed};
use cct_consolidator::logging;
use cct_consolidator::sources::{all_source_ids, create_adapter, SourceAdapter};
use cct_consolidator::store::{CsvStore, SeriesStore};

#[derive(Parser)]
#[command(name = "cct_consolidator")]
#[command(about = "Consolidates cumulative-counter COVID time series into canonical per-location series")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the consolidation pipeline for all or selected sources
    Run {
        /// Specific sources to run (comma-separated). Available: indonesia, montenegro
        #[arg(long)]
        sources: Option<String>,
    },
    /// List the registered source adapters
    ListSources,
}

fn resolve_adapters(sources: Option<String>) -> anyhow::Result<Vec<Box<dyn SourceAdapter>>> {
    let names: Vec<String> = match sources {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => all_source_ids().iter().map(|s| s.to_string()).collect(),
    };
    let mut adapters = Vec::new();
    for name in names {
        match create_adapter(&name) {
            Some(adapter) => adapters.push(adapter),
            None => bail!("unknown source '{name}'"),
        }
    }
    Ok(adapters)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load_or_default()?;
    logging::init_logging(&config.log_directive);

    match cli.command {
        Commands::ListSources => {
            for source in all_source_ids() {
                println!("{source}");
            }
        }
        Commands::Run { sources } => {
            let adapters = resolve_adapters(sources).map_err(|e| {
                error!("{e}");
                e
            })?;

            let store: Arc<dyn SeriesStore> = Arc::new(CsvStore::new(&config.data_root)?);
            let fetch: Arc<dyn FetchPort> = Arc::new(HttpFetcher::new(
                config.http.timeout_seconds,
                config.http.retry_budget,
            )?);
            let secondary: Arc<dyn SecondaryFeedPort> =
                Arc::new(WhoFeed::new(fetch.clone(), &config.secondary_feed_url));

            let use_case =
                ConsolidateUseCase::new(store, fetch, secondary, config.stale_after_days);
            let outcomes = use_case
                .run_all(adapters, config.max_concurrent_locations)
                .await;

            let mut failures = 0;
            for (source, outcome) in &outcomes {
                match outcome {
                    Ok(summary) => {
                        info!(source, location = %summary.location, "source run finished");
                        println!("\n📊 {} ({}, {} source):", source, summary.location, summary.kind);
                        println!("   Observed: {}", summary.observed);
                        println!("   Inserted: {}", summary.inserted);
                        println!("   Updated: {}", summary.updated);
                        println!("   Flagged: {}", summary.flagged);
                        println!("   Dropped by reconcile: {}", summary.dropped_by_reconcile);
                        if !summary.rejected.is_empty() {
                            println!("   ⚠️  Rejected points:");
                            for (date, reason) in &summary.rejected {
                                println!("      - {date}: {reason}");
                            }
                        }
                    }
                    Err(err) => {
                        failures += 1;
                        error!(source, %err, "source run failed");
                        println!("\n❌ {source}: {err}");
                    }
                }
            }

            if failures > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
