//! Maintenance driver for the word count engine / 词数统计维护脚本
//!
//! Runs the reconciliation tasks in bounded batches from the command
//! line, sharing config.json with the server:
//!
//! ```text
//! wordcounter-maintenance count-words [--force] [--limit N] [--pages "A|B"] [--dry-run]
//! wordcounter-maintenance purge-orphaned [--limit N] [--dry-run]
//! ```
//!
//! Exits non-zero when a run produced at least one error, never because
//! there was no matching work.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use wordcounter_backend::config;
use wordcounter_backend::counter::tasks::{
    run_count_task, run_purge_task, CountTaskOptions, PurgeTaskOptions,
};
use wordcounter_backend::counter::{AggregateCache, CacheBackend, CountStore};
use wordcounter_backend::db;

/// Batch size for one task invocation / 单次任务的批量大小
const BATCH_SIZE: i64 = 100;

/// Yield point between batches; lets the store settle under sustained
/// load / 批次间让存储端追上进度
const BATCH_PAUSE: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "wordcounter-maintenance")]
#[command(about = "Maintenance tasks for the word counter backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Count words in documents and update the database
    CountWords {
        /// Recount all documents, even if already counted
        #[arg(long)]
        force: bool,
        /// Maximum total number of documents to process (0 = no cap)
        #[arg(long, default_value_t = 0)]
        limit: i64,
        /// Process only these pages, separated by "|"
        #[arg(long)]
        pages: Option<String>,
        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove orphaned or invalid word count entries
    PurgeOrphaned {
        /// Maximum number of rows to delete per batch
        #[arg(long, default_value_t = 1000)]
        limit: i64,
        /// Show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let app_config = config::init_config().map_err(|e| anyhow::anyhow!(e))?.read().clone();
    let backend = CacheBackend::from_name(&app_config.cache.backend)?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| app_config.get_database_url());
    let pool = db::connect(&database_url).await?;
    db::run_migrations(&pool).await?;

    let store = CountStore::new(pool.clone());
    let aggregates = Arc::new(AggregateCache::new(
        backend.build(&pool),
        Duration::from_secs(app_config.cache.ttl_seconds),
    ));

    let progress = |msg: &str| println!("{}", msg);

    match cli.command {
        Command::CountWords {
            force,
            limit,
            pages,
            dry_run,
        } => {
            let pages = pages.map(|raw| {
                raw.split('|')
                    .map(|title| title.trim().to_string())
                    .filter(|title| !title.is_empty())
                    .collect::<Vec<_>>()
            });

            let mut total_processed: u64 = 0;
            let mut total_errors: u64 = 0;
            let mut offset: i64 = 0;

            loop {
                // Shrink the batch when approaching the total cap / 接近总上限时收缩批量
                let mut batch_limit = BATCH_SIZE;
                if limit > 0 {
                    let remaining = limit - (total_processed + total_errors) as i64;
                    if remaining <= 0 {
                        break;
                    }
                    batch_limit = BATCH_SIZE.min(remaining);
                }

                let options = CountTaskOptions {
                    force,
                    limit: batch_limit,
                    offset,
                    pages: pages.clone(),
                    dry_run,
                };

                let result = run_count_task(&store, &aggregates, &options, &progress).await?;
                total_processed += result.processed;
                total_errors += result.errors;

                let batch_total = result.processed + result.errors;

                // Explicit pages are a single pass; dry runs never mutate,
                // so refetching would return the same batch forever.
                if pages.is_some() || dry_run {
                    break;
                }

                // A short batch means the scan is exhausted / 批次不满说明已扫完
                if (batch_total as i64) < batch_limit {
                    break;
                }

                offset += batch_limit;

                println!("Processed {} entries so far.", total_processed);
                println!("Waiting for replication ...");
                tokio::time::sleep(BATCH_PAUSE).await;
            }

            println!("=== Summary ===");
            println!("Total processed: {} entries.", total_processed);
            println!("Total errors: {} entries.", total_errors);

            if total_errors > 0 {
                std::process::exit(1);
            }
        }
        Command::PurgeOrphaned { limit, dry_run } => {
            let mut total_deleted: u64 = 0;

            loop {
                let options = PurgeTaskOptions { limit, dry_run };
                let result = run_purge_task(&store, &aggregates, &options, &progress).await?;
                total_deleted += result.deleted;

                // 演练模式不删除，重复查询会得到同一批
                if dry_run {
                    break;
                }

                // Deleting a full batch means more orphans likely remain
                if (result.deleted as i64) < limit {
                    break;
                }

                tokio::time::sleep(BATCH_PAUSE).await;
            }

            println!("=== Summary ===");
            println!(
                "{} {} orphaned entries in total.",
                if dry_run { "Would delete" } else { "Deleted" },
                total_deleted
            );
        }
    }

    Ok(())
}
