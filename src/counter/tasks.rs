//! Reconciliation tasks - batch counting and orphan cleanup / 对账任务
//!
//! Both tasks run off the interactive path, process bounded batches and
//! re-check every document at process time, so acting on a stale batch
//! is impossible. Per-document failures are counted, never fatal; only
//! a failed batch fetch aborts the run. / 单文档失败只计数，不中断批次
//!
//! Dry runs perform every read and compute step but skip all writes,
//! reporting the same counts a real run would.

use crate::config;
use crate::counter::cache::AggregateCache;
use crate::counter::error::Result;
use crate::counter::store::CountStore;
use crate::counter::tokenizer::{self, CountOptions};

/// Progress sink; the CLI prints, the service logs / 进度输出回调
pub type Progress = dyn Fn(&str) + Send + Sync;

/// Options for a word counting run / 统计任务选项
#[derive(Debug, Clone)]
pub struct CountTaskOptions {
    /// Recount all qualifying documents instead of only uncounted ones
    pub force: bool,
    /// Batch size for this run / 单次批量上限
    pub limit: i64,
    /// Scan offset, advanced by the maintenance driver across force
    /// batches within one invocation / 强制模式下的扫描偏移
    pub offset: i64,
    /// Process exactly these titles, ignoring mode and batch fetch
    pub pages: Option<Vec<String>>,
    /// Read and compute only, write nothing / 只读演练
    pub dry_run: bool,
}

impl Default for CountTaskOptions {
    fn default() -> Self {
        Self {
            force: false,
            limit: 100,
            offset: 0,
            pages: None,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountTaskResult {
    pub processed: u64,
    pub errors: u64,
}

/// Options for an orphan purge run / 清理任务选项
#[derive(Debug, Clone)]
pub struct PurgeTaskOptions {
    pub limit: i64,
    pub dry_run: bool,
}

impl Default for PurgeTaskOptions {
    fn default() -> Self {
        Self {
            limit: 1000,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeTaskResult {
    pub deleted: u64,
}

/// Run one bounded word counting batch / 执行一次统计批次
pub async fn run_count_task(
    store: &CountStore,
    aggregates: &AggregateCache,
    options: &CountTaskOptions,
    progress: &Progress,
) -> Result<CountTaskResult> {
    progress("Starting word counting task.");
    if options.dry_run {
        progress("Dry-run mode is enabled.");
    }

    let config = config::config().counter;
    let namespaces = config.supported_namespaces.clone();
    let count_options = CountOptions::from_config(&config)?;

    let mut result = CountTaskResult::default();

    if let Some(pages) = &options.pages {
        // Explicit titles bypass the batch fetch / 指定页面时跳过批量扫描
        for title in pages {
            let document = match store.get_document_by_title(title.trim()).await {
                Ok(Some(doc)) => doc,
                Ok(None) => {
                    progress(&format!("Invalid page title: {}", title));
                    result.errors += 1;
                    continue;
                }
                Err(e) => {
                    progress(&format!("Error: could not resolve {}: {}", title, e));
                    result.errors += 1;
                    continue;
                }
            };

            if process_document(store, document.doc_id, &namespaces, &count_options, options.dry_run, progress).await {
                result.processed += 1;
            } else {
                result.errors += 1;
            }
        }
    } else {
        let batch = if options.force {
            store.all_supported(&namespaces, options.limit, options.offset).await?
        } else {
            store.uncounted(&namespaces, options.limit).await?
        };

        if batch.is_empty() {
            progress("No pages to process.");
        }

        for row in &batch {
            if process_document(store, row.doc_id, &namespaces, &count_options, options.dry_run, progress).await {
                result.processed += 1;
            } else {
                result.errors += 1;
            }
        }

        // Spend any remaining budget refreshing stale entries / 剩余额度刷新过期条目
        if !options.force {
            let remaining = options.limit - (result.processed + result.errors) as i64;
            if remaining > 0 {
                for row in &store.outdated(&namespaces, remaining).await? {
                    if process_document(store, row.doc_id, &namespaces, &count_options, options.dry_run, progress).await {
                        result.processed += 1;
                    } else {
                        result.errors += 1;
                    }
                }
            }
        }
    }

    if result.processed > 0 && !options.dry_run {
        aggregates.invalidate_all().await;
        progress("Cache cleared.");
    }

    progress("Word counting task finished.");

    Ok(result)
}

/// Re-check, count and persist a single document / 处理单个文档
///
/// The fresh fetch at process time keeps the task safe against batch
/// members that changed after the scan.
async fn process_document(
    store: &CountStore,
    doc_id: i64,
    namespaces: &[i64],
    count_options: &CountOptions,
    dry_run: bool,
    progress: &Progress,
) -> bool {
    let document = match store.get_document(doc_id).await {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            progress(&format!("Skipping: document {} (does not exist)", doc_id));
            return false;
        }
        Err(e) => {
            progress(&format!("Error: could not load document {}: {}", doc_id, e));
            return false;
        }
    };

    if document.is_redirect {
        progress(&format!("Skipping: {} (is a redirect)", document.title));
        return false;
    }

    if !namespaces.contains(&document.namespace) {
        progress(&format!("Skipping: {} (unsupported namespace)", document.title));
        return false;
    }

    let word_count =
        match tokenizer::count_words(&document.content, &document.content_model, count_options) {
            Ok(count) => count,
            Err(e) => {
                progress(&format!("Error: could not count words for {}: {}", document.title, e));
                return false;
            }
        };

    if !dry_run {
        if let Err(e) = store.upsert(document.doc_id, word_count).await {
            progress(&format!("Error: could not store count for {}: {}", document.title, e));
            return false;
        }
    }

    progress(&format!(
        "{} {} ({} words)",
        if dry_run { "Would process" } else { "Processed" },
        document.title,
        word_count
    ));

    true
}

/// Run one bounded orphan purge batch / 执行一次清理批次
///
/// Checks both orphan classes within the limit budget: entries with no
/// document row first, then entries whose document no longer
/// qualifies. Each class is deleted with a single bulk statement.
pub async fn run_purge_task(
    store: &CountStore,
    aggregates: &AggregateCache,
    options: &PurgeTaskOptions,
    progress: &Progress,
) -> Result<PurgeTaskResult> {
    progress("Starting orphaned word count cleanup.");
    if options.dry_run {
        progress("Dry-run mode is enabled.");
    }

    let namespaces = config::config().counter.supported_namespaces;

    let orphaned = store.orphaned_missing(options.limit).await?;
    if !options.dry_run {
        store.delete_many(&orphaned).await?;
    }
    let mut deleted = orphaned.len() as u64;

    // 类别1未用完额度时再检查失效条目
    if (deleted as i64) < options.limit {
        let invalid = store
            .orphaned_invalid(&namespaces, options.limit - deleted as i64)
            .await?;
        if !options.dry_run {
            store.delete_many(&invalid).await?;
        }
        deleted += invalid.len() as u64;
    }

    progress(&format!(
        "{} {} orphaned entries.",
        if options.dry_run { "Would delete" } else { "Deleted" },
        deleted
    ));

    if deleted > 0 && !options.dry_run {
        aggregates.invalidate_all().await;
        progress("Cache cleared.");
    }

    progress("Orphaned word count cleanup finished.");

    Ok(PurgeTaskResult { deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::cache::MemoryCache;
    use crate::counter::query;
    use crate::counter::store::tests::{doc, test_store};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_aggregates() -> AggregateCache {
        AggregateCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(3600))
    }

    fn silent() -> impl Fn(&str) + Send + Sync {
        |_msg: &str| {}
    }

    #[tokio::test]
    async fn test_count_task_counts_uncounted() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        store.upsert_document(&doc(1, "One", "alpha beta")).await.unwrap();
        store.upsert_document(&doc(2, "Two", "gamma delta epsilon")).await.unwrap();

        let result = run_count_task(&store, &aggregates, &CountTaskOptions::default(), &silent())
            .await
            .unwrap();
        assert_eq!(result.processed, 2);
        assert_eq!(result.errors, 0);

        assert_eq!(store.get(1).await.unwrap().unwrap().word_count, 2);
        assert_eq!(store.get(2).await.unwrap().unwrap().word_count, 3);

        // 对账后聚合一致
        let snapshot = query::totals(&store, &aggregates).await.unwrap();
        assert_eq!(snapshot.total_words, 5);
        assert_eq!(snapshot.total_documents, 2);
        assert_eq!(snapshot.pending_count, 0);
    }

    #[tokio::test]
    async fn test_count_task_dry_run_writes_nothing() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        store.upsert_document(&doc(1, "One", "alpha beta")).await.unwrap();

        let options = CountTaskOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = run_count_task(&store, &aggregates, &options, &silent()).await.unwrap();
        assert_eq!(result.processed, 1);
        assert!(store.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_task_skips_disqualified_batch_member() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        store.upsert_document(&doc(1, "Good", "some words")).await.unwrap();
        let mut redirect = doc(2, "Bad", "x");
        redirect.is_redirect = true;
        store.upsert_document(&redirect).await.unwrap();

        // 指定页面处理：一个成功一个跳过
        let options = CountTaskOptions {
            pages: Some(vec!["Good".to_string(), "Bad".to_string(), "Missing".to_string()]),
            ..Default::default()
        };
        let result = run_count_task(&store, &aggregates, &options, &silent()).await.unwrap();
        assert_eq!(result.processed, 1);
        assert_eq!(result.errors, 2);
    }

    #[tokio::test]
    async fn test_count_task_force_respects_limit_and_offset() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        for id in 1..=5 {
            store.upsert_document(&doc(id, &format!("P{}", id), "one two three")).await.unwrap();
        }

        let options = CountTaskOptions {
            force: true,
            limit: 2,
            offset: 0,
            ..Default::default()
        };
        let first = run_count_task(&store, &aggregates, &options, &silent()).await.unwrap();
        assert_eq!(first.processed, 2);

        let options = CountTaskOptions {
            force: true,
            limit: 2,
            offset: 2,
            ..Default::default()
        };
        let second = run_count_task(&store, &aggregates, &options, &silent()).await.unwrap();
        assert_eq!(second.processed, 2);

        assert!(store.get(3).await.unwrap().is_some());
        assert!(store.get(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_removes_only_orphans() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        // 健康条目
        store.upsert_document(&doc(1, "Healthy", "x")).await.unwrap();
        store.upsert(1, 5).await.unwrap();
        // 文档已删除的孤立条目
        store.upsert(2, 10).await.unwrap();
        // 变成重定向的失效条目
        let mut redirect = doc(3, "Redirect", "x");
        redirect.is_redirect = true;
        store.upsert_document(&redirect).await.unwrap();
        store.upsert(3, 20).await.unwrap();

        // 先演练：报告相同数量但不删除
        let dry = run_purge_task(
            &store,
            &aggregates,
            &PurgeTaskOptions { limit: 10, dry_run: true },
            &silent(),
        )
        .await
        .unwrap();
        assert_eq!(dry.deleted, 2);
        assert!(store.get(2).await.unwrap().is_some());

        let real = run_purge_task(
            &store,
            &aggregates,
            &PurgeTaskOptions { limit: 10, dry_run: false },
            &silent(),
        )
        .await
        .unwrap();
        assert_eq!(real.deleted, 2);
        assert!(store.get(1).await.unwrap().is_some());
        assert!(store.get(2).await.unwrap().is_none());
        assert!(store.get(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_budget_spent_on_missing_first() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        store.upsert(10, 1).await.unwrap();
        store.upsert(11, 1).await.unwrap();
        let mut redirect = doc(12, "R", "x");
        redirect.is_redirect = true;
        store.upsert_document(&redirect).await.unwrap();
        store.upsert(12, 1).await.unwrap();

        // limit 2 只够删除类别1，类别2留给下一轮
        let result = run_purge_task(
            &store,
            &aggregates,
            &PurgeTaskOptions { limit: 2, dry_run: false },
            &silent(),
        )
        .await
        .unwrap();
        assert_eq!(result.deleted, 2);
        assert!(store.get(12).await.unwrap().is_some());
    }
}
