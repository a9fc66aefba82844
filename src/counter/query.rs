//! Read facade - cache-first lookups for rendering and API callers / 查询门面
//!
//! Reads on this path never fail outward: a missing or unqualified
//! document reads as 0 words, and totals fall back to an on-demand
//! recomputation. / 读路径只降级，不抛错

use chrono::Utc;

use crate::config;
use crate::counter::cache::AggregateCache;
use crate::counter::error::Result;
use crate::counter::store::CountStore;
use crate::models::{AggregateSnapshot, RankedDocument};

/// Word count for one document; 0 for missing, unqualified or uncounted
/// documents ("zero words" and "not tracked" are deliberately not
/// distinguished here) / 单文档词数，不存在时返回0
pub async fn count_for(store: &CountStore, doc_id: i64) -> i64 {
    let namespaces = config::config().counter.supported_namespaces;

    match store.get_document(doc_id).await {
        Ok(Some(doc)) if doc.qualifies(&namespaces) => store
            .get(doc_id)
            .await
            .ok()
            .flatten()
            .map(|entry| entry.word_count)
            .unwrap_or(0),
        _ => 0,
    }
}

/// Word count for one document by title / 按标题查询词数
pub async fn count_for_title(store: &CountStore, title: &str) -> i64 {
    match store.get_document_by_title(title).await {
        Ok(Some(doc)) => count_for(store, doc.doc_id).await,
        _ => 0,
    }
}

/// Qualifying documents ranked by word count; scans the count store
/// directly, this moving view is not worth caching whole / 词数排行
pub async fn ranked_documents(
    store: &CountStore,
    limit: i64,
    offset: i64,
    descending: bool,
) -> Result<Vec<RankedDocument>> {
    let namespaces = config::config().counter.supported_namespaces;
    store.ranked(&namespaces, limit, offset, descending).await
}

/// Sitewide totals through the aggregate cache / 站点级聚合
pub async fn totals(store: &CountStore, aggregates: &AggregateCache) -> Result<AggregateSnapshot> {
    let namespaces = config::config().counter.supported_namespaces;

    aggregates
        .get_totals(|| async move {
            let (total_words, total_documents) = store.sum_and_count(&namespaces).await?;
            let pending_count = store.needing_count(&namespaces).await?;

            Ok(AggregateSnapshot {
                total_words,
                total_documents,
                pending_count,
                computed_at: Utc::now(),
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::cache::MemoryCache;
    use crate::counter::store::tests::{doc, test_store};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_aggregates() -> AggregateCache {
        AggregateCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_count_for_defaults_to_zero() {
        let store = test_store().await;

        // 不存在的文档
        assert_eq!(count_for(&store, 404).await, 0);

        // 存在但尚未统计
        store.upsert_document(&doc(1, "Fresh", "x")).await.unwrap();
        assert_eq!(count_for(&store, 1).await, 0);

        // 已统计
        store.upsert(1, 12).await.unwrap();
        assert_eq!(count_for(&store, 1).await, 12);
        assert_eq!(count_for_title(&store, "Fresh").await, 12);

        // 重定向不再参与统计，即使条目还在
        let mut redirect = doc(1, "Fresh", "x");
        redirect.is_redirect = true;
        store.upsert_document(&redirect).await.unwrap();
        assert_eq!(count_for(&store, 1).await, 0);
    }

    #[tokio::test]
    async fn test_totals_cached_until_invalidated() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        for (id, count) in [(1, 10), (2, 20), (3, 30)] {
            store.upsert_document(&doc(id, &format!("P{}", id), "x")).await.unwrap();
            store.upsert(id, count).await.unwrap();
        }

        let snapshot = totals(&store, &aggregates).await.unwrap();
        assert_eq!(snapshot.total_words, 60);
        assert_eq!(snapshot.total_documents, 3);
        assert_eq!(snapshot.pending_count, 0);

        // 未失效前返回过期值
        store.upsert(1, 15).await.unwrap();
        let stale = totals(&store, &aggregates).await.unwrap();
        assert_eq!(stale.total_words, 60);

        // 显式失效后重算
        aggregates.invalidate_all().await;
        let fresh = totals(&store, &aggregates).await.unwrap();
        assert_eq!(fresh.total_words, 65);
    }
}
