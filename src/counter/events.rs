//! Document lifecycle event handlers / 文档生命周期事件处理
//!
//! Both handlers are idempotent triggers: replaying the same event must
//! not corrupt state. They run on the interactive path, so they hold no
//! in-process lock across storage calls. / 事件可重放，处理无锁

use crate::config;
use crate::counter::cache::AggregateCache;
use crate::counter::error::{CounterError, Result};
use crate::counter::store::CountStore;
use crate::counter::tokenizer::{self, CountOptions};
use crate::models::SavedDocument;

/// Handle a document save / 处理文档保存事件
///
/// Mirrors the document row, counts the new text when synchronous
/// counting is enabled, and invalidates the aggregates on any count
/// change. Returns the stored word count, None when counting was
/// deferred to the reconciliation job.
pub async fn on_document_saved(
    store: &CountStore,
    aggregates: &AggregateCache,
    event: &SavedDocument,
) -> Result<Option<i64>> {
    if event.doc_id <= 0 {
        return Err(CounterError::InvalidIdentity(event.doc_id.to_string()));
    }

    store.upsert_document(event).await?;

    let config = config::config().counter;

    if !config.count_on_save {
        // 高负载站点关闭同步统计，交给后台任务
        tracing::debug!("Deferred counting for document {}", event.doc_id);
        return Ok(None);
    }

    let qualifies = !event.is_redirect && config.supported_namespaces.contains(&event.namespace);

    if qualifies {
        let options = CountOptions::from_config(&config)?;

        match tokenizer::count_words(&event.content, &event.content_model, &options) {
            Ok(word_count) => {
                store.upsert(event.doc_id, word_count).await?;
                aggregates.invalidate_all().await;
                tracing::debug!(
                    "Counted document {} ({} words)",
                    event.doc_id,
                    word_count
                );
                return Ok(Some(word_count));
            }
            // 内容模型不可统计：不重试，走清理分支
            Err(CounterError::Unsupported(model)) => {
                tracing::info!(
                    "Could not count words for document {} (content model <{}>)",
                    event.doc_id,
                    model
                );
            }
            Err(e) => return Err(e),
        }
    }

    // The document stopped qualifying; drop any stale entry so reads
    // stay consistent with the invariant.
    if store.get(event.doc_id).await?.is_some() {
        store.delete(event.doc_id).await?;
        aggregates.invalidate_all().await;
    }

    Ok(None)
}

/// Handle a document deletion / 处理文档删除事件
pub async fn on_document_deleted(
    store: &CountStore,
    aggregates: &AggregateCache,
    doc_id: i64,
) -> Result<()> {
    if doc_id <= 0 {
        return Err(CounterError::InvalidIdentity(doc_id.to_string()));
    }

    store.delete_document(doc_id).await?;
    store.delete(doc_id).await?;
    aggregates.invalidate_all().await;

    tracing::debug!("Removed word count for deleted document {}", doc_id);

    Ok(())
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

    #[tokio::test]
    async fn test_save_then_delete_scenario() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        let event = doc(1, "D1", "Hello world");
        let counted = on_document_saved(&store, &aggregates, &event).await.unwrap();
        assert_eq!(counted, Some(2));
        assert_eq!(query::count_for(&store, 1).await, 2);

        on_document_deleted(&store, &aggregates, 1).await.unwrap();
        assert_eq!(query::count_for(&store, 1).await, 0);
        assert!(store.get(1).await.unwrap().is_none());

        // 重复删除同一文档不报错
        on_document_deleted(&store, &aggregates, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_identity_is_rejected() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        let err = on_document_saved(&store, &aggregates, &doc(0, "Bad", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CounterError::InvalidIdentity(_)));

        let err = on_document_deleted(&store, &aggregates, -3).await.unwrap_err();
        assert!(matches!(err, CounterError::InvalidIdentity(_)));
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        let event = doc(7, "Twice", "same words here");
        on_document_saved(&store, &aggregates, &event).await.unwrap();
        on_document_saved(&store, &aggregates, &event).await.unwrap();

        // 一条记录，词数不累加
        let entry = store.get(7).await.unwrap().unwrap();
        assert_eq!(entry.word_count, 3);
        let (total, docs) = store.sum_and_count(&[0]).await.unwrap();
        assert_eq!((total, docs), (3, 1));
    }

    #[tokio::test]
    async fn test_save_as_redirect_drops_entry() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        on_document_saved(&store, &aggregates, &doc(3, "Page", "some text here now"))
            .await
            .unwrap();
        assert!(store.get(3).await.unwrap().is_some());

        let mut redirect = doc(3, "Page", "#REDIRECT [[Other]]");
        redirect.is_redirect = true;
        let counted = on_document_saved(&store, &aggregates, &redirect).await.unwrap();
        assert_eq!(counted, None);
        assert!(store.get(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_model_drops_entry() {
        let store = test_store().await;
        let aggregates = test_aggregates();

        on_document_saved(&store, &aggregates, &doc(4, "Module", "let x = 1"))
            .await
            .unwrap();
        assert!(store.get(4).await.unwrap().is_some());

        let mut module = doc(4, "Module", "let x = 1");
        module.content_model = "javascript".to_string();
        let counted = on_document_saved(&store, &aggregates, &module).await.unwrap();
        assert_eq!(counted, None);
        assert!(store.get(4).await.unwrap().is_none());
    }
}
