//! Count store - durable per-document word counts / 词数存储
//!
//! Owns the word_counts table; the save-event handler and the
//! reconciliation tasks are its only writers. Per-key upserts are
//! atomic, different keys are fully independent, no cross-row
//! transactions. / 单行原子写入，行间互不依赖
//!
//! The documents table is read here for the qualification joins but is
//! only ever written by the lifecycle-event handlers.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::counter::error::Result;
use crate::models::{CountEntry, Document, RankedDocument, SavedDocument, UncountedDocument};

/// Content models the tokenizer accepts / 可统计的内容模型
const COUNTABLE_MODELS: [&str; 2] = ["wikitext", "text"];

/// Build a "?, ?, ?" placeholder list / 构建占位符列表
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Qualification filter over the documents table (alias d) / 文档过滤条件
fn qualifying_clause(namespace_count: usize) -> String {
    format!(
        "d.namespace IN ({}) AND d.is_redirect = 0 AND d.content_model IN ({})",
        placeholders(namespace_count),
        placeholders(COUNTABLE_MODELS.len())
    )
}

#[derive(Clone)]
pub struct CountStore {
    db: SqlitePool,
}

impl CountStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Insert or update the word count for a document / 插入或更新词数
    ///
    /// Last write wins on wc_updated; atomic per key.
    pub async fn upsert(&self, doc_id: i64, word_count: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO word_counts (wc_doc_id, wc_word_count, wc_updated)
            VALUES (?, ?, ?)
            ON CONFLICT(wc_doc_id) DO UPDATE SET
                wc_word_count = excluded.wc_word_count,
                wc_updated = excluded.wc_updated
            "#,
        )
        .bind(doc_id)
        .bind(word_count)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Point lookup / 单点查询
    pub async fn get(&self, doc_id: i64) -> Result<Option<CountEntry>> {
        let entry = sqlx::query_as::<_, CountEntry>(
            "SELECT wc_doc_id AS doc_id, wc_word_count AS word_count, wc_updated AS updated
             FROM word_counts WHERE wc_doc_id = ?",
        )
        .bind(doc_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(entry)
    }

    /// Delete one entry; deleting a missing key is not an error / 删除条目
    pub async fn delete(&self, doc_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM word_counts WHERE wc_doc_id = ?")
            .bind(doc_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Delete a batch of entries in one statement / 批量删除
    pub async fn delete_many(&self, doc_ids: &[i64]) -> Result<()> {
        if doc_ids.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM word_counts WHERE wc_doc_id IN ({})",
            placeholders(doc_ids.len())
        );

        let mut query = sqlx::query(&sql);
        for doc_id in doc_ids {
            query = query.bind(doc_id);
        }
        query.execute(&self.db).await?;

        Ok(())
    }

    /// Qualifying documents ordered by word count, doc id as tie-break
    /// so pagination stays deterministic across equal counts / 按词数排序
    pub async fn ranked(
        &self,
        namespaces: &[i64],
        limit: i64,
        offset: i64,
        descending: bool,
    ) -> Result<Vec<RankedDocument>> {
        if namespaces.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT d.doc_id, d.title, d.namespace, w.wc_word_count AS word_count
             FROM word_counts w
             INNER JOIN documents d ON d.doc_id = w.wc_doc_id
             WHERE {}
             ORDER BY w.wc_word_count {}, d.doc_id ASC
             LIMIT ? OFFSET ?",
            qualifying_clause(namespaces.len()),
            if descending { "DESC" } else { "ASC" }
        );

        let mut query = sqlx::query_as::<_, RankedDocument>(&sql);
        for ns in namespaces {
            query = query.bind(ns);
        }
        for model in COUNTABLE_MODELS {
            query = query.bind(model);
        }
        let rows = query.bind(limit).bind(offset).fetch_all(&self.db).await?;

        Ok(rows)
    }

    /// Total words and documents over all qualifying entries; the
    /// aggregate cache's miss-path recomputation / 聚合统计
    pub async fn sum_and_count(&self, namespaces: &[i64]) -> Result<(i64, i64)> {
        if namespaces.is_empty() {
            return Ok((0, 0));
        }

        let sql = format!(
            "SELECT COALESCE(SUM(w.wc_word_count), 0), COUNT(*)
             FROM word_counts w
             INNER JOIN documents d ON d.doc_id = w.wc_doc_id
             WHERE {}",
            qualifying_clause(namespaces.len())
        );

        let mut query = sqlx::query_as::<_, (i64, i64)>(&sql);
        for ns in namespaces {
            query = query.bind(ns);
        }
        for model in COUNTABLE_MODELS {
            query = query.bind(model);
        }
        let totals = query.fetch_one(&self.db).await?;

        Ok(totals)
    }

    /// Number of qualifying documents without a count entry / 待统计文档数
    pub async fn needing_count(&self, namespaces: &[i64]) -> Result<i64> {
        if namespaces.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "SELECT COUNT(*)
             FROM documents d
             LEFT JOIN word_counts w ON w.wc_doc_id = d.doc_id
             WHERE {} AND w.wc_doc_id IS NULL",
            qualifying_clause(namespaces.len())
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for ns in namespaces {
            query = query.bind(ns);
        }
        for model in COUNTABLE_MODELS {
            query = query.bind(model);
        }
        let count = query.fetch_one(&self.db).await?;

        Ok(count)
    }

    /// Qualifying documents without a count entry, ordered by doc id
    /// for resumable pagination / 尚未统计的文档
    pub async fn uncounted(&self, namespaces: &[i64], limit: i64) -> Result<Vec<UncountedDocument>> {
        if namespaces.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT d.doc_id, d.title, d.namespace
             FROM documents d
             LEFT JOIN word_counts w ON w.wc_doc_id = d.doc_id
             WHERE {} AND w.wc_doc_id IS NULL
             ORDER BY d.doc_id
             LIMIT ?",
            qualifying_clause(namespaces.len())
        );

        let mut query = sqlx::query_as::<_, UncountedDocument>(&sql);
        for ns in namespaces {
            query = query.bind(ns);
        }
        for model in COUNTABLE_MODELS {
            query = query.bind(model);
        }
        let rows = query.bind(limit).fetch_all(&self.db).await?;

        Ok(rows)
    }

    /// All qualifying documents, for forced recounting / 全部符合条件的文档
    pub async fn all_supported(
        &self,
        namespaces: &[i64],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UncountedDocument>> {
        if namespaces.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT d.doc_id, d.title, d.namespace
             FROM documents d
             WHERE {}
             ORDER BY d.doc_id
             LIMIT ? OFFSET ?",
            qualifying_clause(namespaces.len())
        );

        let mut query = sqlx::query_as::<_, UncountedDocument>(&sql);
        for ns in namespaces {
            query = query.bind(ns);
        }
        for model in COUNTABLE_MODELS {
            query = query.bind(model);
        }
        let rows = query.bind(limit).bind(offset).fetch_all(&self.db).await?;

        Ok(rows)
    }

    /// Entries whose count predates the last document touch / 过期的词数条目
    pub async fn outdated(&self, namespaces: &[i64], limit: i64) -> Result<Vec<UncountedDocument>> {
        if namespaces.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT d.doc_id, d.title, d.namespace
             FROM word_counts w
             INNER JOIN documents d ON d.doc_id = w.wc_doc_id
             WHERE {} AND w.wc_updated < d.touched
             ORDER BY w.wc_doc_id
             LIMIT ?",
            qualifying_clause(namespaces.len())
        );

        let mut query = sqlx::query_as::<_, UncountedDocument>(&sql);
        for ns in namespaces {
            query = query.bind(ns);
        }
        for model in COUNTABLE_MODELS {
            query = query.bind(model);
        }
        let rows = query.bind(limit).fetch_all(&self.db).await?;

        Ok(rows)
    }

    /// Orphan class 1: entries with no document row at all / 无对应文档的条目
    pub async fn orphaned_missing(&self, limit: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT w.wc_doc_id
             FROM word_counts w
             LEFT JOIN documents d ON d.doc_id = w.wc_doc_id
             WHERE d.doc_id IS NULL
             ORDER BY w.wc_doc_id
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(ids)
    }

    /// Orphan class 2: entries whose document no longer qualifies
    /// (wrong namespace, redirect, unsupported content model) / 失效条目
    pub async fn orphaned_invalid(&self, namespaces: &[i64], limit: i64) -> Result<Vec<i64>> {
        let ns_clause = if namespaces.is_empty() {
            // 无合法命名空间时所有条目都视为失效
            "1 = 1".to_string()
        } else {
            format!("d.namespace NOT IN ({})", placeholders(namespaces.len()))
        };

        let sql = format!(
            "SELECT w.wc_doc_id
             FROM word_counts w
             INNER JOIN documents d ON d.doc_id = w.wc_doc_id
             WHERE {} OR d.is_redirect = 1 OR d.content_model NOT IN ({})
             ORDER BY w.wc_doc_id
             LIMIT ?",
            ns_clause,
            placeholders(COUNTABLE_MODELS.len())
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for ns in namespaces {
            query = query.bind(ns);
        }
        for model in COUNTABLE_MODELS {
            query = query.bind(model);
        }
        let ids = query.bind(limit).fetch_all(&self.db).await?;

        Ok(ids)
    }

    /// Fetch a document row by id / 按ID读取文档
    pub async fn get_document(&self, doc_id: i64) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(doc)
    }

    /// Fetch a document row by title / 按标题读取文档
    pub async fn get_document_by_title(&self, title: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE title = ?")
            .bind(title)
            .fetch_optional(&self.db)
            .await?;

        Ok(doc)
    }

    /// Upsert the document mirror row from a save event / 更新文档镜像行
    pub async fn upsert_document(&self, doc: &SavedDocument) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO documents (doc_id, title, namespace, is_redirect, content_model, content, touched)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(doc_id) DO UPDATE SET
                title = excluded.title,
                namespace = excluded.namespace,
                is_redirect = excluded.is_redirect,
                content_model = excluded.content_model,
                content = excluded.content,
                touched = excluded.touched
            "#,
        )
        .bind(doc.doc_id)
        .bind(&doc.title)
        .bind(doc.namespace)
        .bind(doc.is_redirect)
        .bind(&doc.content_model)
        .bind(&doc.content)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Remove the document mirror row / 删除文档镜像行
    pub async fn delete_document(&self, doc_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db;
    use crate::models::SavedDocument;
    use sqlx::sqlite::SqlitePoolOptions;

    /// In-memory pool for tests; single connection so every query sees
    /// the same database / 测试用内存数据库
    pub(crate) async fn test_store() -> CountStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        CountStore::new(pool)
    }

    pub(crate) fn doc(doc_id: i64, title: &str, content: &str) -> SavedDocument {
        SavedDocument {
            doc_id,
            title: title.to_string(),
            namespace: 0,
            is_redirect: false,
            content_model: "wikitext".to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = test_store().await;

        store.upsert(1, 10).await.unwrap();
        store.upsert(1, 10).await.unwrap();

        let entry = store.get(1).await.unwrap().unwrap();
        assert_eq!(entry.word_count, 10);

        // 覆盖写入取最新值
        store.upsert(1, 25).await.unwrap();
        assert_eq!(store.get(1).await.unwrap().unwrap().word_count, 25);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = test_store().await;
        store.delete(999).await.unwrap();
        store.delete_many(&[1, 2, 3]).await.unwrap();
        store.delete_many(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_ranked_order_and_tiebreak() {
        let store = test_store().await;
        for (id, count) in [(1, 20), (2, 10), (3, 20), (4, 30)] {
            store.upsert_document(&doc(id, &format!("Page {}", id), "x")).await.unwrap();
            store.upsert(id, count).await.unwrap();
        }

        let desc = store.ranked(&[0], 10, 0, true).await.unwrap();
        let ids: Vec<i64> = desc.iter().map(|r| r.doc_id).collect();
        // 相同词数按doc_id升序
        assert_eq!(ids, vec![4, 1, 3, 2]);

        let asc = store.ranked(&[0], 2, 1, false).await.unwrap();
        let ids: Vec<i64> = asc.iter().map(|r| r.doc_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_ranked_excludes_non_qualifying() {
        let store = test_store().await;
        store.upsert_document(&doc(1, "Normal", "x")).await.unwrap();
        store.upsert(1, 5).await.unwrap();

        let mut redirect = doc(2, "Redirect", "x");
        redirect.is_redirect = true;
        store.upsert_document(&redirect).await.unwrap();
        store.upsert(2, 50).await.unwrap();

        let mut wrong_ns = doc(3, "Talk page", "x");
        wrong_ns.namespace = 1;
        store.upsert_document(&wrong_ns).await.unwrap();
        store.upsert(3, 70).await.unwrap();

        let rows = store.ranked(&[0], 10, 0, true).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc_id, 1);

        let (words, docs) = store.sum_and_count(&[0]).await.unwrap();
        assert_eq!((words, docs), (5, 1));
    }

    #[tokio::test]
    async fn test_uncounted_anti_join() {
        let store = test_store().await;
        store.upsert_document(&doc(1, "Counted", "x")).await.unwrap();
        store.upsert(1, 3).await.unwrap();
        store.upsert_document(&doc(2, "Uncounted", "x")).await.unwrap();

        let rows = store.uncounted(&[0], 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc_id, 2);
        assert_eq!(store.needing_count(&[0]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_orphan_classes() {
        let store = test_store().await;

        // 类别1：文档已删除
        store.upsert(10, 100).await.unwrap();

        // 类别2：文档变为重定向
        let mut redirect = doc(11, "Now redirect", "x");
        redirect.is_redirect = true;
        store.upsert_document(&redirect).await.unwrap();
        store.upsert(11, 40).await.unwrap();

        // 正常条目不应被列出
        store.upsert_document(&doc(12, "Healthy", "x")).await.unwrap();
        store.upsert(12, 7).await.unwrap();

        assert_eq!(store.orphaned_missing(10).await.unwrap(), vec![10]);
        assert_eq!(store.orphaned_invalid(&[0], 10).await.unwrap(), vec![11]);
    }

    #[tokio::test]
    async fn test_sum_and_count_empty_namespaces() {
        let store = test_store().await;
        assert_eq!(store.sum_and_count(&[]).await.unwrap(), (0, 0));
        assert!(store.ranked(&[], 10, 0, true).await.unwrap().is_empty());
    }
}
