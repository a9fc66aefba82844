//! Read-only word count query endpoints / 词数查询接口
//!
//! The rendering path behind these handlers must never fail for a
//! missing or unqualified document, so lookups degrade to 0 and only
//! malformed requests produce error codes.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use wordcounter_backend::config;
use wordcounter_backend::counter::query;

use crate::api::{ApiResponse, ERR_MULTI_METHODS, ERR_NO_PAGE_SPECIFIED};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TotalsResponse {
    pub total_words: i64,
    pub total_documents: i64,
    pub pending_count: i64,
    pub average_words: i64,
    pub computed_at: String,
}

/// GET /api/wordcount/totals - 站点级聚合
pub async fn get_totals(State(state): State<Arc<AppState>>) -> Json<ApiResponse<TotalsResponse>> {
    match query::totals(&state.store, &state.aggregates).await {
        Ok(snapshot) => Json(ApiResponse::success(TotalsResponse {
            total_words: snapshot.total_words,
            total_documents: snapshot.total_documents,
            pending_count: snapshot.pending_count,
            average_words: snapshot.average_words(),
            computed_at: snapshot.computed_at.to_rfc3339(),
        })),
        Err(e) => {
            tracing::error!("Failed to compute totals: {}", e);
            Json(ApiResponse::error(&format!("获取聚合统计失败: {}", e)))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageWordsQuery {
    /// Comma-separated document ids / 逗号分隔的文档ID
    pub ids: Option<String>,
    /// Pipe-separated titles / 竖线分隔的标题
    pub titles: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PageWordsItem {
    pub doc_id: i64,
    pub title: String,
    pub namespace: i64,
    pub word_count: i64,
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct PageWordsResponse {
    pub results: Vec<PageWordsItem>,
    pub count: usize,
    pub total_words: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// GET /api/wordcount/page - 按ID或标题查询词数
pub async fn get_page_words(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageWordsQuery>,
) -> Json<ApiResponse<PageWordsResponse>> {
    let has_ids = params.ids.as_deref().map(|s| !s.is_empty()).unwrap_or(false);
    let has_titles = params.titles.as_deref().map(|s| !s.is_empty()).unwrap_or(false);

    // Exactly one lookup method / 只允许一种查询方式
    if !has_ids && !has_titles {
        return Json(ApiResponse::error_code(
            ERR_NO_PAGE_SPECIFIED,
            "no-page-specified: provide ids or titles",
        ));
    }
    if has_ids && has_titles {
        return Json(ApiResponse::error_code(
            ERR_MULTI_METHODS,
            "multi-methods: provide either ids or titles, not both",
        ));
    }

    let namespaces = config::config().counter.supported_namespaces;
    let mut warnings = Vec::new();
    let mut documents = Vec::new();

    if has_ids {
        for raw in params.ids.as_deref().unwrap_or("").split(',') {
            let raw = raw.trim();
            let Ok(doc_id) = raw.parse::<i64>() else {
                warnings.push(format!("invalid-id: {}", raw));
                continue;
            };
            match state.store.get_document(doc_id).await {
                Ok(Some(doc)) => documents.push(doc),
                _ => warnings.push(format!("invalid-id: {}", doc_id)),
            }
        }
    } else {
        for title in params.titles.as_deref().unwrap_or("").split('|') {
            let title = title.trim();
            if title.is_empty() {
                continue;
            }
            match state.store.get_document_by_title(title).await {
                Ok(Some(doc)) => documents.push(doc),
                _ => warnings.push(format!("invalid-title: {}", title)),
            }
        }
    }

    let mut results = Vec::new();
    let mut total_words = 0;

    for doc in documents {
        if !namespaces.contains(&doc.namespace) {
            warnings.push(format!("unsupported-namespace: {}", doc.title));
            continue;
        }

        let word_count = query::count_for(&state.store, doc.doc_id).await;
        total_words += word_count;

        results.push(PageWordsItem {
            doc_id: doc.doc_id,
            title: doc.title,
            namespace: doc.namespace,
            word_count,
            exists: word_count > 0,
        });
    }

    let count = results.len();
    Json(ApiResponse::success(PageWordsResponse {
        results,
        count,
        total_words,
        warnings,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RankedQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RankedResponse {
    pub results: Vec<RankedItem>,
    pub count: usize,
    pub limit: i64,
    pub offset: i64,
    pub sort: String,
}

#[derive(Debug, Serialize)]
pub struct RankedItem {
    pub doc_id: i64,
    pub title: String,
    pub namespace: i64,
    pub word_count: i64,
}

/// GET /api/wordcount/pages - 按词数排序的文档列表
pub async fn get_ranked_pages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RankedQuery>,
) -> Json<ApiResponse<RankedResponse>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let offset = params.offset.unwrap_or(0).max(0);
    let sort = params.sort.unwrap_or_else(|| "desc".to_string());
    let descending = sort != "asc";

    match query::ranked_documents(&state.store, limit, offset, descending).await {
        Ok(rows) => {
            let results: Vec<RankedItem> = rows
                .into_iter()
                .map(|row| RankedItem {
                    doc_id: row.doc_id,
                    title: row.title,
                    namespace: row.namespace,
                    word_count: row.word_count,
                })
                .collect();
            let count = results.len();

            Json(ApiResponse::success(RankedResponse {
                results,
                count,
                limit,
                offset,
                sort: if descending { "desc".to_string() } else { "asc".to_string() },
            }))
        }
        Err(e) => {
            tracing::error!("Failed to list ranked pages: {}", e);
            Json(ApiResponse::error(&format!("获取排行列表失败: {}", e)))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UncountedQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UncountedResponse {
    pub results: Vec<UncountedItem>,
    pub count: usize,
    pub limit: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct UncountedItem {
    pub doc_id: i64,
    pub title: String,
    pub namespace: i64,
}

/// GET /api/wordcount/uncounted - 尚未统计的文档列表
pub async fn get_uncounted_pages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UncountedQuery>,
) -> Json<ApiResponse<UncountedResponse>> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let namespaces = config::config().counter.supported_namespaces;

    let rows = match state.store.uncounted(&namespaces, limit).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Failed to list uncounted pages: {}", e);
            return Json(ApiResponse::error(&format!("获取待统计列表失败: {}", e)));
        }
    };

    let total = state.store.needing_count(&namespaces).await.unwrap_or(0);

    let results: Vec<UncountedItem> = rows
        .into_iter()
        .map(|row| UncountedItem {
            doc_id: row.doc_id,
            title: row.title,
            namespace: row.namespace,
        })
        .collect();
    let count = results.len();

    Json(ApiResponse::success(UncountedResponse {
        results,
        count,
        limit,
        total,
    }))
}
