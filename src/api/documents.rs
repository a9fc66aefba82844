//! Document lifecycle event ingestion / 文档生命周期事件接入
//!
//! The host CMS posts save and delete events here. Handlers are
//! idempotent, and every qualifying event gives the scheduler a cheap
//! chance to trigger background reconciliation.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use wordcounter_backend::counter::events;
use wordcounter_backend::models::SavedDocument;

use crate::api::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SaveDocumentResponse {
    pub doc_id: i64,
    pub counted: bool,
    pub word_count: Option<i64>,
}

/// POST /api/documents/save - 文档保存事件
pub async fn save_document(
    State(state): State<Arc<AppState>>,
    Json(event): Json<SavedDocument>,
) -> Json<ApiResponse<SaveDocumentResponse>> {
    let result = events::on_document_saved(&state.store, &state.aggregates, &event).await;

    // 无论统计结果如何都给调度器一次触发机会
    state.scheduler.maybe_schedule().await;

    match result {
        Ok(word_count) => Json(ApiResponse::success(SaveDocumentResponse {
            doc_id: event.doc_id,
            counted: word_count.is_some(),
            word_count,
        })),
        Err(e) => {
            tracing::error!("Failed to handle save event for document {}: {}", event.doc_id, e);
            Json(ApiResponse::error(&format!("处理保存事件失败: {}", e)))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteDocumentRequest {
    pub doc_id: i64,
}

/// POST /api/documents/delete - 文档删除事件
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteDocumentRequest>,
) -> Json<ApiResponse<()>> {
    let result = events::on_document_deleted(&state.store, &state.aggregates, request.doc_id).await;

    state.scheduler.maybe_schedule().await;

    match result {
        Ok(()) => Json(ApiResponse::success(())),
        Err(e) => {
            tracing::error!(
                "Failed to handle delete event for document {}: {}",
                request.doc_id,
                e
            );
            Json(ApiResponse::error(&format!("处理删除事件失败: {}", e)))
        }
    }
}
