//! Maintenance endpoints - trigger reconciliation runs / 维护管理接口

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use wordcounter_backend::counter::tasks::{
    run_count_task, run_purge_task, CountTaskOptions, PurgeTaskOptions,
};

use crate::api::{ApiResponse, ERR_TASK_RUNNING};
use crate::state::{AppState, TaskProgress};

#[derive(Debug, Deserialize)]
pub struct RunCountRequest {
    #[serde(default)]
    pub force: bool,
    pub limit: Option<i64>,
    pub pages: Option<Vec<String>>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct RunCountResponse {
    pub processed: u64,
    pub errors: u64,
    pub dry_run: bool,
}

/// POST /api/admin/wordcount/count - 执行一次统计批次
pub async fn run_count(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunCountRequest>,
) -> Json<ApiResponse<RunCountResponse>> {
    if !state.count_state.try_start() {
        return Json(ApiResponse::error_code(ERR_TASK_RUNNING, "统计任务正在运行中"));
    }

    let options = CountTaskOptions {
        force: request.force,
        limit: request.limit.unwrap_or(100).clamp(1, 5000),
        offset: 0,
        pages: request.pages,
        dry_run: request.dry_run,
    };

    let progress = |msg: &str| tracing::debug!("{}", msg);
    let result = run_count_task(&state.store, &state.aggregates, &options, &progress).await;

    match result {
        Ok(r) => {
            state.count_state.finish(r.processed, r.errors, None);
            Json(ApiResponse::success(RunCountResponse {
                processed: r.processed,
                errors: r.errors,
                dry_run: options.dry_run,
            }))
        }
        Err(e) => {
            tracing::error!("Count task failed: {}", e);
            state.count_state.finish(0, 0, Some(e.to_string()));
            Json(ApiResponse::error(&format!("统计任务失败: {}", e)))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RunPurgeRequest {
    pub limit: Option<i64>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct RunPurgeResponse {
    pub deleted: u64,
    pub dry_run: bool,
    /// Hitting the limit means more orphans likely remain / 达到上限说明可能还有残留
    pub limit_reached: bool,
}

/// POST /api/admin/wordcount/purge - 执行一次孤立条目清理
pub async fn run_purge(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunPurgeRequest>,
) -> Json<ApiResponse<RunPurgeResponse>> {
    if !state.purge_state.try_start() {
        return Json(ApiResponse::error_code(ERR_TASK_RUNNING, "清理任务正在运行中"));
    }

    let options = PurgeTaskOptions {
        limit: request.limit.unwrap_or(1000).clamp(1, 10000),
        dry_run: request.dry_run,
    };

    let progress = |msg: &str| tracing::debug!("{}", msg);
    let result = run_purge_task(&state.store, &state.aggregates, &options, &progress).await;

    match result {
        Ok(r) => {
            state.purge_state.finish(r.deleted, 0, None);
            Json(ApiResponse::success(RunPurgeResponse {
                deleted: r.deleted,
                dry_run: options.dry_run,
                limit_reached: r.deleted as i64 >= options.limit,
            }))
        }
        Err(e) => {
            tracing::error!("Purge task failed: {}", e);
            state.purge_state.finish(0, 0, Some(e.to_string()));
            Json(ApiResponse::error(&format!("清理任务失败: {}", e)))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub count_words: TaskProgress,
    pub purge_orphaned: TaskProgress,
}

/// GET /api/admin/wordcount/status - 任务状态
pub async fn get_task_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<TaskStatusResponse>> {
    Json(ApiResponse::success(TaskStatusResponse {
        count_words: state.count_state.get_progress(),
        purge_orphaned: state.purge_state.get_progress(),
    }))
}

/// POST /api/admin/wordcount/cache/clear - 手动清空聚合缓存
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<ApiResponse<()>> {
    state.aggregates.invalidate_all().await;
    tracing::info!("Aggregate cache cleared via admin API");
    Json(ApiResponse::success(()))
}
