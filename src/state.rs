use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::RwLock;
use serde::Serialize;

use wordcounter_backend::counter::{AggregateCache, CountStore, JobScheduler};

/// Reconciliation run progress / 对账任务进度
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub is_running: bool,
    pub processed: u64,
    pub errors: u64,
    pub last_done_time: Option<i64>,
    pub error: Option<String>,
}

impl Default for TaskProgress {
    fn default() -> Self {
        Self {
            is_running: false,
            processed: 0,
            errors: 0,
            last_done_time: None,
            error: None,
        }
    }
}

/// Task state management / 任务状态管理
///
/// Guards against concurrent admin-triggered runs of the same task and
/// keeps the last outcome for the status endpoint.
pub struct TaskState {
    running: AtomicBool,
    progress: RwLock<TaskProgress>,
}

impl TaskState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            progress: RwLock::new(TaskProgress::default()),
        }
    }

    /// Try to claim the task; false when a run is already in flight
    /// / 尝试占用任务，已在运行时返回false
    pub fn try_start(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let mut progress = self.progress.write();
        progress.is_running = true;
        progress.processed = 0;
        progress.errors = 0;
        progress.error = None;
        true
    }

    pub fn finish(&self, processed: u64, errors: u64, error: Option<String>) {
        self.running.store(false, Ordering::SeqCst);
        let mut progress = self.progress.write();
        progress.is_running = false;
        progress.processed = processed;
        progress.errors = errors;
        progress.error = error;
        progress.last_done_time = Some(chrono::Utc::now().timestamp());
    }

    pub fn get_progress(&self) -> TaskProgress {
        self.progress.read().clone()
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppState {
    pub store: CountStore,
    pub aggregates: Arc<AggregateCache>,
    pub scheduler: Arc<JobScheduler>,
    pub count_state: TaskState,
    pub purge_state: TaskState,
}
