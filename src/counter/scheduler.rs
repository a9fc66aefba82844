//! Background job scheduling with throttle tickets / 后台任务调度与节流
//!
//! `maybe_schedule` is cheap enough to call on every qualifying save or
//! delete event. A TTL'd ticket per task converts that high-frequency
//! trigger into at most one background run per cooldown window. The
//! ticket is a soft mutex, not a lock: it expires on its own, so a
//! failed spawn can never deadlock future triggers, and a duplicate run
//! is harmless because the tasks are idempotent. / 软互斥，过期自动重置

use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, JobConfig};
use crate::counter::cache::{AggregateCache, ObjectCache};
use crate::counter::store::CountStore;
use crate::counter::tasks::{
    run_count_task, run_purge_task, CountTaskOptions, PurgeTaskOptions,
};

/// Throttle ticket key prefix, kept apart from the aggregate keys so
/// cache invalidation never re-arms a trigger early / 节流键前缀
const THROTTLE_KEY_PREFIX: &str = "throttle:";

pub const TASK_COUNT_WORDS: &str = "count-words";
pub const TASK_PURGE_ORPHANED: &str = "purge-orphaned";

pub struct JobScheduler {
    cache: Arc<dyn ObjectCache>,
    store: CountStore,
    aggregates: Arc<AggregateCache>,
}

impl JobScheduler {
    pub fn new(
        cache: Arc<dyn ObjectCache>,
        store: CountStore,
        aggregates: Arc<AggregateCache>,
    ) -> Self {
        Self {
            cache,
            store,
            aggregates,
        }
    }

    /// Consider triggering the registered background tasks / 尝试触发后台任务
    pub async fn maybe_schedule(&self) {
        let jobs = config::config().jobs;

        self.maybe_schedule_task(TASK_COUNT_WORDS, &jobs.count_words).await;
        self.maybe_schedule_task(TASK_PURGE_ORPHANED, &jobs.purge_orphaned).await;
    }

    async fn maybe_schedule_task(&self, name: &'static str, job: &JobConfig) {
        // limit <= 0 disables the task / limit小于等于0时任务禁用
        if job.limit <= 0 {
            return;
        }

        if !self
            .acquire_ticket(name, Duration::from_secs(job.interval_seconds))
            .await
        {
            return;
        }

        tracing::info!("Scheduling background task {}", name);
        self.spawn_task(name, job.limit);
    }

    /// Set the throttle ticket if absent; true means the caller owns
    /// this cooldown window / 获取节流票据
    pub async fn acquire_ticket(&self, name: &str, interval: Duration) -> bool {
        let key = format!("{}{}", THROTTLE_KEY_PREFIX, name);

        if self.cache.get(&key).await.is_some() {
            return false;
        }

        self.cache.set(&key, "1".to_string(), interval).await;
        true
    }

    /// Run one bounded batch on the runtime, detached from the caller
    /// / 在后台执行一次批量任务
    fn spawn_task(&self, name: &'static str, limit: i64) {
        let store = self.store.clone();
        let aggregates = self.aggregates.clone();

        tokio::spawn(async move {
            let progress = move |msg: &str| tracing::debug!(task = name, "{}", msg);

            let outcome = match name {
                TASK_COUNT_WORDS => {
                    let options = CountTaskOptions {
                        limit,
                        ..Default::default()
                    };
                    run_count_task(&store, &aggregates, &options, &progress)
                        .await
                        .map(|r| format!("processed {}, errors {}", r.processed, r.errors))
                }
                TASK_PURGE_ORPHANED => {
                    let options = PurgeTaskOptions {
                        limit,
                        ..Default::default()
                    };
                    run_purge_task(&store, &aggregates, &options, &progress)
                        .await
                        .map(|r| format!("deleted {}", r.deleted))
                }
                _ => return,
            };

            match outcome {
                Ok(summary) => tracing::info!("Background task {} finished: {}", name, summary),
                Err(e) => tracing::warn!("Background task {} failed: {}", name, e),
            }
        });
    }
}
