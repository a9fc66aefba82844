use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use wordcounter_backend::config;
use wordcounter_backend::counter::{AggregateCache, CacheBackend, CountOptions, CountStore, JobScheduler};
use wordcounter_backend::db;
use state::{AppState, TaskState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordcounter_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration / 加载配置
    let app_config = config::init_config()
        .map_err(|e| anyhow::anyhow!(e))?
        .read()
        .clone();
    tracing::info!(
        "WordCounter backend starting (built {})",
        option_env!("BUILD_TIME").unwrap_or("unknown")
    );
    tracing::info!(
        "Server will listen on {}:{}",
        app_config.server.host,
        app_config.server.port
    );

    // Configuration mistakes fail fast, before any traffic / 配置错误直接启动失败
    let backend = CacheBackend::from_name(&app_config.cache.backend)?;
    CountOptions::from_config(&app_config.counter)?;

    // Create data directory if not exists / 创建数据目录
    let data_dir = app_config.get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("Created data directory: {:?}", data_dir);
    }

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| app_config.get_database_url());

    let pool = db::connect(&database_url).await?;
    db::run_migrations(&pool).await?;

    let store = CountStore::new(pool.clone());
    let object_cache = backend.build(&pool);
    let aggregates = Arc::new(AggregateCache::new(
        object_cache.clone(),
        Duration::from_secs(app_config.cache.ttl_seconds),
    ));
    let scheduler = Arc::new(JobScheduler::new(
        object_cache,
        store.clone(),
        aggregates.clone(),
    ));
    tracing::info!("Aggregate cache backend: {}", app_config.cache.backend);

    let state = Arc::new(AppState {
        store,
        aggregates,
        scheduler,
        count_state: TaskState::new(),
        purge_state: TaskState::new(),
    });

    let app = Router::new()
        .route("/api/health", get(api::server::health_check))
        // 查询接口
        .route("/api/wordcount/totals", get(api::wordcount::get_totals))
        .route("/api/wordcount/page", get(api::wordcount::get_page_words))
        .route("/api/wordcount/pages", get(api::wordcount::get_ranked_pages))
        .route("/api/wordcount/uncounted", get(api::wordcount::get_uncounted_pages))
        // 文档生命周期事件
        .route("/api/documents/save", post(api::documents::save_document))
        .route("/api/documents/delete", post(api::documents::delete_document))
        // 维护管理接口
        .route("/api/admin/wordcount/count", post(api::admin::run_count))
        .route("/api/admin/wordcount/purge", post(api::admin::run_purge))
        .route("/api/admin/wordcount/status", get(api::admin::get_task_status))
        .route("/api/admin/wordcount/cache/clear", post(api::admin::clear_cache))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let bind_addr = app_config.get_bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
