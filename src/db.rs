use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use anyhow::Result;

/// Open the database pool with WAL mode enabled / 打开数据库连接池并启用WAL模式
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(database_url)
        .await?;

    // 启用WAL模式，提高并发性能
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(&pool)
        .await?;

    // 设置busy_timeout，避免锁超时
    sqlx::query("PRAGMA busy_timeout=5000")
        .execute(&pool)
        .await?;

    // 优化写入性能
    sqlx::query("PRAGMA synchronous=NORMAL")
        .execute(&pool)
        .await?;

    Ok(pool)
}

/// Run database migrations / 运行数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // 文档镜像表：由保存/删除事件维护，引擎其余部分只读
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            doc_id INTEGER PRIMARY KEY,
            title TEXT NOT NULL UNIQUE,
            namespace INTEGER NOT NULL DEFAULT 0,
            is_redirect INTEGER NOT NULL DEFAULT 0,
            content_model TEXT NOT NULL DEFAULT 'wikitext',
            content TEXT NOT NULL DEFAULT '',
            touched TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 词数表：每个文档一行，无外键约束（孤立条目由后台任务清理）
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS word_counts (
            wc_doc_id INTEGER PRIMARY KEY,
            wc_word_count INTEGER NOT NULL DEFAULT 0,
            wc_updated TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 对象缓存表（cache.backend = "database" 时使用）
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS object_cache (
            cache_key TEXT PRIMARY KEY,
            cache_value TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_word_counts_count ON word_counts(wc_word_count)"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_namespace ON documents(namespace)"
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migration completed");

    Ok(())
}
