//! Application configuration module / 应用配置模块
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global configuration instance / 全局配置实例
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Application configuration / 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration / 服务器配置
    pub server: ServerConfig,
    /// Database configuration / 数据库配置
    pub database: DatabaseConfig,
    /// Word counting configuration / 词数统计配置
    pub counter: CounterConfig,
    /// Aggregate cache configuration / 聚合缓存配置
    pub cache: CacheConfig,
    /// Background job configuration / 后台任务配置
    pub jobs: JobsConfig,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address / 服务器监听地址
    pub host: String,
    /// Server port / 服务器端口
    pub port: u16,
}

/// Database configuration / 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Data directory path / 数据目录路径
    pub data_dir: String,
    /// Database file path (relative to data_dir) / 数据库文件路径
    pub db_file: String,
}

/// Word counting configuration / 词数统计配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Namespaces whose documents are counted / 参与统计的命名空间
    pub supported_namespaces: Vec<i64>,
    /// Count numeric tokens (e.g. "3.14") as words / 数字是否计为词
    pub count_numbers: bool,
    /// Custom word regex, overrides the defaults / 自定义词匹配正则
    pub custom_pattern: Option<String>,
    /// Count synchronously on document save / 保存时是否同步统计
    ///
    /// Disable on high-traffic installs and let the background
    /// reconciliation job pick the documents up instead.
    pub count_on_save: bool,
}

/// Aggregate cache configuration / 聚合缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache backend: "memory" or "database" / 缓存后端
    pub backend: String,
    /// Snapshot TTL in seconds / 快照过期时间（秒）
    pub ttl_seconds: u64,
}

/// Background job configuration / 后台任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Incremental word counting job / 增量统计任务
    pub count_words: JobConfig,
    /// Orphaned entry cleanup job / 孤立条目清理任务
    pub purge_orphaned: JobConfig,
}

/// Per-job limit and cooldown / 单个任务的批量上限与冷却时间
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Batch limit per run; 0 disables the job / 单次批量上限，0 表示禁用
    pub limit: i64,
    /// Minimum seconds between two triggers / 两次触发的最小间隔（秒）
    pub interval_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            counter: CounterConfig::default(),
            cache: CacheConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8190,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            db_file: "wordcounter.db".to_string(),
        }
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            supported_namespaces: vec![0],
            count_numbers: false,
            custom_pattern: None,
            count_on_save: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            ttl_seconds: 3600,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            count_words: JobConfig {
                limit: 0,
                interval_seconds: 3600,
            },
            purge_orphaned: JobConfig {
                limit: 0,
                interval_seconds: 3600,
            },
        }
    }
}

impl AppConfig {
    /// Get the full database URL / 获取完整的数据库URL
    pub fn get_database_url(&self) -> String {
        let db_path = Path::new(&self.database.data_dir).join(&self.database.db_file);
        format!("sqlite:{}?mode=rwc", db_path.to_string_lossy())
    }

    /// Get the full data directory path / 获取完整的数据目录路径
    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.database.data_dir)
    }

    /// Get the server bind address / 获取服务器绑定地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Get the config file path / 获取配置文件路径
fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config() -> Result<AppConfig, String> {
    let config_path = get_config_path();

    if config_path.exists() {
        // Load existing config / 加载现有配置
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        // Create default config / 创建默认配置
        let config = AppConfig::default();
        save_config(&config)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(config: &AppConfig) -> Result<(), String> {
    let config_path = get_config_path();

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(&config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

/// Initialize global configuration / 初始化全局配置
pub fn init_config() -> Result<Arc<RwLock<AppConfig>>, String> {
    let config = load_config()?;

    let config_arc = Arc::new(RwLock::new(config));

    CONFIG.set(config_arc.clone())
        .map_err(|_| "Config already initialized".to_string())?;

    Ok(config_arc)
}

/// Get global configuration instance / 获取全局配置实例
///
/// Falls back to the in-memory defaults when init_config was never
/// called (unit tests), without touching the filesystem.
pub fn get_config() -> Arc<RwLock<AppConfig>> {
    CONFIG.get_or_init(|| Arc::new(RwLock::new(AppConfig::default()))).clone()
}

/// Get a read-only snapshot of current config / 获取当前配置的只读快照
pub fn config() -> AppConfig {
    get_config().read().clone()
}
