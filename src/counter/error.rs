//! Engine error taxonomy / 引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    /// Content model cannot be tokenized; never retried / 内容模型无法统计
    #[error("content model <{0}> cannot be counted")]
    Unsupported(String),

    /// Document fails the qualification checks at process time / 文档不满足统计条件
    #[error("document {0} does not qualify for word counting")]
    NotQualifying(i64),

    /// Transient storage failure, surfaced to the caller / 存储暂时不可用
    #[error("count store unavailable: {0}")]
    Store(#[from] sqlx::Error),

    /// Caller-supplied identity resolves to nothing / 无效的文档标识
    #[error("invalid document identity: {0}")]
    InvalidIdentity(String),

    /// Deployment mistake, fails fast at startup / 配置错误
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CounterError>;
