use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content models the tokenizer can turn into plain text / 可统计的内容模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentModel {
    /// Wiki markup, stripped before counting / Wiki标记，统计前先剥离
    Wikitext,
    /// Already rendered plain text, counted as-is / 已渲染的纯文本
    Text,
}

impl ContentModel {
    /// Parse a stored model name; unknown models are not countable / 解析内容模型
    pub fn parse(model: &str) -> Option<Self> {
        match model {
            "wikitext" => Some(Self::Wikitext),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wikitext => "wikitext",
            Self::Text => "text",
        }
    }
}

/// Mirrored document metadata and current text / 文档镜像行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub doc_id: i64,
    pub title: String,
    pub namespace: i64,
    pub is_redirect: bool,
    pub content_model: String,
    pub content: String,
    pub touched: String,
}

impl Document {
    /// A document qualifies when it exists (row present), is not a
    /// redirect, sits in a supported namespace and carries a countable
    /// content model. / 判断文档是否参与词数统计
    pub fn qualifies(&self, namespaces: &[i64]) -> bool {
        !self.is_redirect
            && namespaces.contains(&self.namespace)
            && ContentModel::parse(&self.content_model).is_some()
    }
}

/// One row of the count store / 词数表的一行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CountEntry {
    pub doc_id: i64,
    pub word_count: i64,
    pub updated: String,
}

/// Document save event payload / 文档保存事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedDocument {
    pub doc_id: i64,
    pub title: String,
    #[serde(default)]
    pub namespace: i64,
    #[serde(default)]
    pub is_redirect: bool,
    pub content_model: String,
    #[serde(default)]
    pub content: String,
}

/// Ranked listing row / 排行列表行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RankedDocument {
    pub doc_id: i64,
    pub title: String,
    pub namespace: i64,
    pub word_count: i64,
}

/// A qualifying document without a count entry yet / 尚未统计的文档
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UncountedDocument {
    pub doc_id: i64,
    pub title: String,
    pub namespace: i64,
}

/// Cached sitewide aggregates, always reconstructible from the count
/// store / 站点级聚合快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub total_words: i64,
    pub total_documents: i64,
    pub pending_count: i64,
    pub computed_at: DateTime<Utc>,
}

impl AggregateSnapshot {
    /// Average words per document, rounded / 平均每篇词数
    pub fn average_words(&self) -> i64 {
        if self.total_documents > 0 {
            (self.total_words as f64 / self.total_documents as f64).round() as i64
        } else {
            0
        }
    }
}
