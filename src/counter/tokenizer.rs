//! Tokenizer - pure word counting over document text / 词数分词器
//!
//! Strips markup down to human-legible plain text, then counts maximal
//! runs of the configured word class. No I/O, output depends only on
//! input, so recounting is always idempotent. / 无副作用，可重复调用

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::CounterConfig;
use crate::counter::error::{CounterError, Result};
use crate::models::ContentModel;

/// Default word class: runs of Unicode letters / 默认词类：Unicode字母串
static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}+").unwrap());

/// Word class including numeric runs with decimal/thousands separators,
/// "3.14" counts as one token / 含数字的词类
static WORD_NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\p{N}+(?:[.,]\p{N}+)*)|\p{L}+").unwrap());

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<ref[^>/]*/>|<ref[^>]*>.*?</ref>").unwrap());
static TEMPLATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{\{[^{}]*\}\}").unwrap());
static FILE_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[(?:File|Image|Media):[^\[\]]*\]\]").unwrap());
static WIKI_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[(?:[^\[\]|]*\|)?([^\[\]|]*)\]\]").unwrap());
static EXTERNAL_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\w+://[^\s\]]+\s*([^\]]*)\]").unwrap());
static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^=+|=+\s*$").unwrap());
static LIST_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[*#:;]+\s*").unwrap());
static TABLE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:\{\||\|\}|\|-|\||!).*$").unwrap());

/// Word counting options / 词数统计选项
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    /// Include numeric tokens / 是否统计数字
    pub count_numbers: bool,
    /// Caller-supplied pattern, overrides both defaults / 自定义词匹配正则
    pub custom_pattern: Option<Regex>,
}

impl CountOptions {
    /// Build options from configuration, compiling the custom pattern.
    /// A broken pattern is a deployment mistake and fails here. / 从配置构建
    pub fn from_config(config: &CounterConfig) -> Result<Self> {
        let custom_pattern = match &config.custom_pattern {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                CounterError::Config(format!("invalid custom word pattern: {}", e))
            })?),
            None => None,
        };

        Ok(Self {
            count_numbers: config.count_numbers,
            custom_pattern,
        })
    }
}

/// Count words in document text / 统计文档词数
///
/// Returns `Unsupported` for content models that cannot be turned into
/// plain text, so callers can tell "zero words" from "cannot count".
pub fn count_words(text: &str, content_model: &str, options: &CountOptions) -> Result<i64> {
    let model = ContentModel::parse(content_model)
        .ok_or_else(|| CounterError::Unsupported(content_model.to_string()))?;

    // Rendering-aware: plain text skips the stripping pass / 纯文本跳过剥离
    let plain = match model {
        ContentModel::Wikitext => strip_markup(text),
        ContentModel::Text => text.to_string(),
    };

    if plain.trim().is_empty() {
        return Ok(0);
    }

    let pattern: &Regex = match &options.custom_pattern {
        Some(custom) => custom,
        None if options.count_numbers => &WORD_NUMBER_PATTERN,
        None => &WORD_PATTERN,
    };

    Ok(pattern.find_iter(&plain).count() as i64)
}

/// Strip wiki markup and HTML down to plain text / 剥离Wiki标记与HTML
fn strip_markup(source: &str) -> String {
    let mut text = COMMENT_RE.replace_all(source, " ").into_owned();
    text = REF_RE.replace_all(&text, " ").into_owned();

    // Templates can nest; peel innermost first, bounded / 模板可嵌套，从内向外剥离
    for _ in 0..10 {
        let next = TEMPLATE_RE.replace_all(&text, " ").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    text = FILE_LINK_RE.replace_all(&text, " ").into_owned();
    text = WIKI_LINK_RE.replace_all(&text, "$1").into_owned();
    text = EXTERNAL_LINK_RE.replace_all(&text, "$1").into_owned();
    text = TABLE_LINE_RE.replace_all(&text, " ").into_owned();
    text = HTML_TAG_RE.replace_all(&text, " ").into_owned();
    text = text.replace("'''", "").replace("''", "");
    text = HEADING_RE.replace_all(&text, " ").into_owned();
    text = LIST_MARKER_RE.replace_all(&text, "").into_owned();

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace() {
        let opts = CountOptions::default();
        assert_eq!(count_words("", "wikitext", &opts).unwrap(), 0);
        assert_eq!(count_words("   \n\t  ", "wikitext", &opts).unwrap(), 0);
        assert_eq!(count_words("", "text", &opts).unwrap(), 0);
    }

    #[test]
    fn test_plain_words() {
        let opts = CountOptions::default();
        assert_eq!(count_words("Hello world", "text", &opts).unwrap(), 2);
        assert_eq!(count_words("one,two;three", "text", &opts).unwrap(), 3);
    }

    #[test]
    fn test_numbers_excluded_by_default() {
        let opts = CountOptions::default();
        assert_eq!(count_words("version 3.14 released", "text", &opts).unwrap(), 2);
        assert_eq!(count_words("1 2 3", "text", &opts).unwrap(), 0);
    }

    #[test]
    fn test_numbers_included() {
        let opts = CountOptions {
            count_numbers: true,
            ..Default::default()
        };
        // "3.14" 作为一个词
        assert_eq!(count_words("version 3.14 released", "text", &opts).unwrap(), 3);
        assert_eq!(count_words("1,000,000", "text", &opts).unwrap(), 1);
    }

    #[test]
    fn test_custom_pattern_overrides() {
        let opts = CountOptions {
            count_numbers: false,
            custom_pattern: Some(Regex::new(r"\S+").unwrap()),
        };
        assert_eq!(count_words("a-b c/d 42", "text", &opts).unwrap(), 3);
    }

    #[test]
    fn test_wikitext_markup_stripped() {
        let opts = CountOptions::default();
        let source = "== Heading ==\n'''Bold''' text with a [[linked page|link]] \
                      and {{some template|arg=1}} plus <ref>a footnote</ref> end.";
        // Heading Bold text with a link and plus end
        assert_eq!(count_words(source, "wikitext", &opts).unwrap(), 9);
    }

    #[test]
    fn test_nested_templates() {
        let opts = CountOptions::default();
        let source = "before {{outer|{{inner|x}}}} after";
        assert_eq!(count_words(source, "wikitext", &opts).unwrap(), 2);
    }

    #[test]
    fn test_external_link_keeps_label() {
        let opts = CountOptions::default();
        let source = "see [https://example.org the docs] here";
        assert_eq!(count_words(source, "wikitext", &opts).unwrap(), 4);
    }

    #[test]
    fn test_unsupported_model() {
        let opts = CountOptions::default();
        let err = count_words("some bytes", "binary", &opts).unwrap_err();
        assert!(matches!(err, CounterError::Unsupported(_)));
    }

    #[test]
    fn test_invalid_custom_pattern_fails() {
        let config = CounterConfig {
            custom_pattern: Some("([unclosed".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            CountOptions::from_config(&config),
            Err(CounterError::Config(_))
        ));
    }
}
