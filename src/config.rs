//! 构建配置
//!
//! 清理启发式所用的词表（站点外壳关键词、噪声短语、工具链接标签、
//! 已知的外壳标题）属于配置数据而非控制流，可以通过 TOML 文件替换。
//! 阈值不在此处：它们是 `sanitizer` 与 `gate` 中的具名常量。
//!
//! ```toml
//! [vocabulary]
//! chrome_title = "My Book Title"
//! utility_labels = ["highlight", "delete", "add note", "share quote"]
//!
//! [translation]
//! api_url = "http://localhost:1188/translate"
//! max_attempts = 5
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TRANSLATION_API_URL: &str = "http://localhost:1188/translate";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// 顶层构建配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildConfig {
    pub vocabulary: Vocabulary,
    pub fetch: FetchConfig,
    pub translation: TranslationConfig,
    pub render: RenderConfig,
}

/// 清理与章节门控使用的词表
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Vocabulary {
    /// 匹配 id/class 的站点外壳关键词（子串匹配，不区分大小写）
    pub chrome_keywords: Vec<String>,
    /// 噪声短语正则（不区分大小写）
    pub noise_phrases: Vec<String>,
    /// 阅读界面的工具链接标签（小写纯文本）
    pub utility_labels: Vec<String>,
    /// 每页重复出现的书名横幅
    pub chrome_title: Option<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            chrome_keywords: [
                "toolbar",
                "pagination",
                "pager",
                "rating",
                "review",
                "message",
                "notification",
                "cta",
                "book-navigation",
                "book_nav",
                "breadcrumb",
                "sidebar",
                "overlay",
                "modal",
                "banner",
                "cookie",
                "progressbar",
                "progress-bar",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            noise_phrases: [
                r"^\s*currently\s+reading\b",
                r"\bdismiss\s+message\b",
                r"\benjoying\s+this\s+book\?",
                r"\bprevious\s+page\b",
                r"\bnext\s+page\b",
                r"\byou've\s+reached\s+the\s+end\b",
                r"\bleave\s+a\s+rating\b",
                r"\bwrite\s+a\s+review\b",
                r"\bthis\s+book\s+failed\s+to\s+load\b",
                r"\bsomething\s+is\s+not\s+right\b",
                r"\bbook\s+navigation\b",
                r"\bpage\s+\d+\s+of\s+\d+\b",
                r"%\s*read\b",
                r"\bhighlight\b",
                r"\bdelete\b",
                r"\badd\s+note\b",
                r"\bshare\s+quote\b",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            utility_labels: ["highlight", "delete", "add note", "share quote"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            chrome_title: None,
        }
    }
}

/// 远程图片抓取配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 翻译服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub api_url: String,
    pub source_lang: String,
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_TRANSLATION_API_URL.to_string(),
            source_lang: "auto".to_string(),
            max_attempts: 5,
            base_delay_ms: 500,
            timeout_secs: 30,
        }
    }
}

/// wkhtmltopdf 渲染选项
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub wkhtmltopdf: String,
    pub page_size: String,
    pub orientation: String,
    pub margin_top_mm: u32,
    pub margin_right_mm: u32,
    pub margin_bottom_mm: u32,
    pub margin_left_mm: u32,
    pub dpi: u32,
    pub image_dpi: u32,
    pub image_quality: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            wkhtmltopdf: "wkhtmltopdf".to_string(),
            page_size: "A4".to_string(),
            orientation: "Portrait".to_string(),
            margin_top_mm: 12,
            margin_right_mm: 12,
            margin_bottom_mm: 15,
            margin_left_mm: 12,
            dpi: 96,
            image_dpi: 300,
            image_quality: 94,
        }
    }
}

impl BuildConfig {
    /// 从 TOML 文件加载配置，缺失的字段取默认值
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BuildConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.translation.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "translation.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.render.image_quality > 100 {
            return Err(ConfigError::Invalid(
                "render.image_quality must be between 0 and 100".to_string(),
            ));
        }

        for pattern in &self.vocabulary.noise_phrases {
            regex::Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{fetch, render, translation, EnvVar};

        if let Some(Ok(timeout)) = fetch::Timeout::get_override() {
            self.fetch.timeout_secs = timeout.as_secs();
        }

        if let Some(Ok(user_agent)) = fetch::UserAgent::get_override() {
            self.fetch.user_agent = user_agent;
        }

        if let Some(Ok(api_url)) = translation::ApiUrl::get_override() {
            self.translation.api_url = api_url;
        }

        if let Some(Ok(max_attempts)) = translation::MaxAttempts::get_override() {
            self.translation.max_attempts = max_attempts;
        }

        if let Some(Ok(wkhtmltopdf)) = render::Wkhtmltopdf::get_override() {
            self.render.wkhtmltopdf = wkhtmltopdf;
        }
    }
}
