//! DOM 清理器
//!
//! 将保存下来的阅读器页面还原为正文：剥离脚本与嵌入对象、识别正文根节点、
//! 删除站点外壳（导航、评分提示、进度条、工具链接列表），最后清理属性。
//!
//! 各个 pass 的执行顺序就是契约：后面的 pass 会重新检查前面 pass 的结果。
//! 每个 pass 都是尽力而为的，单个元素出问题只会被跳过并计数，不会中断清理。
//!
//! 正文根节点一旦确定，任何 pass 都不能删除它或它的祖先。

mod passes;

pub use passes::is_empty_container;

use std::collections::HashSet;
use std::fmt;

use markup5ever_rcdom::{Handle, RcDom};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::config::{ConfigError, Vocabulary};
use crate::parsers::html::{get_body, get_title, parse_html};

/// 正文根节点评分中每个段落的权重
pub const MAIN_ROOT_PARAGRAPH_WEIGHT: usize = 200;
/// 正文根节点至少需要的段落数（或满足文本长度）
pub const MAIN_ROOT_MIN_PARAGRAPHS: usize = 3;
/// 正文根节点至少需要的文本长度（或满足段落数）
pub const MAIN_ROOT_MIN_TEXT: usize = 800;

/// 命中外壳关键词但段落数达到此值时视为误判而保留
pub const CHROME_KEEP_MIN_PARAGRAPHS: usize = 3;
/// 命中外壳关键词但文本超过此长度时视为误判而保留
pub const CHROME_KEEP_MIN_TEXT: usize = 500;

/// 噪声短语所在块可整体删除的最大段落数
pub const NOISE_BLOCK_MAX_PARAGRAPHS: usize = 1;
/// 噪声短语所在块可整体删除的文本长度上限（不含）
pub const NOISE_BLOCK_MAX_TEXT: usize = 400;

/// 工具链接列表：链接不超过此数量且文本短于 `UTILITY_LIST_MAX_TEXT` 时删除
pub const UTILITY_LIST_MAX_LINKS: usize = 3;
pub const UTILITY_LIST_MAX_TEXT: usize = 120;

/// 书名横幅只在 body 的前若干个元素中查找
pub const TITLE_BANNER_SCAN_LIMIT: usize = 200;
/// 书名横幅的文本长度上限（不含）
pub const TITLE_BANNER_MAX_TEXT: usize = 200;

/// 页首导航列表：只检查 body 的前若干个子元素
pub const LEADING_BLOCK_SCAN: usize = 10;
pub const LEADING_LIST_MIN_LINKS: usize = 3;
pub const LEADING_LIST_MAX_TEXT: usize = 300;

/// 清理 pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    StripNonContent,
    DetectMainRoot,
    StructuralChrome,
    ChromeKeywords,
    EmptyContainers,
    NoisePhrases,
    Overlays,
    UtilityLists,
    LeadingLists,
    TitleBanners,
    FinalEmptySweep,
    AttributeHygiene,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pass::StripNonContent => "strip-non-content",
            Pass::DetectMainRoot => "detect-main-root",
            Pass::StructuralChrome => "structural-chrome",
            Pass::ChromeKeywords => "chrome-keywords",
            Pass::EmptyContainers => "empty-containers",
            Pass::NoisePhrases => "noise-phrases",
            Pass::Overlays => "overlays",
            Pass::UtilityLists => "utility-lists",
            Pass::LeadingLists => "leading-lists",
            Pass::TitleBanners => "title-banners",
            Pass::FinalEmptySweep => "final-empty-sweep",
            Pass::AttributeHygiene => "attribute-hygiene",
        };
        f.write_str(name)
    }
}

/// 单个 pass 的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass: Pass,
    /// 删除的元素、文本节点或属性数量
    pub removed: usize,
    /// 因保护正文根节点而保留的元素数量
    pub guarded: usize,
    /// 已被先前的删除摘下、因而跳过的节点数量
    pub skipped: usize,
}

impl PassReport {
    pub(crate) fn new(pass: Pass) -> Self {
        Self {
            pass,
            removed: 0,
            guarded: 0,
            skipped: 0,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.removed == 0
    }
}

/// 整次清理的结果
#[derive(Debug, Clone, Default)]
pub struct SanitizeReport {
    pub passes: Vec<PassReport>,
    pub main_root_found: bool,
}

impl SanitizeReport {
    pub fn total_removed(&self) -> usize {
        self.passes.iter().map(|p| p.removed).sum()
    }

    pub fn pass(&self, pass: Pass) -> Option<&PassReport> {
        self.passes.iter().find(|p| p.pass == pass)
    }
}

/// 清理后的文档
pub struct CleanedDocument {
    pub dom: RcDom,
    pub source_name: String,
}

impl CleanedDocument {
    pub fn body(&self) -> Option<Handle> {
        get_body(&self.dom.document)
    }

    /// 文档 `<title>`
    pub fn document_title(&self) -> Option<String> {
        get_title(&self.dom.document)
    }
}

/// 编译后的清理词表
pub struct Sanitizer {
    chrome_keywords: Vec<String>,
    noise: Option<Regex>,
    utility_labels: HashSet<String>,
    chrome_title: Option<String>,
    title_pattern: Option<Regex>,
}

impl Sanitizer {
    pub fn new(vocabulary: &Vocabulary) -> Result<Self, ConfigError> {
        let noise = if vocabulary.noise_phrases.is_empty() {
            None
        } else {
            let alternation = vocabulary
                .noise_phrases
                .iter()
                .map(|p| format!("(?:{p})"))
                .collect::<Vec<_>>()
                .join("|");
            Some(build_case_insensitive(&alternation)?)
        };

        let chrome_title = vocabulary
            .chrome_title
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let title_pattern = match &chrome_title {
            Some(title) => Some(build_case_insensitive(&phrase_pattern(title))?),
            None => None,
        };

        Ok(Self {
            chrome_keywords: vocabulary
                .chrome_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            noise,
            utility_labels: vocabulary
                .utility_labels
                .iter()
                .map(|l| l.trim().to_lowercase())
                .collect(),
            chrome_title,
            title_pattern,
        })
    }

    /// 解析并清理一段 HTML
    pub fn sanitize_markup(&self, markup: &str, source_name: &str) -> (CleanedDocument, SanitizeReport) {
        self.sanitize(parse_html(markup), source_name)
    }

    /// 按固定顺序执行所有 pass
    pub fn sanitize(&self, dom: RcDom, source_name: &str) -> (CleanedDocument, SanitizeReport) {
        let mut report = SanitizeReport::default();

        if let Some(body) = get_body(&dom.document) {
            let mut ctx = passes::Context::new(self, body);

            report.passes.push(passes::strip_non_content(&ctx));
            report.passes.push(passes::detect_main_root(&mut ctx));
            report.main_root_found = ctx.main_root.is_some();
            report.passes.push(passes::structural_chrome(&ctx));
            report.passes.push(passes::chrome_keywords(&ctx));
            report.passes.push(passes::empty_containers(&ctx, Pass::EmptyContainers));
            report.passes.push(passes::noise_phrases(&ctx));
            report.passes.push(passes::overlays(&ctx));
            report.passes.push(passes::utility_lists(&ctx));
            report.passes.push(passes::leading_lists(&ctx));
            report.passes.push(passes::title_banners(&ctx));
            report.passes.push(passes::empty_containers(&ctx, Pass::FinalEmptySweep));
            report.passes.push(passes::attribute_hygiene(&ctx));
        }

        for pass in report.passes.iter().filter(|p| !p.is_noop() || p.guarded > 0) {
            debug!(
                source = source_name,
                pass = %pass.pass,
                removed = pass.removed,
                guarded = pass.guarded,
                skipped = pass.skipped,
                "sanitizer pass"
            );
        }

        (
            CleanedDocument {
                dom,
                source_name: source_name.to_string(),
            },
            report,
        )
    }

    pub fn chrome_title(&self) -> Option<&str> {
        self.chrome_title.as_deref()
    }

    pub fn title_pattern(&self) -> Option<&Regex> {
        self.title_pattern.as_ref()
    }
}

/// 删除空容器，返回删除数量
///
/// 资源嵌入会删掉抓取失败的图片，留下的空壳在章节门控统计前再清理一次。
pub fn prune_empty_containers(body: &Handle) -> usize {
    passes::prune_empty(body)
}

/// 把短语转成正则：词按字面匹配，空白可以是任意空白序列
pub fn phrase_pattern(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

pub(crate) fn build_case_insensitive(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}
