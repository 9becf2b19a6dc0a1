//! 章节门控
//!
//! 决定一个清理后的页面是否成为章节：接受、拒绝，或者把纯文本页面
//! 重塑为段落后接受。文本量足够（强制保留）时总是接受，其余拒绝
//! 规则只在未强制保留时检查。各条拒绝规则的阈值彼此独立。

use std::fmt;

use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;

use crate::book::ChapterDraft;
use crate::config::ConfigError;
use crate::parsers::html::dom::{get_node_name, is_element_named};
use crate::parsers::html::{
    count_elements, escape_xml_text, get_body, get_first_heading, has_element, parse_html,
    serialize_children_xhtml, text_content,
};
use crate::sanitizer::{
    build_case_insensitive, phrase_pattern, prune_empty_containers, CleanedDocument, Sanitizer,
};

/// 文本达到此长度时总是接受
pub const FORCED_KEEP_MIN_CHARS: usize = 200;
/// 纯噪声页面的文本长度上限（不含）
pub const NOISE_ONLY_MAX_CHARS: usize = 240;
/// 过短页面的文本长度上限（不含）
pub const VERY_SHORT_MAX_CHARS: usize = 160;
/// 过短页面允许的最大链接数
pub const VERY_SHORT_MAX_LINKS: usize = 5;
/// 外壳标题页面的文本长度上限（不含）
pub const CHROME_TITLE_MAX_CHARS: usize = 400;
/// 外壳标题页面允许的最大段落数
pub const CHROME_TITLE_MAX_PARAGRAPHS: usize = 1;

/// 结构有效性检查认可的内容元素
const CONTENT_ELEMENTS: &[&str] = &[
    "p", "img", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "a", "blockquote", "table",
];

/// 存在任一元素时不做段落重塑
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote", "table", "img",
];

/// 拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NoVisibleContent,
    NoiseOnly,
    TooShort,
    ChromeTitlePage,
    StructurallyEmpty,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::NoVisibleContent => "no visible content",
            RejectReason::NoiseOnly => "only reader interface labels",
            RejectReason::TooShort => "too short and without paragraphs",
            RejectReason::ChromeTitlePage => "site title page without content",
            RejectReason::StructurallyEmpty => "chapter markup is structurally empty",
        };
        f.write_str(reason)
    }
}

/// 门控结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Accept(ChapterDraft),
    /// 纯文本页面，已拆分为段落
    Reshaped(ChapterDraft),
    Reject(RejectReason),
}

impl GateDecision {
    pub fn into_draft(self) -> Option<ChapterDraft> {
        match self {
            GateDecision::Accept(draft) | GateDecision::Reshaped(draft) => Some(draft),
            GateDecision::Reject(_) => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, GateDecision::Reject(_))
    }
}

/// 门控使用的页面统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetrics {
    pub plain_text: String,
    pub text_len: usize,
    pub paragraphs: usize,
    pub links: usize,
    pub has_image: bool,
    pub has_visible: bool,
}

impl PageMetrics {
    pub fn measure(body: &Handle) -> Self {
        let plain_text = text_content(body);
        let text_len = plain_text.chars().count();
        let has_visible = plain_text.chars().any(char::is_alphanumeric)
            || has_element(body, CONTENT_ELEMENTS);

        Self {
            text_len,
            paragraphs: count_elements(body, &["p"]),
            links: count_elements(body, &["a"]),
            has_image: has_element(body, &["img"]),
            has_visible,
            plain_text,
        }
    }
}

pub struct ChapterGate<'a> {
    sanitizer: &'a Sanitizer,
    junk: Option<Regex>,
}

impl<'a> ChapterGate<'a> {
    /// 纯噪声正则由外壳标题与工具链接标签组成
    pub fn new(sanitizer: &'a Sanitizer, utility_labels: &[String]) -> Result<Self, ConfigError> {
        let mut alternatives: Vec<String> = Vec::new();
        if let Some(title) = sanitizer.chrome_title() {
            alternatives.push(format!(r"{}[^\n]*", phrase_pattern(title)));
        }
        alternatives.extend(
            utility_labels
                .iter()
                .map(|label| phrase_pattern(label))
                .filter(|p| !p.is_empty()),
        );

        let junk = if alternatives.is_empty() {
            None
        } else {
            let pattern = format!(r"^(?:\s*(?:{})\s*)+$", alternatives.join("|"));
            Some(build_case_insensitive(&pattern)?)
        };

        Ok(Self { sanitizer, junk })
    }

    /// 对清理后的页面做出门控决定
    ///
    /// `fallback_title` 在页面既没有 `<h1>` 也没有 `<title>` 时使用。
    pub fn evaluate(&self, doc: &CleanedDocument, fallback_title: &str) -> GateDecision {
        let Some(body) = doc.body() else {
            return GateDecision::Reject(RejectReason::NoVisibleContent);
        };

        prune_empty_containers(&body);
        let metrics = PageMetrics::measure(&body);

        if let Some(reason) = self.rejection(doc, &metrics) {
            return GateDecision::Reject(reason);
        }

        let heading = get_first_heading(&doc.dom.document);
        let render_heading = heading.is_some();
        let title = heading
            .or_else(|| doc.document_title())
            .unwrap_or_else(|| fallback_title.to_string());
        let title = if title.trim().is_empty() {
            doc.source_name.clone()
        } else {
            title
        };

        let reshape = metrics.paragraphs == 0 && !has_element(&body, BLOCK_ELEMENTS);
        let body_markup = if reshape {
            paragraphs_from_text(&raw_text(&body))
        } else {
            serialize_children_xhtml(&body)
        };

        if !is_structurally_valid(&body_markup) {
            return GateDecision::Reject(RejectReason::StructurallyEmpty);
        }

        let draft = ChapterDraft {
            title,
            body_markup,
            render_heading,
            source_name: doc.source_name.clone(),
        };

        if reshape {
            GateDecision::Reshaped(draft)
        } else {
            GateDecision::Accept(draft)
        }
    }

    fn rejection(&self, doc: &CleanedDocument, metrics: &PageMetrics) -> Option<RejectReason> {
        if metrics.text_len >= FORCED_KEEP_MIN_CHARS {
            return None;
        }

        if !metrics.has_visible {
            return Some(RejectReason::NoVisibleContent);
        }

        let noise_only = !metrics.has_image
            && metrics.text_len < NOISE_ONLY_MAX_CHARS
            && self
                .junk
                .as_ref()
                .map_or(false, |junk| junk.is_match(&metrics.plain_text));
        if noise_only {
            return Some(RejectReason::NoiseOnly);
        }

        if !metrics.has_image
            && metrics.text_len < VERY_SHORT_MAX_CHARS
            && metrics.paragraphs == 0
            && metrics.links <= VERY_SHORT_MAX_LINKS
        {
            return Some(RejectReason::TooShort);
        }

        let title_looks_chrome = match (self.sanitizer.title_pattern(), doc.document_title()) {
            (Some(pattern), Some(doc_title)) => pattern.is_match(&doc_title),
            _ => false,
        };
        if title_looks_chrome
            && !metrics.has_image
            && metrics.text_len < CHROME_TITLE_MAX_CHARS
            && metrics.paragraphs <= CHROME_TITLE_MAX_PARAGRAPHS
        {
            return Some(RejectReason::ChromeTitlePage);
        }

        None
    }
}

/// 章节片段是否含有可见文本或任一内容元素
pub fn is_structurally_valid(markup: &str) -> bool {
    let dom = parse_html(markup);
    match get_body(&dom.document) {
        Some(body) => !text_content(&body).is_empty() || has_element(&body, CONTENT_ELEMENTS),
        None => false,
    }
}

/// 重塑时视为段落边界的元素
const TEXT_BREAK_ELEMENTS: &[&str] = &[
    "div", "section", "article", "main", "header", "footer", "aside", "nav", "figure",
    "figcaption", "pre", "address", "center", "dl", "dt", "dd", "tr", "td", "th", "hr",
];

/// 保留换行的原始文本，用于按空行拆分段落
///
/// 块级元素前后插入空行，`<br>` 插入换行，元素两侧的词不会粘连。
fn raw_text(body: &Handle) -> String {
    let mut text = String::new();
    collect_raw_text(body, &mut text);
    text
}

fn collect_raw_text(node: &Handle, out: &mut String) {
    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            NodeData::Element { .. } => {
                if get_node_name(child) == Some("br") {
                    out.push('\n');
                } else if is_element_named(child, TEXT_BREAK_ELEMENTS) {
                    out.push_str("\n\n");
                    collect_raw_text(child, out);
                    out.push_str("\n\n");
                } else {
                    collect_raw_text(child, out);
                }
            }
            _ => {}
        }
    }
}

/// 按空行拆分为 `<p>` 段落；没有空行时整体作为一个段落
fn paragraphs_from_text(text: &str) -> String {
    let Ok(blank_line) = Regex::new(r"\n\s*\n") else {
        return format!("<p>{}</p>", escape_xml_text(text.trim()));
    };

    blank_line
        .split(text)
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|part| !part.is_empty())
        .map(|part| format!("<p>{}</p>", escape_xml_text(&part)))
        .collect::<Vec<_>>()
        .join("\n")
}
