use std::collections::HashSet;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use super::*;
use crate::parsers::html::dom::{
    count_elements, descendant_elements, descendants, detach_node, get_node_attr,
    get_node_attr_names, get_node_name, get_parent_node, get_text, has_element,
    is_ancestor_of, is_attached_to, is_element_named, remove_node_attrs, set_node_attr,
    set_text, text_content, text_length,
};

/// 直接删除的非内容元素
const NON_CONTENT_ELEMENTS: &[&str] = &["script", "noscript", "iframe", "embed", "object", "style"];

/// 正文根节点候选
const MAIN_ROOT_CANDIDATES: &[&str] = &["article", "main", "div", "section"];

/// 结构性外壳元素
const STRUCTURAL_CHROME_ELEMENTS: &[&str] = &[
    "header", "footer", "nav", "aside", "form", "button", "svg", "input", "select", "textarea",
];

/// 参与外壳关键词匹配的元素
const KEYWORD_CHROME_ELEMENTS: &[&str] = &["div", "nav", "aside", "section", "header", "footer"];

/// 可能变成空壳的容器元素
const EMPTY_CANDIDATES: &[&str] = &[
    "div", "p", "span", "section", "article", "main", "li", "ul", "ol", "dl", "dt", "dd",
    "blockquote", "h1", "h2", "h3", "h4", "h5", "h6", "a", "em", "strong", "b", "i", "u", "small",
    "font", "center", "label", "figure", "figcaption", "header", "footer", "nav", "aside", "sup",
    "sub", "code", "mark", "cite", "q", "abbr", "s", "del", "ins", "kbd", "samp", "var", "time",
];

/// 自身即为内容的元素（空容器判断时视为有内容）
const CONTENT_MEDIA: &[&str] = &["img", "table", "picture", "svg", "video", "audio"];

/// 噪声短语向上查找的块级祖先
const NOISE_BLOCK_ELEMENTS: &[&str] = &["section", "div", "nav", "header", "footer", "aside"];

/// 书名横幅候选
const TITLE_BANNER_ELEMENTS: &[&str] = &["h1", "h2", "h3", "div", "p", "span"];

/// 懒加载图片常用的地址属性
const LAZY_IMAGE_ATTRS: &[&str] = &["data-src", "data-original", "data-lazy-src"];

pub(super) struct Context<'a> {
    pub(super) sanitizer: &'a Sanitizer,
    pub(super) body: Handle,
    pub(super) main_root: Option<Handle>,
}

impl<'a> Context<'a> {
    pub(super) fn new(sanitizer: &'a Sanitizer, body: Handle) -> Self {
        Self {
            sanitizer,
            body,
            main_root: None,
        }
    }

    /// 节点是正文根节点或其祖先
    fn guards_main(&self, node: &Handle) -> bool {
        match &self.main_root {
            Some(main) => Rc::ptr_eq(node, main) || is_ancestor_of(node, main),
            None => false,
        }
    }

    /// 节点位于正文根节点之内
    fn inside_main(&self, node: &Handle) -> bool {
        self.main_root
            .as_ref()
            .map_or(false, |main| is_ancestor_of(main, node))
    }

    fn is_attached(&self, node: &Handle) -> bool {
        is_attached_to(node, &self.body)
    }

    fn is_page_root(&self, node: &Handle) -> bool {
        Rc::ptr_eq(node, &self.body) || is_element_named(node, &["html", "body", "head"])
    }

    /// 删除节点；已被摘下的节点记为跳过，正文根节点及其祖先记为保护
    fn remove(&self, node: &Handle, report: &mut PassReport) -> bool {
        if !self.is_attached(node) || self.is_page_root(node) {
            report.skipped += 1;
            return false;
        }
        if self.guards_main(node) {
            report.guarded += 1;
            return false;
        }
        detach_node(node);
        report.removed += 1;
        true
    }

    fn elements(&self) -> Vec<Handle> {
        descendant_elements(&self.body)
    }
}

/// 1. 剥离脚本、noscript、嵌入框架与对象、内联样式块、非样式表 link
pub(super) fn strip_non_content(ctx: &Context) -> PassReport {
    let mut report = PassReport::new(Pass::StripNonContent);

    for node in ctx.elements() {
        let strip = is_element_named(&node, NON_CONTENT_ELEMENTS)
            || (get_node_name(&node) == Some("link") && !is_stylesheet_link(&node));
        if strip {
            ctx.remove(&node, &mut report);
        }
    }

    report
}

fn is_stylesheet_link(node: &Handle) -> bool {
    get_node_attr(node, "rel")
        .unwrap_or_default()
        .split_whitespace()
        .any(|rel| rel.eq_ignore_ascii_case("stylesheet"))
}

/// 2. 识别正文根节点：得分 = 段落数 × 200 + 可见文本长度
///
/// 得分相同时保留文档顺序中靠前的候选。
pub(super) fn detect_main_root(ctx: &mut Context) -> PassReport {
    let report = PassReport::new(Pass::DetectMainRoot);
    let mut best: Option<(usize, usize, usize, Handle)> = None;

    for node in ctx.elements() {
        if !is_element_named(&node, MAIN_ROOT_CANDIDATES) {
            continue;
        }
        let paragraphs = count_elements(&node, &["p"]);
        let text = text_length(&node);
        let score = paragraphs * MAIN_ROOT_PARAGRAPH_WEIGHT + text;

        if best.as_ref().map_or(true, |(s, ..)| score > *s) {
            best = Some((score, paragraphs, text, node));
        }
    }

    ctx.main_root = best.and_then(|(_, paragraphs, text, node)| {
        if paragraphs >= MAIN_ROOT_MIN_PARAGRAPHS || text >= MAIN_ROOT_MIN_TEXT {
            Some(node)
        } else {
            None
        }
    });

    report
}

/// 3. 删除结构性外壳元素（页眉、页脚、导航、表单、交互控件、矢量图块）
pub(super) fn structural_chrome(ctx: &Context) -> PassReport {
    let mut report = PassReport::new(Pass::StructuralChrome);

    for node in ctx.elements() {
        if is_element_named(&node, STRUCTURAL_CHROME_ELEMENTS) {
            ctx.remove(&node, &mut report);
        }
    }

    report
}

/// 4. 删除 id/class 命中外壳关键词的容器
///
/// 正文根节点、其祖先和其后代都不动；段落多、文本长或含图片的
/// 命中视为误判，保留。
pub(super) fn chrome_keywords(ctx: &Context) -> PassReport {
    let mut report = PassReport::new(Pass::ChromeKeywords);
    if ctx.sanitizer.chrome_keywords.is_empty() {
        return report;
    }

    for node in ctx.elements() {
        if !is_element_named(&node, KEYWORD_CHROME_ELEMENTS) || !ctx.is_attached(&node) {
            continue;
        }

        let id = get_node_attr(&node, "id").unwrap_or_default().to_lowercase();
        let class = get_node_attr(&node, "class")
            .unwrap_or_default()
            .to_lowercase();
        let matches = ctx
            .sanitizer
            .chrome_keywords
            .iter()
            .any(|k| id.contains(k.as_str()) || class.contains(k.as_str()));
        if !matches {
            continue;
        }

        if ctx.guards_main(&node) || ctx.inside_main(&node) {
            report.guarded += 1;
            continue;
        }

        let looks_like_content = count_elements(&node, &["p"]) >= CHROME_KEEP_MIN_PARAGRAPHS
            || text_length(&node) > CHROME_KEEP_MIN_TEXT
            || has_element(&node, &["img"]);
        if looks_like_content {
            report.guarded += 1;
            continue;
        }

        ctx.remove(&node, &mut report);
    }

    report
}

/// 5. 删除既没有文本也没有图片/表格的容器
///
/// 后序处理，内层空壳先被删除，外层随之变空时也会被删除。
pub(super) fn empty_containers(ctx: &Context, pass: Pass) -> PassReport {
    let mut report = PassReport::new(pass);

    for node in ctx.elements().into_iter().rev() {
        if !is_element_named(&node, EMPTY_CANDIDATES) || !ctx.is_attached(&node) {
            continue;
        }
        if is_empty_container(&node) {
            ctx.remove(&node, &mut report);
        }
    }

    report
}

/// 没有可见文本且不含图片、表格等媒体
pub fn is_empty_container(node: &Handle) -> bool {
    !is_element_named(node, CONTENT_MEDIA)
        && !has_element(node, CONTENT_MEDIA)
        && text_content(node).is_empty()
}

/// 6. 删除噪声短语
///
/// 先从文本节点中删去已知的外壳标题原文。随后对每个命中噪声短语的
/// 文本节点，找到最近的块级祖先：块很小（段落不超过 1 个、文本少于
/// 400 字符、没有图片）时删除整块，否则只删除该文本节点。
pub(super) fn noise_phrases(ctx: &Context) -> PassReport {
    let mut report = PassReport::new(Pass::NoisePhrases);

    let text_nodes: Vec<Handle> = descendants(&ctx.body)
        .into_iter()
        .filter(|n| matches!(n.data, NodeData::Text { .. }))
        .collect();

    // 书名字面量不区分大小写地从文本中抹去
    if let Some(title) = ctx.sanitizer.title_pattern.as_ref() {
        for node in &text_nodes {
            if let Some(text) = get_text(node) {
                if title.is_match(&text) {
                    set_text(node, &title.replace_all(&text, ""));
                    report.removed += 1;
                }
            }
        }
    }

    let Some(noise) = ctx.sanitizer.noise.as_ref() else {
        return report;
    };

    for node in text_nodes {
        if !ctx.is_attached(&node) {
            report.skipped += 1;
            continue;
        }
        let Some(text) = get_text(&node) else {
            continue;
        };
        if !noise.is_match(&text) {
            continue;
        }

        let Some(parent) = get_parent_node(&node) else {
            report.skipped += 1;
            continue;
        };
        let block = noise_block(&node, &parent);

        let small = !ctx.is_page_root(&block)
            && !ctx.guards_main(&block)
            && count_elements(&block, &["p"]) <= NOISE_BLOCK_MAX_PARAGRAPHS
            && text_length(&block) < NOISE_BLOCK_MAX_TEXT
            && !has_element(&block, &["img"]);

        if small {
            ctx.remove(&block, &mut report);
        } else {
            detach_node(&node);
            report.removed += 1;
        }
    }

    report
}

/// 文本节点所属的块：显式声明 `display:block` 的 span 父节点优先，
/// 其次是最近的块级祖先，最后是直接父节点
fn noise_block(text_node: &Handle, parent: &Handle) -> Handle {
    if get_node_name(parent) == Some("span") && style_declares(parent, "display:block") {
        return parent.clone();
    }

    let mut current = get_parent_node(text_node);
    while let Some(ancestor) = current {
        if is_element_named(&ancestor, NOISE_BLOCK_ELEMENTS) {
            return ancestor;
        }
        current = get_parent_node(&ancestor);
    }

    parent.clone()
}

/// 检查 style 属性是否包含某个声明（忽略大小写与空白）
fn style_declares(node: &Handle, declaration: &str) -> bool {
    let style: String = get_node_attr(node, "style")
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    style.contains(declaration)
}

/// 7. 删除含图片容器内绝对/固定定位且不含图片的覆盖层
pub(super) fn overlays(ctx: &Context) -> PassReport {
    let mut report = PassReport::new(Pass::Overlays);

    for node in ctx.elements() {
        if get_node_name(&node) == Some("img") || !ctx.is_attached(&node) {
            continue;
        }
        let positioned =
            style_declares(&node, "position:absolute") || style_declares(&node, "position:fixed");
        if !positioned || has_element(&node, &["img"]) {
            continue;
        }
        if has_image_container_ancestor(ctx, &node) {
            ctx.remove(&node, &mut report);
        }
    }

    report
}

fn has_image_container_ancestor(ctx: &Context, node: &Handle) -> bool {
    let mut current = get_parent_node(node);
    while let Some(ancestor) = current {
        if ctx.is_page_root(&ancestor) {
            break;
        }
        if has_element(&ancestor, &["img"]) {
            return true;
        }
        current = get_parent_node(&ancestor);
    }
    false
}

/// 链接数量、链接文本集合、列表文本长度
fn list_profile(list: &Handle) -> (usize, HashSet<String>, usize) {
    let links: Vec<Handle> = descendant_elements(list)
        .into_iter()
        .filter(|n| get_node_name(n) == Some("a"))
        .collect();
    let link_texts: HashSet<String> = links
        .iter()
        .map(|a| text_content(a).to_lowercase())
        .collect();
    (links.len(), link_texts, text_length(list))
}

fn only_utility_links(ctx: &Context, link_texts: &HashSet<String>) -> bool {
    !link_texts.is_empty()
        && link_texts
            .iter()
            .all(|t| ctx.sanitizer.utility_labels.contains(t))
}

/// 8. 删除工具链接列表：链接文本全是工具标签，或链接很少且文本很短
pub(super) fn utility_lists(ctx: &Context) -> PassReport {
    let mut report = PassReport::new(Pass::UtilityLists);

    for list in ctx.elements() {
        if !is_element_named(&list, &["ul", "ol"]) || !ctx.is_attached(&list) {
            continue;
        }
        let (links, link_texts, text_len) = list_profile(&list);
        if only_utility_links(ctx, &link_texts)
            || (links <= UTILITY_LIST_MAX_LINKS && text_len < UTILITY_LIST_MAX_TEXT)
        {
            ctx.remove(&list, &mut report);
        }
    }

    report
}

/// 8b. 删除页首的导航列表：body 前 10 个子元素中链接多而文本少的列表
pub(super) fn leading_lists(ctx: &Context) -> PassReport {
    let mut report = PassReport::new(Pass::LeadingLists);

    let leading: Vec<Handle> = ctx
        .body
        .children
        .borrow()
        .iter()
        .filter(|n| matches!(n.data, NodeData::Element { .. }))
        .take(LEADING_BLOCK_SCAN)
        .cloned()
        .collect();

    for list in leading {
        if !is_element_named(&list, &["ul", "ol"]) {
            continue;
        }
        let (links, link_texts, text_len) = list_profile(&list);
        if (links >= LEADING_LIST_MIN_LINKS && text_len < LEADING_LIST_MAX_TEXT)
            || only_utility_links(ctx, &link_texts)
        {
            ctx.remove(&list, &mut report);
        }
    }

    report
}

/// 9. 删除页首附近重复出现的书名横幅
pub(super) fn title_banners(ctx: &Context) -> PassReport {
    let mut report = PassReport::new(Pass::TitleBanners);
    let Some(pattern) = ctx.sanitizer.title_pattern.as_ref() else {
        return report;
    };

    for node in ctx.elements().into_iter().take(TITLE_BANNER_SCAN_LIMIT) {
        if !is_element_named(&node, TITLE_BANNER_ELEMENTS) || !ctx.is_attached(&node) {
            continue;
        }
        let text = text_content(&node);
        if text.is_empty() || text.chars().count() >= TITLE_BANNER_MAX_TEXT {
            continue;
        }
        if pattern.is_match(&text) && !has_element(&node, &["img"]) {
            ctx.remove(&node, &mut report);
        }
    }

    report
}

/// 10. 属性清理：删除事件处理器与 `data-*` 跟踪属性
///
/// 懒加载图片在删除 `data-*` 之前先把真实地址提升到 `src`。
pub(super) fn attribute_hygiene(ctx: &Context) -> PassReport {
    let mut report = PassReport::new(Pass::AttributeHygiene);

    for node in ctx.elements() {
        if get_node_name(&node) == Some("img") {
            promote_lazy_source(&node);
        }
        report.removed += remove_node_attrs(&node, |name| {
            let name = name.to_ascii_lowercase();
            name.starts_with("on") || name.starts_with("data-")
        });
    }

    report
}

fn promote_lazy_source(img: &Handle) {
    let has_src = get_node_attr(img, "src").map_or(false, |s| !s.trim().is_empty());
    if has_src {
        return;
    }
    let names = get_node_attr_names(img);
    for lazy_attr in LAZY_IMAGE_ATTRS {
        if names.iter().any(|n| n == lazy_attr) {
            if let Some(value) = get_node_attr(img, lazy_attr).filter(|v| !v.trim().is_empty()) {
                set_node_attr(img, "src", Some(value));
                return;
            }
        }
    }
}

/// 不依赖正文根节点的空容器清理，供清理之后的阶段复用
pub(super) fn prune_empty(body: &Handle) -> usize {
    let mut removed = 0;
    for node in descendant_elements(body).into_iter().rev() {
        if is_element_named(&node, EMPTY_CANDIDATES)
            && is_attached_to(&node, body)
            && is_empty_container(&node)
        {
            detach_node(&node);
            removed += 1;
        }
    }
    removed
}
