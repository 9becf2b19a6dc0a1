//! 扁平化文档
//!
//! 把已接受的章节按序号拼接成一个 HTML 文档，章节之间插入分页标记。
//! 外部渲染器看不到包内的资源目录，因此所有包内图片引用被反向嵌入为
//! data URL；其余既不自包含也不是文档内锚点的引用一律置空，防止渲染器
//! 发起网络请求。

use markup5ever_rcdom::Handle;
use tracing::warn;

use crate::book::{AssetRegistry, Chapter};
use crate::parsers::css::rewrite_css_urls;
use crate::parsers::html::dom::{
    descendant_elements, detach_node, get_node_name, get_text, remove_node_attrs, set_text,
};
use crate::parsers::html::{
    append_child, create_html_element, create_text_node, escape_xml_text, find_nodes,
    get_node_attr, parse_html, serialize_children_xhtml, serialize_document, set_node_attr,
    text_content,
};
use crate::utils::url::{create_data_url, is_self_contained_reference, package_asset_name};

/// 分页标记的样式
pub const PAGEBREAK_CSS: &str = "\n.pagebreak{ page-break-before: always; }\n";

/// 隐藏渲染器可能从页面元数据带出的页眉、页脚与标题
pub const HIDE_CHROME_CSS: &str = r#"
@page {
    margin: 0;
    size: A4;
    margin-top: 12mm;
    margin-right: 12mm;
    margin-bottom: 15mm;
    margin-left: 12mm;
}
.header, .footer, [class*="header-"], [class*="footer-"] {
    display: none !important;
    height: 0 !important;
    width: 0 !important;
    overflow: hidden !important;
}
.title, [class*="title"], [id*="title"] {
    display: none !important;
}
"#;

/// 承载资源引用的属性（按本地名匹配，`xlink:href` 也在其中）
const REFERENCE_ATTRS: &[&str] = &[
    "src",
    "data",
    "href",
    "poster",
    "background",
    "data-src",
    "data-original",
    "data-lazy-src",
];

/// 响应式图片候选属性
const CANDIDATE_ATTRS: &[&str] = &["srcset", "imagesrcset"];

/// 诊断时最多报告的遗留引用数量
const LEFTOVER_SAMPLE_LIMIT: usize = 5;

/// 被置空的引用
const NEUTRAL_REFERENCE: &str = "#";
const NEUTRAL_CSS_URL: &str = "data:,";

/// 扁平化结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatDocument {
    pub html: String,
    /// 仍不自包含的引用样本（正常情况下为空）
    pub leftovers: Vec<String>,
}

/// 拼接章节并完成反向嵌入
pub fn compose_flat_document(
    book_title: &str,
    chapters: &[&Chapter],
    assets: &AssetRegistry,
    stylesheet: &str,
) -> FlatDocument {
    let dom = parse_html(&concatenate(book_title, chapters, stylesheet));
    let document = dom.document.clone();

    for node in descendant_elements(&document) {
        match get_node_name(&node) {
            Some("link") => {
                detach_node(&node);
                continue;
            }
            Some("style") => inline_style_element(&node, assets),
            _ => {}
        }

        for attr in REFERENCE_ATTRS {
            if let Some(value) = get_node_attr(&node, attr) {
                if let Some(replacement) = rewrite_reference(&value, assets) {
                    set_node_attr(&node, attr, Some(replacement));
                }
            }
        }

        remove_node_attrs(&node, |name| {
            CANDIDATE_ATTRS
                .iter()
                .any(|candidate| name.eq_ignore_ascii_case(candidate))
        });

        if let Some(style) = get_node_attr(&node, "style") {
            set_node_attr(&node, "style", Some(inline_css(&style, assets)));
        }
    }

    inject_hide_chrome_style(&document);

    let leftovers = leftover_references(&document);
    if !leftovers.is_empty() {
        warn!(sample = ?leftovers, "flattened document still has external references");
    }

    let html = match serialize_document(dom) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(error = %e, "cannot serialize flattened document");
            String::new()
        }
    };

    FlatDocument { html, leftovers }
}

/// 按序号拼接章节；只有源页面真有 `<h1>` 的章节才在开头渲染标题
fn concatenate(book_title: &str, chapters: &[&Chapter], stylesheet: &str) -> String {
    let mut parts: Vec<String> = vec![
        "<!DOCTYPE html>".to_string(),
        "<html>".to_string(),
        "<head>".to_string(),
        r#"<meta charset="utf-8"/>"#.to_string(),
        format!("<title>{}</title>", escape_xml_text(book_title)),
        format!("<style>{stylesheet}{PAGEBREAK_CSS}</style>"),
        "</head>".to_string(),
        "<body>".to_string(),
    ];

    for (index, chapter) in chapters.iter().enumerate() {
        if index > 0 {
            parts.push(r#"<div class="pagebreak"></div>"#.to_string());
        }
        if chapter.render_heading {
            parts.push(format!("<h1>{}</h1>", escape_xml_text(&chapter.title)));
            parts.push(without_leading_heading(&chapter.body_markup, &chapter.title));
        } else {
            parts.push(chapter.body_markup.clone());
        }
    }

    parts.push("</body>".to_string());
    parts.push("</html>".to_string());
    parts.join("\n")
}

/// 去掉与章节标题相同的第一个 `<h1>`，避免标题在扁平化文档中重复
fn without_leading_heading(body_markup: &str, title: &str) -> String {
    let dom = parse_html(body_markup);
    let Some(body) = find_nodes(&dom.document, &["html", "body"]).into_iter().next() else {
        return body_markup.to_string();
    };
    let Some(heading) = find_nodes(&body, &["h1"]).into_iter().next() else {
        return body_markup.to_string();
    };
    if text_content(&heading) != title.trim() {
        return body_markup.to_string();
    }

    detach_node(&heading);
    serialize_children_xhtml(&body)
}

/// 包内资源改写为 data URL；自包含引用与邮件链接保留；其余置空
///
/// 返回 `None` 表示保留原值。
fn rewrite_reference(value: &str, assets: &AssetRegistry) -> Option<String> {
    if let Some(asset) = package_asset_name(value).and_then(|name| assets.get(&name)) {
        return Some(create_data_url(&asset.media_type, &asset.data));
    }
    if is_self_contained_reference(value) || is_inert_scheme(value) {
        return None;
    }
    Some(NEUTRAL_REFERENCE.to_string())
}

fn is_inert_scheme(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    lower.starts_with("mailto:") || lower.starts_with("javascript:")
}

/// CSS `url()`：包内资源内联，其余不自包含的地址置空
fn inline_css(css: &str, assets: &AssetRegistry) -> String {
    rewrite_css_urls(css, &mut |url| {
        if let Some(asset) = package_asset_name(url).and_then(|name| assets.get(&name)) {
            return Some(create_data_url(&asset.media_type, &asset.data));
        }
        if is_self_contained_reference(url) {
            None
        } else {
            Some(NEUTRAL_CSS_URL.to_string())
        }
    })
}

fn inline_style_element(node: &Handle, assets: &AssetRegistry) {
    for child in node.children.borrow().iter() {
        if let Some(css) = get_text(child) {
            set_text(child, &inline_css(&css, assets));
        }
    }
}

fn inject_hide_chrome_style(document: &Handle) {
    let Some(head) = find_nodes(document, &["html", "head"]).into_iter().next() else {
        return;
    };
    let style = create_html_element("style");
    set_node_attr(&style, "type", Some("text/css".to_string()));
    append_child(&style, create_text_node(HIDE_CHROME_CSS));
    append_child(&head, style);
}

/// 采样仍不自包含的引用
fn leftover_references(document: &Handle) -> Vec<String> {
    let mut sample = Vec::new();
    for node in descendant_elements(document) {
        for attr in REFERENCE_ATTRS {
            let Some(value) = get_node_attr(&node, attr) else {
                continue;
            };
            if !is_self_contained_reference(&value) && !is_inert_scheme(&value) {
                sample.push(value);
                if sample.len() >= LEFTOVER_SAMPLE_LIMIT {
                    return sample;
                }
            }
        }
    }
    sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Asset, Book, ChapterDraft, Metadata, PageAssets};
    use crate::utils::url::parse_data_url;

    fn chapter(title: &str, body: &str, render_heading: bool) -> ChapterDraft {
        ChapterDraft {
            title: title.to_string(),
            body_markup: body.to_string(),
            render_heading,
            source_name: format!("{title}.html"),
        }
    }

    fn book_with_image() -> Book {
        let mut book = Book::new(Metadata::default());
        let name = book.assets_mut().allocate_name("img_1_", ".gif");
        let mut staged = PageAssets::new();
        staged.push(Asset {
            name: name.clone(),
            media_type: "image/gif".to_string(),
            data: b"GIF89a-pixels".to_vec(),
        });
        book.commit_chapter(
            chapter(
                "Opening",
                &format!(r#"<h1>Opening</h1><p>Text</p><img src="../images/{name}"/>"#),
                true,
            ),
            staged,
        );
        book.commit_chapter(
            chapter(
                "page-2",
                r##"<p style="background: url('https://cdn.example.com/bg.png')">More <a href="https://example.com/x">link</a> <a href="#note">note</a></p><img src="x.png" srcset="x2.png 2x"/>"##,
                false,
            ),
            PageAssets::new(),
        );
        book
    }

    fn compose(book: &Book) -> FlatDocument {
        let chapters: Vec<&Chapter> = book.chapters().iter().collect();
        compose_flat_document("Book", &chapters, book.assets(), "body{}")
    }

    #[test]
    fn test_pagebreak_only_between_chapters() {
        let flat = compose(&book_with_image());
        assert_eq!(flat.html.matches(r#"class="pagebreak""#).count(), 1);
        assert!(flat.html.contains(".pagebreak{ page-break-before: always; }"));
    }

    #[test]
    fn test_heading_rendered_once_only_when_flagged() {
        let flat = compose(&book_with_image());
        assert_eq!(flat.html.matches("<h1>").count(), 1);
        assert!(flat.html.contains("<h1>Opening</h1>"));
        assert!(!flat.html.contains("page-2</h1>"));
    }

    #[test]
    fn test_package_image_inlined_byte_identical() {
        let book = book_with_image();
        let flat = compose(&book);

        let dom = parse_html(&flat.html);
        let img = find_nodes(&dom.document, &["img"]).remove(0);
        let src = get_node_attr(&img, "src").unwrap();
        let (media_type, data) = parse_data_url(&src).unwrap();

        assert_eq!(media_type, "image/gif");
        assert_eq!(data, b"GIF89a-pixels");
    }

    #[test]
    fn test_external_references_neutralized() {
        let flat = compose(&book_with_image());

        assert!(!flat.html.contains("https://"));
        assert!(!flat.html.contains("srcset"));
        assert!(flat.html.contains(r##"href="#note""##));
        assert!(flat.html.contains("data:,"));
        assert!(flat.leftovers.is_empty());
    }

    #[test]
    fn test_stylesheet_imports_neutralized() {
        let book = book_with_image();
        let chapters: Vec<&Chapter> = book.chapters().iter().collect();
        let flat = compose_flat_document(
            "Book",
            &chapters,
            book.assets(),
            r#"@import "https://fonts.example.com/serif.css"; h1 { background: image-set("https://cdn.example.com/h.png" 1x) }"#,
        );

        assert!(!flat.html.contains("fonts.example.com"));
        assert!(!flat.html.contains("cdn.example.com"));
        assert!(flat.html.contains("@import"));
    }

    #[test]
    fn test_links_removed_and_chrome_css_injected() {
        let mut book = Book::new(Metadata::default());
        book.commit_chapter(
            chapter("a", r#"<link rel="stylesheet" href="https://x/y.css"/><p>x</p>"#, false),
            PageAssets::new(),
        );
        let flat = compose(&book);

        assert!(!flat.html.contains("<link"));
        assert!(flat.html.contains(r#"[class*="footer-"]"#));
    }
}
