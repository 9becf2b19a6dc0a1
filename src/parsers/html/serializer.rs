use std::io;

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use regex::Regex;

use super::dom::is_element_named;

/// XHTML 中需要自闭合的空元素
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// 序列化整个文档为 HTML
pub fn serialize_document(dom: RcDom) -> io::Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = dom.document.into();
    serialize(&mut buf, &serializable, SerializeOpts::default())?;
    Ok(buf)
}

/// 序列化节点的子节点为 HTML（不含节点自身的标签）
pub fn serialize_children(node: &Handle) -> io::Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    serialize(
        &mut buf,
        &serializable,
        SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..Default::default()
        },
    )?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// 序列化节点的子节点为格式良好的 XHTML 片段
///
/// 空元素自闭合，文本与属性值转义，注释与 doctype 丢弃，
/// 不合法的 XML 属性名直接跳过。
pub fn serialize_children_xhtml(node: &Handle) -> String {
    let attr_name_re = xml_name_regex();
    let mut out = String::new();
    for child in node.children.borrow().iter() {
        write_xhtml(child, &attr_name_re, &mut out);
    }
    out
}

fn xml_name_regex() -> Option<Regex> {
    Regex::new(r"^[A-Za-z_][-A-Za-z0-9_.]*$").ok()
}

fn write_xhtml(node: &Handle, attr_name_re: &Option<Regex>, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&escape_xml_text(&contents.borrow())),
        NodeData::Element { name, attrs, .. } => {
            let tag = name.local.as_ref();
            out.push('<');
            out.push_str(tag);
            for attr in attrs.borrow().iter() {
                let attr_name = attr.name.local.as_ref();
                let valid = attr_name_re
                    .as_ref()
                    .map_or(true, |re| re.is_match(attr_name));
                if !valid || attr_name == "xmlns" {
                    continue;
                }
                out.push(' ');
                out.push_str(attr_name);
                out.push_str("=\"");
                out.push_str(&escape_xml_attr(&attr.value));
                out.push('"');
            }

            if is_element_named(node, VOID_ELEMENTS) {
                out.push_str("/>");
                return;
            }

            out.push('>');
            for child in node.children.borrow().iter() {
                write_xhtml(child, attr_name_re, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeData::Document => {
            for child in node.children.borrow().iter() {
                write_xhtml(child, attr_name_re, out);
            }
        }
        _ => {}
    }
}

/// 转义 XML 文本内容
pub fn escape_xml_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 转义 XML 属性值
pub fn escape_xml_attr(text: &str) -> String {
    escape_xml_text(text).replace('"', "&quot;")
}
