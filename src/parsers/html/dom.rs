use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// 不计入可见文本的元素
const INVISIBLE_TEXT_ELEMENTS: &[&str] = &["script", "style", "template", "noscript"];

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_html(&s)
}

/// 解析 HTML 字符串
pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// 查找指定路径的DOM节点
pub fn find_nodes(node: &Handle, node_names: &[&str]) -> Vec<Handle> {
    let mut found_nodes = Vec::new();
    let Some((node_name, rest)) = node_names.split_first() else {
        return found_nodes;
    };

    let matches = get_node_name(node) == Some(*node_name);

    if matches && rest.is_empty() {
        found_nodes.push(node.clone());
    }

    if matches && !rest.is_empty() {
        for child_node in node.children.borrow().iter() {
            found_nodes.append(&mut find_nodes(child_node, rest));
        }
    } else {
        for child_node in node.children.borrow().iter() {
            found_nodes.append(&mut find_nodes(child_node, node_names));
        }
    }

    found_nodes
}

/// 获取文档的 body 元素
pub fn get_body(document: &Handle) -> Option<Handle> {
    find_nodes(document, &["html", "body"]).into_iter().next()
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    parent
        .children
        .borrow()
        .iter()
        .find(|child| get_node_name(child) == Some(node_name))
        .cloned()
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点全部属性名
pub fn get_node_attr_names(node: &Handle) -> Vec<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| attr.name.local.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 检查节点是否为指定名称之一的元素
pub fn is_element_named(node: &Handle, names: &[&str]) -> bool {
    get_node_name(node).map_or(false, |name| names.contains(&name))
}

/// 获取父节点
///
/// `parent` 是 `Cell<Option<Weak>>`，读取后必须放回。
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 设置节点属性，`None` 表示删除
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs_mut = attrs.borrow_mut();
        let existing = attrs_mut
            .iter()
            .position(|attr| &*attr.name.local == attr_name);

        match (existing, attr_value) {
            (Some(i), Some(value)) => {
                attrs_mut[i].value.clear();
                attrs_mut[i].value.push_slice(&value);
            }
            (Some(i), None) => {
                attrs_mut.remove(i);
            }
            (None, Some(value)) => attrs_mut.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                value: format_tendril!("{}", value),
            }),
            (None, None) => {}
        }
    }
}

/// 删除满足条件的属性，返回删除数量
pub fn remove_node_attrs<F>(node: &Handle, predicate: F) -> usize
where
    F: Fn(&str) -> bool,
{
    match &node.data {
        NodeData::Element { attrs, .. } => {
            let mut attrs_mut = attrs.borrow_mut();
            let before = attrs_mut.len();
            attrs_mut.retain(|attr| !predicate(&*attr.name.local));
            before - attrs_mut.len()
        }
        _ => 0,
    }
}

/// 将节点从父节点中摘除
pub fn detach_node(node: &Handle) {
    if let Some(parent) = get_parent_node(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

/// 追加子节点
pub fn append_child(parent: &Handle, child: Handle) {
    detach_node(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 移除所有子节点
pub fn clear_children(node: &Handle) {
    let children: Vec<Handle> = node.children.borrow_mut().drain(..).collect();
    for child in children {
        child.parent.set(None);
    }
}

/// 创建文本节点
pub fn create_text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

/// 创建不带属性的 HTML 元素
pub fn create_html_element(name: &str) -> Handle {
    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(name)),
        attrs: RefCell::new(Vec::new()),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 文本节点内容
pub fn get_text(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 替换文本节点内容
pub fn set_text(node: &Handle, text: &str) {
    if let NodeData::Text { contents } = &node.data {
        let mut contents = contents.borrow_mut();
        contents.clear();
        contents.push_slice(text);
    }
}

/// 先序遍历的全部后代节点（不含自身）
pub fn descendants(node: &Handle) -> Vec<Handle> {
    let mut result = Vec::new();
    let mut stack: Vec<Handle> = node.children.borrow().iter().rev().cloned().collect();

    while let Some(current) = stack.pop() {
        stack.extend(current.children.borrow().iter().rev().cloned());
        result.push(current);
    }

    result
}

/// 先序遍历的全部后代元素（不含自身）
pub fn descendant_elements(node: &Handle) -> Vec<Handle> {
    descendants(node)
        .into_iter()
        .filter(|n| matches!(n.data, NodeData::Element { .. }))
        .collect()
}

/// 后代中指定名称元素的数量（不含自身）
pub fn count_elements(node: &Handle, names: &[&str]) -> usize {
    descendants(node)
        .iter()
        .filter(|n| is_element_named(n, names))
        .count()
}

/// 后代中是否存在指定名称的元素
pub fn has_element(node: &Handle, names: &[&str]) -> bool {
    let mut stack: Vec<Handle> = node.children.borrow().iter().cloned().collect();
    while let Some(current) = stack.pop() {
        if is_element_named(&current, names) {
            return true;
        }
        stack.extend(current.children.borrow().iter().cloned());
    }
    false
}

/// 可见文本：每段文本去掉首尾空白后以单个空格连接
pub fn text_content(node: &Handle) -> String {
    let mut parts: Vec<String> = Vec::new();
    collect_text(node, &mut parts);
    parts.join(" ")
}

/// 可见文本的字符数
pub fn text_length(node: &Handle) -> usize {
    text_content(node).chars().count()
}

fn collect_text(node: &Handle, parts: &mut Vec<String>) {
    match &node.data {
        NodeData::Text { contents } => {
            let text = contents.borrow();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
        NodeData::Element { .. } if is_element_named(node, INVISIBLE_TEXT_ELEMENTS) => {}
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, parts);
            }
        }
    }
}

/// 检查 `ancestor` 是否为 `node` 的祖先（不含自身）
pub fn is_ancestor_of(ancestor: &Handle, node: &Handle) -> bool {
    let mut current = get_parent_node(node);
    while let Some(parent) = current {
        if Rc::ptr_eq(&parent, ancestor) {
            return true;
        }
        current = get_parent_node(&parent);
    }
    false
}

/// 检查节点是否仍挂在 `root` 之下
pub fn is_attached_to(node: &Handle, root: &Handle) -> bool {
    Rc::ptr_eq(node, root) || is_ancestor_of(root, node)
}
