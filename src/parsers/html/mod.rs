//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM操作（查找、摘除、文本统计）
//! - `metadata`: 文档元数据（标题、字符集、首个标题）
//! - `serializer`: HTML 与 XHTML 序列化

pub mod dom;
pub mod metadata;
pub mod serializer;

pub use dom::{
    append_child, count_elements, create_html_element, create_text_node, descendant_elements,
    descendants, detach_node, find_nodes, get_body, get_child_node_by_name, get_node_attr,
    get_node_name, get_parent_node, has_element, html_to_dom, is_ancestor_of, is_element_named,
    parse_html, set_node_attr, text_content, text_length,
};
pub use metadata::{get_charset, get_first_heading, get_title};
pub use serializer::{
    escape_xml_attr, escape_xml_text, serialize_children, serialize_children_xhtml,
    serialize_document,
};
