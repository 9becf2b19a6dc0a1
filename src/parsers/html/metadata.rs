//! 文档元数据提取
//!
//! 章节标题的来源依次为：第一个 `<h1>`、文档 `<title>`、文件名。
//! 字符集探测沿用 `<meta charset>` 与 `http-equiv` 两种写法。

use markup5ever_rcdom::Handle;

use super::dom::{find_nodes, get_node_attr, text_content};
use crate::core::parse_content_type;

/// 获取文档字符集
///
/// 支持 `<meta charset="...">` 和
/// `<meta http-equiv="content-type" content="text/html; charset=...">` 两种格式。
pub fn get_charset(node: &Handle) -> Option<String> {
    for meta_node in find_nodes(node, &["html", "head", "meta"]).iter() {
        if let Some(meta_charset_node_attr_value) = get_node_attr(meta_node, "charset") {
            return Some(meta_charset_node_attr_value);
        }

        if get_node_attr(meta_node, "http-equiv")
            .unwrap_or_default()
            .eq_ignore_ascii_case("content-type")
        {
            if let Some(meta_content_type_node_attr_value) = get_node_attr(meta_node, "content") {
                let (_media_type, charset, _is_base64) =
                    parse_content_type(&meta_content_type_node_attr_value);
                return Some(charset);
            }
        }
    }

    None
}

/// 获取文档标题（`<title>` 的可见文本），空标题视为不存在
pub fn get_title(node: &Handle) -> Option<String> {
    find_nodes(node, &["html", "head", "title"])
        .iter()
        .map(text_content)
        .find(|title| !title.is_empty())
}

/// 获取第一个 `<h1>` 的文本，空标题视为不存在
pub fn get_first_heading(node: &Handle) -> Option<String> {
    find_nodes(node, &["h1"])
        .first()
        .map(text_content)
        .filter(|heading| !heading.is_empty())
}
