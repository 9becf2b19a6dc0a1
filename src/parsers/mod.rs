//! # 解析器模块
//!
//! - `html` - HTML文档解析、DOM操作、元数据、序列化
//! - `css` - CSS `url()` 引用重写

pub mod css;
pub mod html;

pub use css::rewrite_css_urls;
pub use html::{html_to_dom, parse_html, serialize_children, serialize_children_xhtml};
