//! # 工具模块
//!
//! - `url` - URL 解析、data URL 编解码、包内资源路径处理

pub mod url;

pub use url::{
    create_data_url, is_data_url, is_self_contained_reference, package_asset_name,
    parse_data_url, resolve_url, url_suffix, Url,
};
