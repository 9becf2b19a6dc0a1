//! URL 与 data URL 工具函数
//!
//! 所有图片引用在进入资源嵌入器之前都要经过这里：解析 data URL、
//! 将协议相对 URL 补全为 https、根据源页面位置解析相对路径，
//! 以及把包内资源路径还原为资源名称。

use base64::prelude::*;
use percent_encoding::percent_decode_str;
pub use url::Url;

use crate::core::parse_content_type;

/// 协议相对 URL 使用的默认安全协议
pub const DEFAULT_SECURE_SCHEME: &str = "https";

/// 包内图片目录（相对于包内容根目录）
pub const PACKAGE_IMAGE_DIR: &str = "images";

/// 将二进制数据编码为 data URL
pub fn create_data_url(media_type: &str, data: &[u8]) -> String {
    let media_type = if media_type.is_empty() {
        "application/octet-stream"
    } else {
        media_type
    };

    format!("data:{};base64,{}", media_type, BASE64_STANDARD.encode(data))
}

/// 检查引用是否为 data URL
pub fn is_data_url(reference: &str) -> bool {
    reference
        .trim_start()
        .get(..5)
        .map_or(false, |scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// 解析 data URL，返回 (媒体类型, 数据)
///
/// 同时支持 base64 和百分号编码两种形式。格式错误时返回 `None`。
pub fn parse_data_url(reference: &str) -> Option<(String, Vec<u8>)> {
    let reference = reference.trim();
    if !is_data_url(reference) {
        return None;
    }

    let (header, payload) = reference[5..].split_once(',')?;
    let (media_type, _charset, is_base64) = parse_content_type(header);
    let media_type = if media_type.is_empty() {
        "text/plain".to_string()
    } else {
        media_type
    };

    let data = if is_base64 {
        // 保存的页面常在 base64 内容中夹带换行或空格
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = percent_decode_str(&compact).decode_utf8().ok()?;
        BASE64_STANDARD.decode(decoded.as_bytes()).ok()?
    } else {
        percent_decode_str(payload).collect()
    };

    Some((media_type, data))
}

/// 将图片引用解析为可抓取的绝对 URL
///
/// 协议相对引用（`//host/path`）补全为 `https:`，相对引用
/// 根据源页面的 URL 解析。无法解析时返回 `None`。
pub fn resolve_url(base: Option<&Url>, reference: &str) -> Option<Url> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    if let Some(rest) = reference.strip_prefix("//") {
        return Url::parse(&format!("{DEFAULT_SECURE_SCHEME}://{rest}")).ok();
    }

    match Url::parse(reference) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.and_then(|b| b.join(reference).ok()),
        Err(_) => None,
    }
}

/// 返回 URL 路径部分的小写扩展名（含点号）
pub fn url_suffix(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.last()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(format!(".{}", ext.to_lowercase()))
    }
}

/// 将包内资源引用还原为资源名称
///
/// 接受 `../images/a.png`、`images/a.png`、`./images/a.png`、带引号
/// 或查询串的写法，返回 `a.png`。不是包内图片路径时返回 `None`。
pub fn package_asset_name(reference: &str) -> Option<String> {
    let mut path = reference
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();

    if let Some(index) = path.find(['?', '#']) {
        path = &path[..index];
    }

    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix("../") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            break;
        }
    }

    let name = path.strip_prefix(PACKAGE_IMAGE_DIR)?.strip_prefix('/')?;
    if name.is_empty() || name.contains('/') {
        None
    } else {
        Some(name.to_string())
    }
}

/// 检查引用是否可以留在扁平化文档中（自包含或文档内锚点）
pub fn is_self_contained_reference(reference: &str) -> bool {
    let reference = reference.trim();
    reference.is_empty() || reference.starts_with('#') || is_data_url(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_data_url() {
        assert_eq!(
            create_data_url("image/png", b"abc"),
            "data:image/png;base64,YWJj"
        );
        assert_eq!(
            create_data_url("", b""),
            "data:application/octet-stream;base64,"
        );
    }

    #[test]
    fn test_parse_data_url_base64() {
        let (media_type, data) = parse_data_url("data:image/gif;base64,R0lG\nODlh").unwrap();
        assert_eq!(media_type, "image/gif");
        assert_eq!(data, b"GIF89a");
    }

    #[test]
    fn test_parse_data_url_percent_encoded() {
        let (media_type, data) = parse_data_url("data:image/svg+xml,%3Csvg%3E").unwrap();
        assert_eq!(media_type, "image/svg+xml");
        assert_eq!(data, b"<svg>");
    }

    #[test]
    fn test_parse_data_url_rejects_garbage() {
        assert!(parse_data_url("https://example.com/a.png").is_none());
        assert!(parse_data_url("data:image/png;base64").is_none());
        assert!(parse_data_url("data:image/png;base64,***").is_none());
    }

    #[test]
    fn test_resolve_url_protocol_relative() {
        let url = resolve_url(None, "//cdn.example.com/a.png").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/a.png");
    }

    #[test]
    fn test_resolve_url_relative_against_page() {
        let base = Url::parse("file:///books/saved/page_1.html").unwrap();
        let url = resolve_url(Some(&base), "page_1_files/cover.jpg").unwrap();
        assert_eq!(url.as_str(), "file:///books/saved/page_1_files/cover.jpg");
        assert!(resolve_url(None, "cover.jpg").is_none());
    }

    #[test]
    fn test_url_suffix() {
        let url = Url::parse("https://example.com/img/Photo.JPEG?x=1").unwrap();
        assert_eq!(url_suffix(&url).as_deref(), Some(".jpeg"));
        let url = Url::parse("https://example.com/img/").unwrap();
        assert_eq!(url_suffix(&url), None);
    }

    #[test]
    fn test_package_asset_name() {
        assert_eq!(
            package_asset_name("../images/img_1_1.png").as_deref(),
            Some("img_1_1.png")
        );
        assert_eq!(
            package_asset_name("'./images/img_1_2.jpg?v=3'").as_deref(),
            Some("img_1_2.jpg")
        );
        assert_eq!(
            package_asset_name("/images/img_2_3.gif#frag").as_deref(),
            Some("img_2_3.gif")
        );
        assert_eq!(package_asset_name("https://example.com/images/a.png"), None);
        assert_eq!(package_asset_name("../style/style.css"), None);
    }

    #[test]
    fn test_is_self_contained_reference() {
        assert!(is_self_contained_reference("#note-1"));
        assert!(is_self_contained_reference("DATA:image/png;base64,AA=="));
        assert!(!is_self_contained_reference("https://example.com/"));
        assert!(!is_self_contained_reference("../images/a.png"));
    }
}
