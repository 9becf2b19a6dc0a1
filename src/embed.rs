//! 资源嵌入
//!
//! 把清理后文档中的每个图片引用改写为包内的唯一名称，并把二进制数据
//! 暂存到 `PageAssets`。名称形如 `img_<页面序号>_<全书计数>.<扩展名>`：
//! 页面前缀区分不同源文件，计数器由 `AssetRegistry` 持有，全书唯一且只增不减。
//!
//! 抓取或解码失败只影响该引用：图片被删除，文档继续处理。

use markup5ever_rcdom::Handle;
use tracing::{debug, warn};
use url::Url;

use crate::book::{chapter_reference, Asset, AssetRegistry, PageAssets};
use crate::core::{detect_media_type_by_file_name, extension_for_media_type};
use crate::network::AssetFetcher;
use crate::parsers::html::dom::{descendant_elements, detach_node, get_node_name};
use crate::parsers::html::{get_node_attr, set_node_attr};
use crate::sanitizer::CleanedDocument;
use crate::utils::url::{is_data_url, package_asset_name, parse_data_url, resolve_url, url_suffix};

/// 无法推断类型时使用的扩展名
const FALLBACK_EXTENSION: &str = ".bin";

/// URL 后缀推断时认可的图片扩展名
const KNOWN_IMAGE_SUFFIXES: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];

/// 响应式图片候选属性，改写后的图片不再需要
const CANDIDATE_ATTRS: &[&str] = &["srcset", "sizes"];

/// 页面资源名前缀
pub fn asset_prefix(page_position: usize) -> String {
    format!("img_{page_position}_")
}

/// 一次嵌入的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedReport {
    pub embedded: usize,
    /// 抓取或解码失败而删除的图片
    pub dropped: usize,
    /// 宽或高不超过 1 的跟踪像素
    pub tracking_pixels: usize,
    /// 已经指向包内资源、保持不变的引用
    pub already_local: usize,
}

pub struct AssetEmbedder<'a> {
    fetcher: &'a dyn AssetFetcher,
}

impl<'a> AssetEmbedder<'a> {
    pub fn new(fetcher: &'a dyn AssetFetcher) -> Self {
        Self { fetcher }
    }

    /// 嵌入文档中的全部图片
    ///
    /// 相对引用按 `base_url`（源页面的 `file://` 地址）解析。
    pub fn embed(
        &self,
        doc: &CleanedDocument,
        base_url: Option<&Url>,
        prefix: &str,
        registry: &mut AssetRegistry,
        staged: &mut PageAssets,
    ) -> EmbedReport {
        let mut report = EmbedReport::default();
        let Some(body) = doc.body() else {
            return report;
        };

        let images: Vec<Handle> = descendant_elements(&body)
            .into_iter()
            .filter(|n| get_node_name(n) == Some("img"))
            .collect();

        for img in images {
            let Some(src) = get_node_attr(&img, "src").filter(|s| !s.trim().is_empty()) else {
                continue;
            };

            if is_tracking_pixel(&img) {
                detach_node(&img);
                report.tracking_pixels += 1;
                continue;
            }

            let known_local = package_asset_name(&src)
                .map_or(false, |name| registry.get(&name).is_some() || staged.get(&name).is_some());
            if known_local {
                report.already_local += 1;
                continue;
            }

            let loaded = if is_data_url(&src) {
                load_data_url(&src)
            } else {
                self.load_remote(base_url, &src)
            };

            match loaded {
                Some((media_type, ext, data)) => {
                    let name = registry.allocate_name(prefix, &ext);
                    set_node_attr(&img, "src", Some(chapter_reference(&name)));
                    for attr in CANDIDATE_ATTRS {
                        set_node_attr(&img, attr, None);
                    }
                    staged.push(Asset {
                        name,
                        media_type,
                        data,
                    });
                    report.embedded += 1;
                }
                None => {
                    detach_node(&img);
                    report.dropped += 1;
                }
            }
        }

        debug!(
            source = doc.source_name.as_str(),
            embedded = report.embedded,
            dropped = report.dropped,
            "embedded page images"
        );

        report
    }

    /// 抓取远程或本地图片，返回 (媒体类型, 扩展名, 数据)
    fn load_remote(&self, base_url: Option<&Url>, src: &str) -> Option<(String, String, Vec<u8>)> {
        let Some(url) = resolve_url(base_url, src) else {
            warn!(reference = src, "cannot resolve image reference");
            return None;
        };

        let fetched = match self.fetcher.fetch(&url) {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(url = %url, error = %e, "image fetch failed, dropping reference");
                return None;
            }
        };

        let ext = extension_for_media_type(&fetched.content_type)
            .map(str::to_string)
            .or_else(|| url_suffix(&url).filter(|s| KNOWN_IMAGE_SUFFIXES.contains(&s.as_str())))
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

        let media_type = if ext == FALLBACK_EXTENSION {
            if fetched.content_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                fetched.content_type
            }
        } else {
            detect_media_type_by_file_name(&ext)
        };

        Some((media_type, ext, fetched.data))
    }
}

/// 解码 data URL，返回 (媒体类型, 扩展名, 数据)
fn load_data_url(src: &str) -> Option<(String, String, Vec<u8>)> {
    let Some((media_type, data)) = parse_data_url(src) else {
        warn!("malformed data URL image, dropping reference");
        return None;
    };
    let ext = extension_for_media_type(&media_type).unwrap_or(FALLBACK_EXTENSION);
    Some((media_type, ext.to_string(), data))
}

/// 声明的宽或高不超过 1 像素
fn is_tracking_pixel(img: &Handle) -> bool {
    ["width", "height"].iter().any(|attr| {
        get_node_attr(img, attr)
            .and_then(|value| leading_number(&value))
            .map_or(false, |n| n <= 1)
    })
}

fn leading_number(value: &str) -> Option<u64> {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
