use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use markup5ever_rcdom::RcDom;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::book::{Book, Metadata, PageAssets};
use crate::builders::{
    compose_flat_document, packaged_chapters, EpubWriter, PackageError, PageRenderer,
    WkhtmltopdfRenderer,
};
use crate::config::{BuildConfig, ConfigError};
use crate::discovery::{discover_pages, SortMode, SourcePage};
use crate::embed::{asset_prefix, AssetEmbedder};
use crate::gate::{ChapterGate, GateDecision};
use crate::network::{AssetFetcher, FetchError, Session};
use crate::parsers::html::{get_charset, html_to_dom};
use crate::sanitizer::Sanitizer;
use crate::translation::{
    HttpTranslator, RetryPolicy, TranslationAdapter, TranslationError, Translator,
};

/// 没有指定 `--css` 时使用的样式表
pub const DEFAULT_STYLESHEET: &str = "body{font-family:serif;line-height:1.4;margin:0 1em;}\n\
img{max-width:100%;height:auto;}\n\
h1{page-break-before:always;font-size:1.6em;margin:1em 0;}\n\
h2{font-size:1.3em;margin:1em 0;}\n\
p{margin:0.6em 0;}\n";

const FILE_SIGNATURES: [[&[u8]; 2]; 7] = [
    [b"GIF87a", b"image/gif"],
    [b"GIF89a", b"image/gif"],
    [b"\xFF\xD8\xFF", b"image/jpeg"],
    [b"\x89PNG\x0D\x0A\x1A\x0A", b"image/png"],
    [b"<svg ", b"image/svg+xml"],
    [b"RIFF....WEBPVP8 ", b"image/webp"],
    [b"\x00\x00\x01\x00", b"image/x-icon"],
];

/// 一次构建中可能出现的致命错误
///
/// 单个图片抓取失败、单个页面被门控拒绝、PDF 渲染失败都不会变成
/// `BookError`，它们只记录日志并让输出降级。
#[derive(Error, Debug)]
pub enum BookError {
    #[error("no HTML pages found in {0}")]
    NoSourcePages(String),

    #[error("no chapter with content survived cleaning")]
    NoChapters,

    #[error("invalid input directory: {0}")]
    InvalidInput(String),

    #[error("at least one output is required: --output (EPUB) or --pdf-output (PDF)")]
    NoOutputRequested,

    #[error("translation to '{target}' requested but the translator cannot be initialized: {source}")]
    TranslatorUnavailable {
        target: String,
        #[source]
        source: TranslationError,
    },

    #[error("translation of {page} failed: {source}")]
    Translation {
        page: String,
        #[source]
        source: TranslationError,
    },

    #[error("cannot write package: {0}")]
    Package(#[from] PackageError),

    #[error("cannot create HTTP session: {0}")]
    Session(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BookError {
    /// 进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            BookError::InvalidInput(_) | BookError::NoOutputRequested | BookError::Config(_) => 2,
            BookError::TranslatorUnavailable { .. } => 3,
            BookError::NoSourcePages(_)
            | BookError::NoChapters
            | BookError::Translation { .. }
            | BookError::Package(_)
            | BookError::Session(_)
            | BookError::Io(_) => 1,
        }
    }
}

/// 请求的输出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTargets {
    pub epub: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
    /// 渲染前的扁平化 HTML（调试用）
    pub pdf_dump: Option<PathBuf>,
}

impl OutputTargets {
    /// EPUB 与 PDF 都没有请求；调试转储不算输出
    pub fn is_empty(&self) -> bool {
        self.epub.is_none() && self.pdf.is_none()
    }

    fn wants_flat_document(&self) -> bool {
        self.pdf.is_some() || self.pdf_dump.is_some()
    }
}

/// 构建选项
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub input_dir: PathBuf,
    pub sort: SortMode,
    pub metadata: Metadata,
    /// 样式表内容；`None` 时使用 `DEFAULT_STYLESHEET`
    pub stylesheet: Option<String>,
    /// 翻译目标语言
    pub lang_out: Option<String>,
    pub outputs: OutputTargets,
}

impl BuildOptions {
    pub fn new(input_dir: impl Into<PathBuf>, outputs: OutputTargets) -> Self {
        Self {
            input_dir: input_dir.into(),
            sort: SortMode::default(),
            metadata: Metadata::default(),
            stylesheet: None,
            lang_out: None,
            outputs,
        }
    }

    /// 只有目标语言与书籍语言不同时才翻译
    pub fn translation_target(&self) -> Option<String> {
        let target = self.lang_out.as_deref()?.trim().to_lowercase();
        if target.is_empty() || target == self.metadata.language.trim().to_lowercase() {
            None
        } else {
            Some(target)
        }
    }

    pub fn stylesheet(&self) -> &str {
        self.stylesheet.as_deref().unwrap_or(DEFAULT_STYLESHEET)
    }
}

/// 一次构建的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub pages: usize,
    pub chapters: usize,
    pub skipped: usize,
    pub assets: usize,
    pub epub: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
    /// PDF 渲染失败的原因；EPUB 不受影响
    pub pdf_error: Option<String>,
}

/// 构建流程驱动
///
/// 页面按发现顺序逐个处理：清理、翻译（可选）、嵌入图片、门控，然后
/// 提交到 `Book`。所有页面处理完才开始写输出，因此翻译失败或没有
/// 章节时不会留下任何文件。
pub struct BookProcessor {
    options: BuildOptions,
    config: BuildConfig,
    fetcher: Option<Box<dyn AssetFetcher>>,
    translator: Option<Box<dyn Translator>>,
    renderer: Option<Box<dyn PageRenderer>>,
}

impl BookProcessor {
    pub fn new(options: BuildOptions, config: BuildConfig) -> Self {
        Self {
            options,
            config,
            fetcher: None,
            translator: None,
            renderer: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn AssetFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_translator(mut self, translator: Box<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// 执行完整构建
    pub fn run(mut self) -> Result<BuildSummary, BookError> {
        // 1. 验证输入与输出
        self.validate()?;

        // 2. 发现源页面
        let pages = discover_pages(&self.options.input_dir, self.options.sort)?;
        if pages.is_empty() {
            return Err(BookError::NoSourcePages(
                self.options.input_dir.display().to_string(),
            ));
        }
        info!(pages = pages.len(), input = %self.options.input_dir.display(), "found source pages");

        // 3. 编译词表
        let sanitizer = Sanitizer::new(&self.config.vocabulary)?;
        let gate = ChapterGate::new(&sanitizer, &self.config.vocabulary.utility_labels)?;

        // 4. 准备翻译器（目标语言与书籍语言相同时跳过）
        let translation = self.translation_adapter()?;

        // 5. 准备图片抓取
        let fetcher: Box<dyn AssetFetcher> = match self.fetcher.take() {
            Some(fetcher) => fetcher,
            None => Box::new(Session::new(&self.config.fetch)?),
        };
        let embedder = AssetEmbedder::new(fetcher.as_ref());

        // 6. 逐页处理并按顺序提交
        let mut book = Book::new(self.options.metadata.clone());
        let mut summary = BuildSummary {
            pages: pages.len(),
            ..BuildSummary::default()
        };
        let context = PageContext {
            sanitizer: &sanitizer,
            gate: &gate,
            embedder: &embedder,
            translation: translation.as_ref(),
        };
        for page in &pages {
            if !context.process(page, &mut book)? {
                summary.skipped += 1;
            }
        }

        // 7. 章节外壳的最终校验
        let chapters = packaged_chapters(&book);
        if chapters.is_empty() {
            return Err(BookError::NoChapters);
        }
        summary.chapters = chapters.len();
        summary.assets = book.assets().len();
        info!(chapters = chapters.len(), skipped = summary.skipped, "chapters ready");

        let stylesheet = self.options.stylesheet();

        // 8. 写出 EPUB
        if let Some(path) = &self.options.outputs.epub {
            EpubWriter::new(&book, stylesheet).write_file(&chapters, path)?;
            summary.epub = Some(path.clone());
        }

        // 9. 扁平化并渲染 PDF
        if self.options.outputs.wants_flat_document() {
            let flat =
                compose_flat_document(&book.metadata.title, &chapters, book.assets(), stylesheet);

            if let Some(dump) = &self.options.outputs.pdf_dump {
                match write_creating_parent(dump, flat.html.as_bytes()) {
                    Ok(()) => info!(output = %dump.display(), "saved flattened HTML"),
                    Err(e) => warn!(output = %dump.display(), error = %e, "cannot save flattened HTML"),
                }
            }

            if let Some(pdf) = &self.options.outputs.pdf {
                let renderer: Box<dyn PageRenderer> = match self.renderer.take() {
                    Some(renderer) => renderer,
                    None => Box::new(WkhtmltopdfRenderer::new(&self.config.render)),
                };
                match renderer.render(&flat.html, pdf) {
                    Ok(()) => summary.pdf = Some(pdf.clone()),
                    Err(e) => {
                        error!(output = %pdf.display(), error = %e, "PDF rendering failed");
                        summary.pdf_error = Some(e.to_string());
                    }
                }
            }
        }

        Ok(summary)
    }

    fn validate(&self) -> Result<(), BookError> {
        let input = &self.options.input_dir;
        if !input.is_dir() {
            return Err(BookError::InvalidInput(input.display().to_string()));
        }
        if self.options.outputs.is_empty() {
            return Err(BookError::NoOutputRequested);
        }
        Ok(())
    }

    fn translation_adapter(&mut self) -> Result<Option<TranslationAdapter>, BookError> {
        let Some(target) = self.options.translation_target() else {
            return Ok(None);
        };

        let translator: Box<dyn Translator> = match self.translator.take() {
            Some(translator) => translator,
            None => {
                let translator = HttpTranslator::new(&self.config.translation, &target)
                    .map_err(|source| BookError::TranslatorUnavailable {
                        target: target.clone(),
                        source,
                    })?;
                Box::new(translator)
            }
        };

        info!(target = %target, "translation enabled");
        Ok(Some(TranslationAdapter::new(
            translator,
            RetryPolicy::from_config(&self.config.translation),
        )))
    }
}

/// 单个页面处理所需的共享组件
struct PageContext<'a> {
    sanitizer: &'a Sanitizer,
    gate: &'a ChapterGate<'a>,
    embedder: &'a AssetEmbedder<'a>,
    translation: Option<&'a TranslationAdapter>,
}

impl PageContext<'_> {
    /// 处理一个页面；返回是否成为章节
    ///
    /// 只有翻译失败会中止整个构建。
    fn process(&self, page: &SourcePage, book: &mut Book) -> Result<bool, BookError> {
        let data = match page.read_markup() {
            Ok(data) => data,
            Err(e) => {
                warn!(page = %page.file_name, error = %e, "cannot read page, skipping");
                return Ok(false);
            }
        };

        let dom = EncodingProcessor::new().process_encoding(&data);
        let (doc, report) = self.sanitizer.sanitize(dom, &page.file_name);
        debug!(page = %page.file_name, removed = report.total_removed(), "page sanitized");

        if let Some(adapter) = self.translation {
            let translated =
                adapter
                    .translate_document(&doc)
                    .map_err(|source| BookError::Translation {
                        page: page.file_name.clone(),
                        source,
                    })?;
            debug!(page = %page.file_name, segments = translated, "page translated");
        }

        let base_url = page.base_url();
        let mut staged = PageAssets::new();
        let embed = self.embedder.embed(
            &doc,
            base_url.as_ref(),
            &asset_prefix(page.position),
            book.assets_mut(),
            &mut staged,
        );
        debug!(
            page = %page.file_name,
            embedded = embed.embedded,
            dropped = embed.dropped,
            pixels = embed.tracking_pixels,
            "images embedded"
        );

        match self.gate.evaluate(&doc, &page.stem()) {
            GateDecision::Reject(reason) => {
                warn!(page = %page.file_name, reason = %reason, "skipping page");
                Ok(false)
            }
            decision => {
                let reshaped = matches!(decision, GateDecision::Reshaped(_));
                let Some(draft) = decision.into_draft() else {
                    return Ok(false);
                };
                let chapter = book.commit_chapter(draft, staged);
                info!(
                    page = %page.file_name,
                    ordinal = chapter.ordinal,
                    title = %chapter.title,
                    reshaped,
                    "accepted chapter"
                );
                Ok(true)
            }
        }
    }
}

/// 编码处理器
///
/// 先按 UTF-8 解析；页面 `<meta>` 声明了其他有效字符集时按该字符集重新解析。
pub struct EncodingProcessor;

impl EncodingProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process_encoding(&self, input_data: &[u8]) -> RcDom {
        let dom = html_to_dom(input_data, "utf-8");

        if let Some(html_charset) = get_charset(&dom.document) {
            if let Some(encoding) = Encoding::for_label_no_replacement(html_charset.as_bytes()) {
                if encoding != encoding_rs::UTF_8 {
                    return html_to_dom(input_data, encoding.name());
                }
            }
        }

        dom
    }
}

impl Default for EncodingProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// 读取自定义样式表；文件不存在时退回默认样式表
pub fn load_stylesheet(path: Option<&Path>) -> io::Result<String> {
    match path {
        Some(path) if path.exists() => fs::read_to_string(path),
        Some(path) => {
            warn!(path = %path.display(), "stylesheet not found, using default");
            Ok(DEFAULT_STYLESHEET.to_string())
        }
        None => Ok(DEFAULT_STYLESHEET.to_string()),
    }
}

fn write_creating_parent(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)
}

/// Determines the media type of data based on its content signature
pub fn detect_media_type(data: &[u8], url: &Url) -> String {
    for signature in &FILE_SIGNATURES {
        if matches_signature(data, signature[0]) {
            return String::from_utf8_lossy(signature[1]).to_string();
        }
    }

    detect_media_type_by_file_name(url.path())
}

/// `.` 匹配任意字节
fn matches_signature(data: &[u8], signature: &[u8]) -> bool {
    data.len() >= signature.len()
        && signature
            .iter()
            .zip(data)
            .all(|(expected, actual)| *expected == b'.' || expected == actual)
}

/// Determines the media type based on file extension
pub fn detect_media_type_by_file_name(filename: &str) -> String {
    let filename_lowercased = filename.to_lowercase();

    if filename_lowercased.ends_with(".css") {
        "text/css".to_string()
    } else if filename_lowercased.ends_with(".svg") {
        "image/svg+xml".to_string()
    } else if filename_lowercased.ends_with(".png") {
        "image/png".to_string()
    } else if filename_lowercased.ends_with(".jpg") || filename_lowercased.ends_with(".jpeg") {
        "image/jpeg".to_string()
    } else if filename_lowercased.ends_with(".gif") {
        "image/gif".to_string()
    } else if filename_lowercased.ends_with(".webp") {
        "image/webp".to_string()
    } else if filename_lowercased.ends_with(".ico") {
        "image/x-icon".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

/// 包内图片文件的扩展名
pub fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    match media_type.trim().to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/svg+xml" => Some(".svg"),
        _ => None,
    }
}

/// Parses Content-Type header value
pub fn parse_content_type(content_type: &str) -> (String, String, bool) {
    let mut media_type = String::new();
    let mut charset = String::new();
    let mut is_base64 = false;

    let parts: Vec<&str> = content_type.split(';').collect();

    if !parts.is_empty() {
        media_type = parts[0].trim().to_lowercase();
    }

    for part in parts.iter().skip(1) {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("charset=") {
            charset = value.trim_matches('"').to_string();
        } else if part == "base64" {
            is_base64 = true;
        }
    }

    (media_type, charset, is_base64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(BookError::NoChapters.exit_code(), 1);
        assert_eq!(BookError::NoSourcePages("in".into()).exit_code(), 1);
        assert_eq!(BookError::InvalidInput("in".into()).exit_code(), 2);
        assert_eq!(BookError::NoOutputRequested.exit_code(), 2);
        assert_eq!(
            BookError::TranslatorUnavailable {
                target: "cs".into(),
                source: TranslationError::ConfigError("no url".into()),
            }
            .exit_code(),
            3
        );
        assert_eq!(
            BookError::Translation {
                page: "a.html".into(),
                source: TranslationError::NetworkError("down".into()),
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_translation_target_skips_same_language() {
        let mut options = BuildOptions::new("in", OutputTargets::default());
        options.metadata.language = "en".into();

        options.lang_out = Some("EN".into());
        assert_eq!(options.translation_target(), None);

        options.lang_out = Some(" ".into());
        assert_eq!(options.translation_target(), None);

        options.lang_out = Some("cs".into());
        assert_eq!(options.translation_target(), Some("cs".to_string()));
    }

    #[test]
    fn test_outputs_require_epub_or_pdf() {
        let dump_only = OutputTargets {
            pdf_dump: Some("dump.html".into()),
            ..OutputTargets::default()
        };
        assert!(dump_only.is_empty());
        assert!(!OutputTargets {
            epub: Some("book.epub".into()),
            ..OutputTargets::default()
        }
        .is_empty());
    }

    #[test]
    fn test_detect_media_type_by_signature() {
        let url = Url::parse("https://example.com/image").unwrap();
        assert_eq!(detect_media_type(b"GIF89a....", &url), "image/gif");
        assert_eq!(
            detect_media_type(b"RIFF\x10\x00\x00\x00WEBPVP8 data", &url),
            "image/webp"
        );
        assert_eq!(detect_media_type(b"??", &url), "application/octet-stream");
    }

    #[test]
    fn test_detect_media_type_by_file_name_case_insensitive() {
        assert_eq!(detect_media_type_by_file_name("PHOTO.JPG"), "image/jpeg");
        assert_eq!(detect_media_type_by_file_name(".jpeg"), "image/jpeg");
        assert_eq!(detect_media_type_by_file_name("a.b.png"), "image/png");
        assert_eq!(
            detect_media_type_by_file_name("file.unknown"),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_extension_for_media_type() {
        assert_eq!(extension_for_media_type("image/jpeg"), Some(".jpg"));
        assert_eq!(extension_for_media_type("IMAGE/PNG"), Some(".png"));
        assert_eq!(extension_for_media_type("text/html"), None);
    }

    #[test]
    fn test_parse_content_type_with_charset() {
        let (media_type, charset, is_base64) = parse_content_type("text/html; charset=\"utf-8\"");
        assert_eq!(media_type, "text/html");
        assert_eq!(charset, "utf-8");
        assert!(!is_base64);
    }

    #[test]
    fn test_parse_content_type_with_base64() {
        let (media_type, _, is_base64) = parse_content_type("image/gif;base64");
        assert_eq!(media_type, "image/gif");
        assert!(is_base64);
    }

    #[test]
    fn test_encoding_from_meta_charset() {
        let html = b"<html><head><meta charset=\"windows-1250\"></head><body><p>\x9Akola</p></body></html>";
        let dom = EncodingProcessor::new().process_encoding(html);
        let body = crate::parsers::html::get_body(&dom.document).unwrap();
        assert_eq!(crate::parsers::html::text_content(&body), "škola");
    }

    #[test]
    fn test_load_stylesheet_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.css");
        assert_eq!(load_stylesheet(Some(&missing)).unwrap(), DEFAULT_STYLESHEET);

        let custom = dir.path().join("custom.css");
        fs::write(&custom, "p{color:red}").unwrap();
        assert_eq!(load_stylesheet(Some(&custom)).unwrap(), "p{color:red}");
    }
}
