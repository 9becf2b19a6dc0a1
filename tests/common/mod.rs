// 集成测试公共模块
//
// 提供假的抓取器、翻译器、渲染器以及页面目录构建工具

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use bookbuilder::builders::{PageRenderer, RenderError};
use bookbuilder::translation::{TranslationError, TranslationResult};
use bookbuilder::{
    AssetFetcher, BuildConfig, BuildOptions, FetchError, FetchedAsset, Metadata, OutputTargets,
    Translator,
};
use tempfile::TempDir;
use url::Url;

pub const PNG_BYTES: &[u8] = b"\x89PNG\x0D\x0A\x1A\x0Afake-image-data";

pub const PROSE: &str = "The river bends twice before it reaches the old mill, and every spring \
    the water rises high enough to cover the lowest step of the miller's house.";

/// 按 URL 返回固定内容，未知地址返回 404
#[derive(Default)]
pub struct MapFetcher {
    responses: HashMap<String, FetchedAsset>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, content_type: &str, data: &[u8]) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchedAsset {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        self
    }
}

impl AssetFetcher for MapFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchedAsset, FetchError> {
        self.responses
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// 每次调用都以网络错误失败
pub struct FailingTranslator {
    pub calls: Rc<Cell<usize>>,
}

impl Translator for FailingTranslator {
    fn translate_one(&self, _text: &str) -> TranslationResult<String> {
        self.calls.set(self.calls.get() + 1);
        Err(TranslationError::NetworkError("connection refused".to_string()))
    }
}

/// 按词表替换文本中的短语，其余文本原样返回
pub struct PhraseTranslator {
    pub phrases: Vec<(&'static str, &'static str)>,
}

impl Translator for PhraseTranslator {
    fn translate_one(&self, text: &str) -> TranslationResult<String> {
        Ok(self
            .phrases
            .iter()
            .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to)))
    }
}

/// 把 HTML 原样写到输出路径，便于检查扁平化结果
pub struct CapturingRenderer;

impl PageRenderer for CapturingRenderer {
    fn render(&self, html: &str, output: &Path) -> Result<(), RenderError> {
        fs::write(output, html)?;
        Ok(())
    }
}

/// 总是失败的渲染器
pub struct BrokenRenderer;

impl PageRenderer for BrokenRenderer {
    fn render(&self, _html: &str, _output: &Path) -> Result<(), RenderError> {
        Err(RenderError::Failed {
            status: "exit status: 1".to_string(),
            stderr: "Exit with code 1 due to network error".to_string(),
        })
    }
}

/// 收集日志输出，供断言日志条数
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 输入页面目录与输出目录
pub struct Workspace {
    pub root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("pages")).unwrap();
        Self { root }
    }

    pub fn add_page(&self, name: &str, html: &str) -> &Self {
        fs::write(self.input_dir().join(name), html).unwrap();
        self
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.path().join("pages")
    }

    pub fn out(&self, name: &str) -> PathBuf {
        self.root.path().join("out").join(name)
    }

    pub fn options(&self, outputs: OutputTargets) -> BuildOptions {
        let mut options = BuildOptions::new(self.input_dir(), outputs);
        options.metadata = Metadata {
            title: "River Book".to_string(),
            author: "A. Writer".to_string(),
            language: "en".to_string(),
        };
        options
    }

    pub fn epub_only(&self) -> BuildOptions {
        self.options(OutputTargets {
            epub: Some(self.out("book.epub")),
            ..OutputTargets::default()
        })
    }

    pub fn epub_and_pdf(&self) -> BuildOptions {
        self.options(OutputTargets {
            epub: Some(self.out("book.epub")),
            pdf: Some(self.out("book.pdf")),
            ..OutputTargets::default()
        })
    }
}

/// 翻译重试不等待
pub fn fast_config() -> BuildConfig {
    let mut config = BuildConfig::default();
    config.translation.max_attempts = 3;
    config.translation.base_delay_ms = 0;
    config
}

pub fn page(title: &str, body: &str) -> String {
    format!("<!DOCTYPE html><html><head><title>{title}</title></head><body>{body}</body></html>")
}

/// EPUB 中的条目名
pub fn entry_names(path: &Path) -> Vec<String> {
    let file = fs::File::open(path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    archive.file_names().map(str::to_string).collect()
}

pub fn read_entry(path: &Path, name: &str) -> String {
    let file = fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
}
