//! # Bookbuilder Library
//!
//! 把一组保存下来的阅读器页面（每页一章，混杂着站点导航、评分提示、
//! 进度条、工具链接等外壳）整理成一本 EPUB，以及一个可交给 wkhtmltopdf
//! 渲染的扁平化 HTML 文档。
//!
//! ## 模块组织
//!
//! - `core` - 错误类型、构建选项与构建流程
//! - `config` - TOML 构建配置与清理词表
//! - `env` - 环境变量覆盖
//! - `discovery` - 源页面发现与排序
//! - `sanitizer` - 多遍 DOM 清理
//! - `gate` - 章节门控（接受、拒绝或重排）
//! - `embed` - 图片嵌入与命名
//! - `network` - 远程与本地图片抓取
//! - `translation` - 可选的文本翻译
//! - `book` - 书籍聚合：章节、资源、封面、元数据
//! - `builders` - EPUB 打包、扁平化文档与 PDF 渲染
//! - `parsers` - HTML 与 CSS 工具
//! - `utils` - URL 与 data URL 工具

pub mod book;
pub mod builders;
pub mod config;
pub mod core;
pub mod discovery;
pub mod embed;
pub mod env;
pub mod gate;
pub mod network;
pub mod parsers;
pub mod sanitizer;
pub mod translation;
pub mod utils;

// Re-export commonly used items for convenience
pub use crate::book::{Asset, Book, Chapter, Metadata};
pub use crate::config::{BuildConfig, ConfigError, Vocabulary};
pub use crate::core::{BookError, BookProcessor, BuildOptions, BuildSummary, OutputTargets};
pub use crate::discovery::SortMode;
pub use crate::network::{AssetFetcher, FetchError, FetchedAsset};
pub use crate::translation::Translator;
