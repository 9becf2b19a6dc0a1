//! # 构建器模块
//!
//! 同一组已接受的章节被构建为两种结构完全不同的输出：
//!
//! - 分页的 EPUB 包（目录、阅读顺序、共享样式表、包内图片）
//! - 单个扁平化 HTML 文档，所有资源内联，供固定版式渲染
//!
//! # 模块组织
//!
//! - `epub` - EPUB 打包与章节外壳的二次有效性检查
//! - `flat` - 扁平化文档拼接与反向嵌入
//! - `render` - 调用外部渲染器生成 PDF

pub mod epub;
pub mod flat;
pub mod render;

pub use epub::{packaged_chapters, EpubWriter, PackageError};
pub use flat::{compose_flat_document, FlatDocument};
pub use render::{PageRenderer, RenderError, WkhtmltopdfRenderer};
