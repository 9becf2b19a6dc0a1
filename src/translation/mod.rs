//! 翻译模块
//!
//! 可选的文本批量变换：清理后的文档中每个可见文本节点被替换为译文，
//! 文档结构保持不变。重试耗尽视为整次运行失败，宁可不输出也不输出
//! 半翻译的书。
//!
//! - **error**: 错误类型
//! - **service**: `Translator` trait、HTTP 翻译客户端、重试策略与文档翻译

pub mod error;
pub mod service;

pub use error::{TranslationError, TranslationResult};
pub use service::{HttpTranslator, RetryPolicy, TranslationAdapter, Translator};
