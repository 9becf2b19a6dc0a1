//! # 网络模块
//!
//! 远程图片抓取。资源嵌入器只依赖 `AssetFetcher` trait，
//! 测试中可以换成内存实现。
//!
//! - `session` - HTTP会话管理、本地文件读取、资源下载

pub mod session;

pub use session::{AssetFetcher, FetchError, FetchedAsset, Session};
