use std::fs;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::FetchConfig;
use crate::core::{detect_media_type, parse_content_type};

/// 抓取到的资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAsset {
    pub data: Vec<u8>,
    /// 响应的媒体类型（不含参数），未知时为空
    pub content_type: String,
}

/// 单个资源的抓取错误，只影响该引用
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("cannot read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("cannot build HTTP client: {0}")]
    Client(String),
}

/// 把 URL 解析为字节与媒体类型
pub trait AssetFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchedAsset, FetchError>;
}

/// HTTP会话
///
/// 超时由配置决定，不做重试。`file://` 引用直接从磁盘读取：
/// 浏览器保存的页面把图片放在旁边的 `*_files/` 目录里。
pub struct Session {
    client: Client,
    user_agent: String,
}

impl Session {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    fn fetch_http(&self, url: &Url) -> Result<FetchedAsset, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let header_content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| parse_content_type(value).0)
            .unwrap_or_default();

        let data = response
            .bytes()
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?
            .to_vec();

        debug!(url = %url, bytes = data.len(), "fetched remote asset");

        Ok(FetchedAsset {
            data,
            content_type: header_content_type,
        })
    }

    fn fetch_file(&self, url: &Url) -> Result<FetchedAsset, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|_| FetchError::UnsupportedScheme(url.to_string()))?;

        let data = fs::read(&path).map_err(|source| FetchError::File {
            path: path.display().to_string(),
            source,
        })?;
        let content_type = detect_media_type(&data, url);

        Ok(FetchedAsset { data, content_type })
    }
}

impl AssetFetcher for Session {
    fn fetch(&self, url: &Url) -> Result<FetchedAsset, FetchError> {
        match url.scheme() {
            "http" | "https" => self.fetch_http(url),
            "file" => self.fetch_file(url),
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }
}
