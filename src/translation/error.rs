//! 翻译模块统一错误处理

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 翻译服务返回了错误
    #[error("翻译服务错误: {0}")]
    TranslationServiceError(String),

    /// 响应解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 批量翻译返回的条数与输入不一致
    #[error("批量翻译返回 {actual} 条结果，期望 {expected} 条")]
    LengthMismatch { expected: usize, actual: usize },

    /// 重试耗尽
    #[error("翻译在 {attempts} 次尝试后仍然失败: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<TranslationError>,
    },
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::NetworkError(_) => true,
            TranslationError::TranslationServiceError(_) => true,
            TranslationError::LengthMismatch { .. } => true,
            TranslationError::ParseError(_) => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::Exhausted { .. } => false,
        }
    }
}

pub type TranslationResult<T> = Result<T, TranslationError>;
