//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问。环境变量优先于配置文件，
//! 命令行参数优先于环境变量。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::DEFAULT.ok_or_else(|| EnvError {
                variable: Self::NAME.to_string(),
                message: "Required environment variable not set".to_string(),
            }),
        }
    }

    /// 仅在变量被显式设置时返回值
    fn get_override() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "BOOKBUILDER_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 禁用颜色输出
    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            // NO_COLOR 遵循标准：任何非空值都表示禁用颜色
            Ok(!value.is_empty())
        }
    }
}

/// 图片抓取相关环境变量
pub mod fetch {
    use super::*;

    /// 单次请求超时
    pub struct Timeout;
    impl EnvVar<Duration> for Timeout {
        const NAME: &'static str = "BOOKBUILDER_FETCH_TIMEOUT";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(20));
        const DESCRIPTION: &'static str = "Per-image fetch timeout in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_seconds(value, Self::NAME, 1, 300)
        }
    }

    /// User-Agent
    pub struct UserAgent;
    impl EnvVar<String> for UserAgent {
        const NAME: &'static str = "BOOKBUILDER_USER_AGENT";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "User-Agent header sent when fetching remote images";

        fn parse(value: &str) -> EnvResult<String> {
            let agent = value.trim();
            if agent.is_empty() {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "User agent must not be empty".to_string(),
                })
            } else {
                Ok(agent.to_string())
            }
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    /// API URL
    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "BOOKBUILDER_TRANSLATION_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Translation API endpoint URL";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok(crate::config::DEFAULT_TRANSLATION_API_URL.to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API URL must start with http:// or https://".to_string(),
                })
            }
        }
    }

    /// 最大尝试次数
    pub struct MaxAttempts;
    impl EnvVar<usize> for MaxAttempts {
        const NAME: &'static str = "BOOKBUILDER_TRANSLATION_MAX_ATTEMPTS";
        const DEFAULT: Option<usize> = Some(5);
        const DESCRIPTION: &'static str = "Attempts per translation call before the run is aborted";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 20)
        }
    }
}

/// 渲染相关环境变量
pub mod render {
    use super::*;

    /// wkhtmltopdf 可执行文件路径
    pub struct Wkhtmltopdf;
    impl EnvVar<String> for Wkhtmltopdf {
        const NAME: &'static str = "BOOKBUILDER_WKHTMLTOPDF";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Path to the wkhtmltopdf executable";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("wkhtmltopdf".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            let path = value.trim();
            if path.is_empty() {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Executable path must not be empty".to_string(),
                })
            } else {
                Ok(path.to_string())
            }
        }
    }
}

/// 辅助函数
fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_seconds(value: &str, var_name: &str, min: u64, max: u64) -> EnvResult<Duration> {
    let seconds = parse_positive_usize(value, var_name, min as usize, max as usize)?;
    Ok(Duration::from_secs(seconds as u64))
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let entries: [(&str, &str); 8] = [
        (core::LogLevel::NAME, core::LogLevel::DESCRIPTION),
        (core::NoColor::NAME, core::NoColor::DESCRIPTION),
        (fetch::Timeout::NAME, fetch::Timeout::DESCRIPTION),
        (fetch::UserAgent::NAME, fetch::UserAgent::DESCRIPTION),
        (translation::ApiUrl::NAME, translation::ApiUrl::DESCRIPTION),
        (translation::MaxAttempts::NAME, translation::MaxAttempts::DESCRIPTION),
        (render::Wkhtmltopdf::NAME, render::Wkhtmltopdf::DESCRIPTION),
        ("RUST_LOG", "Overrides the log filter with a tracing directive"),
    ];

    let mut docs = String::from("# Environment Variables\n\n");
    for (name, description) in entries {
        docs.push_str(&format!("- `{}`: {}\n", name, description));
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(core::LogLevel::parse("DEBUG").unwrap(), "debug");
        assert!(core::LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn test_no_color_parsing() {
        assert!(core::NoColor::parse("1").unwrap());
        assert!(!core::NoColor::parse("").unwrap());
    }

    #[test]
    fn test_url_validation() {
        assert!(translation::ApiUrl::parse("http://localhost:1188/translate").is_ok());
        assert!(translation::ApiUrl::parse("https://api.example.com").is_ok());
        assert!(translation::ApiUrl::parse("ftp://example.com").is_err());
        assert!(translation::ApiUrl::parse("not-a-url").is_err());
    }

    #[test]
    fn test_numeric_validation() {
        assert_eq!(translation::MaxAttempts::parse("3").unwrap(), 3);
        assert!(translation::MaxAttempts::parse("0").is_err());
        assert!(translation::MaxAttempts::parse("100").is_err());
        assert_eq!(
            fetch::Timeout::parse("15").unwrap(),
            Duration::from_secs(15)
        );
        assert!(fetch::Timeout::parse("soon").is_err());
    }

    #[test]
    fn test_env_override_only_when_set() {
        env::set_var("BOOKBUILDER_WKHTMLTOPDF", "/opt/wk/bin/wkhtmltopdf");
        assert_eq!(
            render::Wkhtmltopdf::get_override().unwrap().unwrap(),
            "/opt/wk/bin/wkhtmltopdf"
        );
        env::remove_var("BOOKBUILDER_WKHTMLTOPDF");
        assert!(render::Wkhtmltopdf::get_override().is_none());
        assert_eq!(render::Wkhtmltopdf::get().unwrap(), "wkhtmltopdf");
    }

    #[test]
    fn test_generate_env_docs() {
        let docs = generate_env_docs();
        assert!(docs.contains("BOOKBUILDER_TRANSLATION_API_URL"));
        assert!(docs.contains("NO_COLOR"));
    }
}
