//! 翻译服务
//!
//! `Translator` 是纯文本变换：输入有序的字符串列表，输出等长的译文列表。
//! 支持批量的实现一次提交整批，否则逐条翻译。每次调用都经过
//! `RetryPolicy` 做指数退避重试。

use std::thread;
use std::time::Duration;

use markup5ever_rcdom::{Handle, NodeData};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TranslationConfig;
use crate::parsers::html::dom::{descendants, get_text, set_text};
use crate::sanitizer::CleanedDocument;
use crate::translation::error::{TranslationError, TranslationResult};

/// 文本翻译器
pub trait Translator {
    fn translate_one(&self, text: &str) -> TranslationResult<String>;

    /// 默认逐条翻译
    fn translate_batch(&self, texts: &[String]) -> TranslationResult<Vec<String>> {
        texts.iter().map(|text| self.translate_one(text)).collect()
    }

    /// 为真时 `TranslationAdapter` 对整批只调用一次 `translate_batch`
    fn supports_batch(&self) -> bool {
        false
    }
}

/// DeepLX 兼容接口的请求体
#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

/// DeepLX 兼容接口的响应体
#[derive(Debug, Deserialize)]
struct TranslateResponse {
    code: u16,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// 基于 HTTP JSON 接口的翻译器
pub struct HttpTranslator {
    client: Client,
    api_url: Url,
    source_lang: String,
    target_lang: String,
}

impl HttpTranslator {
    pub fn new(config: &TranslationConfig, target_lang: &str) -> TranslationResult<Self> {
        let api_url = Url::parse(&config.api_url).map_err(|e| {
            TranslationError::ConfigError(format!("无效的翻译API地址 '{}': {e}", config.api_url))
        })?;

        if target_lang.trim().is_empty() {
            return Err(TranslationError::ConfigError("目标语言不能为空".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TranslationError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            source_lang: config.source_lang.clone(),
            target_lang: target_lang.to_string(),
        })
    }
}

impl Translator for HttpTranslator {
    fn translate_one(&self, text: &str) -> TranslationResult<String> {
        let request = TranslateRequest {
            text,
            source_lang: &self.source_lang,
            target_lang: &self.target_lang,
        };

        let response = self
            .client
            .post(self.api_url.as_str())
            .json(&request)
            .send()
            .map_err(|e| TranslationError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::TranslationServiceError(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .map_err(|e| TranslationError::NetworkError(e.to_string()))?;
        parse_response(&body)
    }
}

/// 解析接口响应：`code` 为 200 且带有 `data` 时成功
fn parse_response(body: &str) -> TranslationResult<String> {
    let response: TranslateResponse =
        serde_json::from_str(body).map_err(|e| TranslationError::ParseError(e.to_string()))?;

    match (response.code, response.data) {
        (200, Some(data)) => Ok(data),
        (code, _) => Err(TranslationError::TranslationServiceError(format!(
            "code {code}: {}",
            response.message.unwrap_or_default()
        ))),
    }
}

/// 指数退避重试策略：第 n 次失败后等待 `base_delay * 2^n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(16) as u32);
        self.base_delay.saturating_mul(factor)
    }

    /// 执行操作直到成功、遇到不可重试的错误或用尽尝试次数
    pub fn run<T, F>(&self, mut operation: F) -> TranslationResult<T>
    where
        F: FnMut() -> TranslationResult<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match operation() {
                Ok(value) => {
                    if attempt > 0 {
                        info!("翻译在第 {} 次重试后成功", attempt);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt + 1 < attempts {
                        let delay = self.delay_for(attempt);
                        warn!(
                            "翻译失败，{:.1}秒后进行第 {} 次重试: {}",
                            delay.as_secs_f32(),
                            attempt + 1,
                            e
                        );
                        thread::sleep(delay);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(TranslationError::Exhausted {
            attempts,
            last: Box::new(last_error.unwrap_or_else(|| {
                TranslationError::TranslationServiceError("no attempt was made".to_string())
            })),
        })
    }
}

/// 翻译适配器：批量变换加重试，负责保持顺序与条数
pub struct TranslationAdapter {
    translator: Box<dyn Translator>,
    policy: RetryPolicy,
}

impl TranslationAdapter {
    pub fn new(translator: Box<dyn Translator>, policy: RetryPolicy) -> Self {
        Self { translator, policy }
    }

    /// 翻译一批文本，返回等长的译文
    pub fn translate_texts(&self, texts: &[String]) -> TranslationResult<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if self.translator.supports_batch() {
            return self.policy.run(|| {
                let translated = self.translator.translate_batch(texts)?;
                if translated.len() != texts.len() {
                    return Err(TranslationError::LengthMismatch {
                        expected: texts.len(),
                        actual: translated.len(),
                    });
                }
                Ok(translated)
            });
        }

        texts
            .iter()
            .map(|text| self.policy.run(|| self.translator.translate_one(text)))
            .collect()
    }

    /// 原地翻译正文中的可见文本节点
    ///
    /// `<head>` 里的 `<title>` 不翻译，章节门控用它与外壳书名比对。
    /// 只替换文本内容，元素、图片与链接保持不变；文本两端的空白原样保留。
    /// 返回翻译的文本节点数量。
    pub fn translate_document(&self, doc: &CleanedDocument) -> TranslationResult<usize> {
        let nodes: Vec<Handle> = doc
            .body()
            .map(|body| translatable_text_nodes(&body))
            .unwrap_or_default();

        let texts: Vec<String> = nodes
            .iter()
            .filter_map(get_text)
            .map(|text| text.trim().to_string())
            .collect();
        if texts.is_empty() {
            return Ok(0);
        }

        let translated = self.translate_texts(&texts)?;
        for (node, new_text) in nodes.iter().zip(translated.iter()) {
            if let Some(original) = get_text(node) {
                set_text(node, &replace_core(&original, new_text));
            }
        }

        debug!(
            source = doc.source_name.as_str(),
            nodes = texts.len(),
            "translated page"
        );
        Ok(texts.len())
    }
}

/// 需要翻译的文本节点：至少包含一个字母
fn translatable_text_nodes(root: &Handle) -> Vec<Handle> {
    descendants(root)
        .into_iter()
        .filter(|n| match &n.data {
            NodeData::Text { contents } => contents.borrow().chars().any(char::is_alphabetic),
            _ => false,
        })
        .collect()
}

/// 保留原文两端的空白，只替换中间的文本
fn replace_core(original: &str, translated: &str) -> String {
    let leading_len = original.len() - original.trim_start().len();
    let trailing_start = original.trim_end().len();
    let leading = &original[..leading_len];
    let trailing = if trailing_start >= leading_len {
        &original[trailing_start..]
    } else {
        ""
    };
    format!("{leading}{}{trailing}", translated.trim())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::parsers::html::{find_nodes, get_title, parse_html, text_content};

    /// 把文本转为大写的假翻译器，可设定前 n 次调用失败
    struct UppercaseTranslator {
        failures: Cell<usize>,
        calls: Rc<Cell<usize>>,
        batch: bool,
    }

    impl UppercaseTranslator {
        fn new(failures: usize, batch: bool) -> (Self, Rc<Cell<usize>>) {
            let calls = Rc::new(Cell::new(0));
            let translator = Self {
                failures: Cell::new(failures),
                calls: Rc::clone(&calls),
                batch,
            };
            (translator, calls)
        }
    }

    impl Translator for UppercaseTranslator {
        fn translate_one(&self, text: &str) -> TranslationResult<String> {
            self.calls.set(self.calls.get() + 1);
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(TranslationError::NetworkError("connection reset".to_string()));
            }
            Ok(text.to_uppercase())
        }

        fn supports_batch(&self) -> bool {
            self.batch
        }
    }

    fn no_delay(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_retry_recovers_from_transient_failures() {
        let (translator, calls) = UppercaseTranslator::new(2, false);
        let adapter = TranslationAdapter::new(Box::new(translator), no_delay(5));

        let result = adapter.translate_texts(&["hello".to_string()]).unwrap();

        assert_eq!(result, vec!["HELLO"]);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_retry_exhaustion_is_reported() {
        let (translator, calls) = UppercaseTranslator::new(10, true);
        let adapter = TranslationAdapter::new(Box::new(translator), no_delay(3));

        let result = adapter.translate_texts(&["a".to_string(), "b".to_string()]);

        assert!(matches!(
            result,
            Err(TranslationError::Exhausted { attempts: 3, .. })
        ));
        assert!(calls.get() >= 3);
    }

    #[test]
    fn test_non_retryable_error_stops_immediately() {
        struct Broken;
        impl Translator for Broken {
            fn translate_one(&self, _text: &str) -> TranslationResult<String> {
                Err(TranslationError::ParseError("not json".to_string()))
            }
        }
        let adapter = TranslationAdapter::new(Box::new(Broken), no_delay(5));
        assert!(matches!(
            adapter.translate_texts(&["x".to_string()]),
            Err(TranslationError::ParseError(_))
        ));
    }

    #[test]
    fn test_translate_document_keeps_structure() {
        let (translator, _) = UppercaseTranslator::new(0, true);
        let adapter = TranslationAdapter::new(Box::new(translator), no_delay(1));
        let doc = CleanedDocument {
            dom: parse_html(
                "<html><head><title>First</title></head>\
                 <body><p>One <a href=\"#n\">two</a> three</p><p>42</p><img src=\"a.png\"></body></html>",
            ),
            source_name: "p.html".to_string(),
        };

        let translated = adapter.translate_document(&doc).unwrap();

        assert_eq!(translated, 3);
        assert_eq!(get_title(&doc.dom.document).as_deref(), Some("First"));
        let body = doc.body().unwrap();
        assert_eq!(text_content(&body), "ONE TWO THREE 42");
        assert_eq!(find_nodes(&body, &["a"]).len(), 1);
        assert_eq!(find_nodes(&body, &["img"]).len(), 1);
    }

    #[test]
    fn test_replace_core_keeps_whitespace() {
        assert_eq!(replace_core("  hello\n", "ciao"), "  ciao\n");
        assert_eq!(replace_core("hello", " ciao "), "ciao");
        assert_eq!(replace_core("   ", "x"), "   x");
    }

    #[test]
    fn test_invalid_api_url_is_config_error() {
        let config = TranslationConfig {
            api_url: "not a url".to_string(),
            ..TranslationConfig::default()
        };
        assert!(matches!(
            HttpTranslator::new(&config, "de"),
            Err(TranslationError::ConfigError(_))
        ));
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(
            parse_response(r#"{"code":200,"data":"Ahoj","id":7}"#).unwrap(),
            "Ahoj"
        );
        assert!(matches!(
            parse_response(r#"{"code":429,"message":"Too Many Requests"}"#),
            Err(TranslationError::TranslationServiceError(_))
        ));
        assert!(matches!(
            parse_response("<html>bad gateway</html>"),
            Err(TranslationError::ParseError(_))
        ));
    }
}
