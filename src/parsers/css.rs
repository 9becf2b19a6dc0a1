//! CSS 解析器模块
//!
//! 扁平化文档中的 `style` 属性与 `<style>` 元素可能通过 `url()` 引用包内图片
//! 或外部资源。这里用 cssparser 逐个 token 重建样式表，只替换地址：
//! `url()`、`@import "..."` 与 `image-set("...")` 中的字符串，其余内容原样保留。
//!
//! # 使用示例
//!
//! ```rust
//! use bookbuilder::parsers::css::rewrite_css_urls;
//!
//! let css = "div { background: url('../images/a.png') }";
//! let rewritten = rewrite_css_urls(css, &mut |url| Some(format!("#{url}")));
//! assert_eq!(rewritten, "div { background: url(\"#../images/a.png\") }");
//! ```

use cssparser::{serialize_identifier, serialize_string, ParseError, Parser, ParserInput, Token};

/// 字符串参数即地址的函数
const URL_STRING_FUNCTIONS: &[&str] = &["url", "image-set", "-webkit-image-set"];

/// 重写 CSS 中所有地址引用
///
/// `rewrite` 对每个地址返回新地址；返回 `None` 时保留原地址。
pub fn rewrite_css_urls<F>(css: &str, rewrite: &mut F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);

    process_css(&mut parser, "", rewrite).unwrap_or_else(|_| css.to_string())
}

/// 格式化CSS标识符
pub fn format_ident(ident: &str) -> String {
    let mut res: String = "".to_string();
    let _ = serialize_identifier(ident, &mut res);
    res = res.trim_end().to_string();
    res
}

/// 格式化带引号的CSS字符串
pub fn format_quoted_string(string: &str) -> String {
    let mut res: String = "".to_string();
    let _ = serialize_string(string, &mut res);
    res
}

/// 逐 token 处理 CSS，`func_name` 为当前所在函数名
fn process_css<'i, F>(
    parser: &mut Parser<'i, '_>,
    func_name: &str,
    rewrite: &mut F,
) -> Result<String, ParseError<'i, String>>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut result = String::new();
    let takes_url_strings = URL_STRING_FUNCTIONS
        .iter()
        .any(|name| func_name.eq_ignore_ascii_case(name));
    // 位于 `@import` 与其结尾分号之间
    let mut in_import = false;

    loop {
        let token_offset = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        let token_result = match &token {
            Token::Comment(_) => parser.slice_from(token_offset).to_string(),
            Token::Semicolon => {
                in_import = false;
                ";".to_string()
            }
            Token::Colon => ":".to_string(),
            Token::Comma => ",".to_string(),
            Token::CloseParenthesis => ")".to_string(),
            Token::CloseSquareBracket => "]".to_string(),
            Token::CloseCurlyBracket => "}".to_string(),
            Token::IncludeMatch => "~=".to_string(),
            Token::DashMatch => "|=".to_string(),
            Token::PrefixMatch => "^=".to_string(),
            Token::SuffixMatch => "$=".to_string(),
            Token::SubstringMatch => "*=".to_string(),
            Token::CDO => "<!--".to_string(),
            Token::CDC => "-->".to_string(),
            Token::WhiteSpace(value) => value.to_string(),
            Token::Ident(value) => format_ident(value),
            Token::AtKeyword(value) => {
                in_import = value.eq_ignore_ascii_case("import");
                format!("@{}", value)
            }
            Token::Hash(value) => format!("#{}", value),
            Token::IDHash(value) => format!("#{}", format_ident(value)),
            Token::QuotedString(value) => {
                if takes_url_strings || in_import {
                    let url = rewrite(value).unwrap_or_else(|| value.to_string());
                    format_quoted_string(&url)
                } else {
                    format_quoted_string(value)
                }
            }
            Token::UnquotedUrl(value) => {
                let url = rewrite(value).unwrap_or_else(|| value.to_string());
                format!("url({})", format_quoted_string(&url))
            }
            Token::Number {
                has_sign, value, ..
            } => {
                let mut number = String::new();
                if *has_sign && *value >= 0.0 {
                    number.push('+');
                }
                number.push_str(&value.to_string());
                number
            }
            Token::Percentage {
                has_sign,
                unit_value,
                ..
            } => {
                let mut percentage = String::new();
                if *has_sign && *unit_value >= 0.0 {
                    percentage.push('+');
                }
                percentage.push_str(&(unit_value * 100.0).to_string());
                percentage.push('%');
                percentage
            }
            Token::Dimension {
                has_sign,
                value,
                unit,
                ..
            } => {
                let mut dimension = String::new();
                if *has_sign && *value >= 0.0 {
                    dimension.push('+');
                }
                dimension.push_str(&value.to_string());
                dimension.push_str(unit);
                dimension
            }
            Token::Delim(value) => value.to_string(),
            Token::ParenthesisBlock | Token::SquareBracketBlock | Token::CurlyBracketBlock => {
                let (open_char, close_char) = match token {
                    Token::ParenthesisBlock => ('(', ')'),
                    Token::SquareBracketBlock => ('[', ']'),
                    _ => ('{', '}'),
                };

                let block_css =
                    parser.parse_nested_block(|parser| process_css(parser, func_name, rewrite))?;
                format!("{open_char}{block_css}{close_char}")
            }
            Token::Function(name) => {
                let function_name = name.to_string();
                let block_css = parser
                    .parse_nested_block(|parser| process_css(parser, &function_name, rewrite))?;
                format!("{function_name}({block_css})")
            }
            Token::BadUrl(_) | Token::BadString(_) => String::new(),
        };

        result.push_str(&token_result);
    }

    if !result.is_empty() && result.trim().is_empty() {
        result = result.trim().to_string();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_unquoted_url() {
        let css = "background-image: url(../images/img_1_1.png)";
        let out = rewrite_css_urls(css, &mut |url| Some(format!("data:,{url}")));
        assert_eq!(out, "background-image: url(\"data:,../images/img_1_1.png\")");
    }

    #[test]
    fn test_rewrite_quoted_url_function() {
        let css = "a { background: url('x.png') no-repeat; }";
        let out = rewrite_css_urls(css, &mut |_| Some("data:,".to_string()));
        assert_eq!(out, "a { background: url(\"data:,\") no-repeat; }");
    }

    #[test]
    fn test_non_url_strings_untouched() {
        let css = r#"p::before { content: "x.png"; margin: 0 1em; }"#;
        let mut calls = 0;
        let out = rewrite_css_urls(css, &mut |_| {
            calls += 1;
            None
        });
        assert_eq!(calls, 0);
        assert_eq!(out, css);
    }

    #[test]
    fn test_rewrite_import_and_image_set_strings() {
        let css = r#"@import "https://fonts.example.com/a.css" screen; div { background-image: image-set("https://cdn.example.com/b.png" 1x); content: "keep" }"#;
        let mut seen = Vec::new();
        let out = rewrite_css_urls(css, &mut |url| {
            seen.push(url.to_string());
            Some("#".to_string())
        });
        assert_eq!(
            seen,
            vec!["https://fonts.example.com/a.css", "https://cdn.example.com/b.png"]
        );
        assert!(!out.contains("https://"));
        assert!(out.contains(r#"content: "keep""#));
    }

    #[test]
    fn test_keep_original_when_rewrite_declines() {
        let css = "div{background:url(a.png)}";
        let out = rewrite_css_urls(css, &mut |_| None);
        assert_eq!(out, "div{background:url(\"a.png\")}");
    }
}
