//! 固定版式渲染
//!
//! 扁平化文档交给外部的 wkhtmltopdf 渲染成 PDF。渲染失败只影响 PDF，
//! 已经写出的 EPUB 不会回滚。

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::RenderConfig;

/// 渲染错误
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("cannot start renderer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("renderer I/O error: {0}")]
    Io(#[from] io::Error),
}

/// HTML 到固定版式的渲染器
pub trait PageRenderer {
    /// 渲染一个自包含的 HTML 文档到 `output`
    fn render(&self, html: &str, output: &Path) -> Result<(), RenderError>;
}

/// 调用 wkhtmltopdf 可执行文件
#[derive(Debug, Clone)]
pub struct WkhtmltopdfRenderer {
    program: PathBuf,
    config: RenderConfig,
}

impl WkhtmltopdfRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            program: PathBuf::from(&config.wkhtmltopdf),
            config: config.clone(),
        }
    }

    /// 使用指定路径的可执行文件
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// 命令行参数（不含输入与输出路径）
    pub fn arguments(&self) -> Vec<String> {
        let c = &self.config;
        let mut args: Vec<String> = vec![
            "--quiet".into(),
            "--encoding".into(),
            "UTF-8".into(),
            "--margin-top".into(),
            format!("{}mm", c.margin_top_mm),
            "--margin-right".into(),
            format!("{}mm", c.margin_right_mm),
            "--margin-bottom".into(),
            format!("{}mm", c.margin_bottom_mm),
            "--margin-left".into(),
            format!("{}mm", c.margin_left_mm),
            "--page-size".into(),
            c.page_size.clone(),
            "--orientation".into(),
            c.orientation.clone(),
            "--dpi".into(),
            c.dpi.to_string(),
            "--image-dpi".into(),
            c.image_dpi.to_string(),
            "--image-quality".into(),
            c.image_quality.to_string(),
            "--title".into(),
            String::new(),
        ];
        args.extend(
            [
                "--no-outline",
                "--disable-smart-shrinking",
                "--disable-javascript",
                "--images",
                "--enable-local-file-access",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.extend(
            [
                "--load-error-handling",
                "ignore",
                "--load-media-error-handling",
                "ignore",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

impl PageRenderer for WkhtmltopdfRenderer {
    fn render(&self, html: &str, output: &Path) -> Result<(), RenderError> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // wkhtmltopdf 根据扩展名判断输入类型
        let mut input = tempfile::Builder::new()
            .prefix("bookbuilder-")
            .suffix(".html")
            .tempfile()?;
        input.write_all(html.as_bytes())?;
        input.flush()?;

        let program = self.program.display().to_string();
        debug!(program = %program, input = %input.path().display(), "starting renderer");

        let result = Command::new(&self.program)
            .args(self.arguments())
            .arg(input.path())
            .arg(output)
            .output()
            .map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(RenderError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        info!(output = %output.display(), "rendered PDF");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_follow_config() {
        let renderer = WkhtmltopdfRenderer::new(&RenderConfig::default());
        let args = renderer.arguments();

        let value_of = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(value_of("--page-size"), "A4");
        assert_eq!(value_of("--orientation"), "Portrait");
        assert_eq!(value_of("--margin-bottom"), "15mm");
        assert_eq!(value_of("--image-quality"), "94");
        assert_eq!(value_of("--load-error-handling"), "ignore");
        assert!(args.contains(&"--disable-javascript".to_string()));
        assert!(args.contains(&"--enable-local-file-access".to_string()));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = WkhtmltopdfRenderer::new(&RenderConfig::default())
            .with_program(dir.path().join("no-such-renderer"));

        let result = renderer.render("<p>x</p>", &dir.path().join("out.pdf"));
        assert!(matches!(result, Err(RenderError::Spawn { .. })));
        assert!(!dir.path().join("out.pdf").exists());
    }
}
