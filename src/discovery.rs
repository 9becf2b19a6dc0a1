//! 源页面发现
//!
//! 读取输入目录中的 `.html` / `.htm` 文件（扩展名不区分大小写），
//! 按文件名自然排序或按创建时间排序。

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use url::Url;

/// 页面排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum SortMode {
    /// 文件名自然排序（`page 2` 排在 `page 10` 之前）
    #[default]
    Name,
    /// 文件创建时间，不支持时退回修改时间
    Ctime,
}

/// 一个待处理的源页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    pub path: PathBuf,
    pub file_name: String,
    /// 在处理顺序中的位置，从 1 开始
    pub position: usize,
}

impl SourcePage {
    pub fn read_markup(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    /// 去掉扩展名的文件名，作为标题的最后备选
    pub fn stem(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone())
    }

    /// 用于解析页面中相对引用的 file:// URL
    pub fn base_url(&self) -> Option<Url> {
        let absolute = fs::canonicalize(&self.path).ok()?;
        Url::from_file_path(absolute).ok()
    }
}

/// 自然排序的片段
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum NaturalChunk {
    Number(u128),
    Text(String),
}

/// 将文件名拆成数字与文本交替的片段，文本部分小写
pub fn natural_sort_key(name: &str) -> Vec<NaturalChunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    for c in name.chars() {
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != in_digits {
            chunks.push(make_chunk(&current, in_digits));
            current.clear();
        }
        in_digits = is_digit;
        current.push(c);
    }

    if !current.is_empty() {
        chunks.push(make_chunk(&current, in_digits));
    }

    chunks
}

fn make_chunk(piece: &str, is_digits: bool) -> NaturalChunk {
    if is_digits {
        if let Ok(number) = piece.parse::<u128>() {
            return NaturalChunk::Number(number);
        }
    }
    NaturalChunk::Text(piece.to_lowercase())
}

fn compare_natural(a: &str, b: &str) -> Ordering {
    natural_sort_key(a)
        .cmp(&natural_sort_key(b))
        .then_with(|| a.cmp(b))
}

fn is_html_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm")
        })
}

fn created_at(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// 列出并排序输入目录中的源页面
pub fn discover_pages(input_dir: &Path, sort: SortMode) -> io::Result<Vec<SourcePage>> {
    let mut files: Vec<(PathBuf, String)> = Vec::new();

    for entry in fs::read_dir(input_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || !is_html_file(&path) {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        files.push((path, file_name));
    }

    match sort {
        SortMode::Name => files.sort_by(|a, b| compare_natural(&a.1, &b.1)),
        SortMode::Ctime => files.sort_by(|a, b| {
            created_at(&a.0)
                .cmp(&created_at(&b.0))
                .then_with(|| compare_natural(&a.1, &b.1))
        }),
    }

    Ok(files
        .into_iter()
        .enumerate()
        .map(|(i, (path, file_name))| SourcePage {
            path,
            file_name,
            position: i + 1,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_natural_sort_key() {
        assert_eq!(
            natural_sort_key("Book (10).html"),
            vec![
                NaturalChunk::Text("book (".to_string()),
                NaturalChunk::Number(10),
                NaturalChunk::Text(").html".to_string()),
            ]
        );
    }

    #[test]
    fn test_natural_order() {
        let mut names = vec!["page 10.html", "page 2.html", "Page 1.html"];
        names.sort_by(|a, b| compare_natural(a, b));
        assert_eq!(names, vec!["Page 1.html", "page 2.html", "page 10.html"]);
    }

    #[test]
    fn test_discover_pages_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b (10).HTML", "b (2).html", "b (1).htm", "notes.txt"] {
            fs::write(dir.path().join(name), "<p>x</p>").unwrap();
        }
        fs::create_dir(dir.path().join("b (0).html")).unwrap();

        let pages = discover_pages(dir.path(), SortMode::Name).unwrap();
        let names: Vec<&str> = pages.iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(names, vec!["b (1).htm", "b (2).html", "b (10).HTML"]);
        assert_eq!(pages[2].position, 3);
        assert_eq!(pages[0].stem(), "b (1)");
    }

    #[test]
    fn test_discover_pages_missing_dir() {
        assert!(discover_pages(Path::new("/nonexistent/bookbuilder"), SortMode::Name).is_err());
    }
}
