//! EPUB 打包
//!
//! 生成 EPUB 3 包（附带 EPUB 2 的 NCX 目录）。每个章节是独立的 XHTML
//! 文档，引用同一个共享样式表；目录与阅读顺序严格按章节序号排列。
//! 包先写入同目录的临时文件，完成后再原子地重命名，失败时不会留下
//! 半个包。

use std::fs;
use std::io::{self, Seek, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::book::{Asset, Book, Chapter, Metadata};
use crate::gate::is_structurally_valid;
use crate::parsers::html::{escape_xml_attr, escape_xml_text};

/// 包内容根目录
const CONTENT_ROOT: &str = "OEBPS";
const STYLESHEET_HREF: &str = "style/style.css";
const NAV_HREF: &str = "nav.xhtml";
const NCX_HREF: &str = "toc.ncx";

const CONTAINER_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// 打包错误
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("no chapter survived packaging")]
    NoChapters,

    #[error("cannot write package: {0}")]
    Io(#[from] io::Error),

    #[error("cannot write package archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("cannot move package into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// 章节的 XHTML 外壳
pub fn chapter_shell(chapter: &Chapter, language: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">
<head>
<meta charset="utf-8"/>
<link rel="stylesheet" type="text/css" href="../{STYLESHEET_HREF}"/>
<title>{title}</title>
</head>
<body>
{body}
</body>
</html>
"#,
        lang = escape_xml_attr(language),
        title = escape_xml_text(&chapter.title),
        body = chapter.body_markup,
    )
}

/// 通过章节外壳二次有效性检查的章节
///
/// 重塑与资源嵌入之后章节仍可能变空，这里是进入包之前的最后一道门。
pub fn packaged_chapters<'a>(book: &'a Book) -> Vec<&'a Chapter> {
    book.chapters()
        .iter()
        .filter(|chapter| {
            let valid = is_structurally_valid(&chapter_shell(chapter, &book.metadata.language));
            if !valid {
                warn!(
                    source = chapter.source_name.as_str(),
                    chapter = chapter.ordinal,
                    "chapter document is structurally empty, skipping"
                );
            }
            valid
        })
        .collect()
}

/// 由书名、作者与语言派生的稳定标识符
pub fn package_identifier(metadata: &Metadata) -> String {
    let digest = Sha256::digest(
        format!(
            "{}\n{}\n{}",
            metadata.title, metadata.author, metadata.language
        )
        .as_bytes(),
    );
    let hex: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
    format!(
        "urn:uuid:{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// 资源在清单中的 id
fn asset_id(asset: &Asset) -> String {
    let sanitized: String = asset
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("img-{sanitized}")
}

/// EPUB 写入器
pub struct EpubWriter<'a> {
    book: &'a Book,
    stylesheet: &'a str,
    modified: DateTime<Utc>,
}

impl<'a> EpubWriter<'a> {
    pub fn new(book: &'a Book, stylesheet: &'a str) -> Self {
        Self {
            book,
            stylesheet,
            modified: Utc::now(),
        }
    }

    /// 固定 `dcterms:modified` 时间戳
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = modified;
        self
    }

    /// 原子地写入包文件
    pub fn write_file(&self, chapters: &[&Chapter], path: &Path) -> Result<(), PackageError> {
        if chapters.is_empty() {
            return Err(PackageError::NoChapters);
        }

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        fs::create_dir_all(&parent)?;

        let temp = NamedTempFile::new_in(&parent)?;
        let temp = self.write(chapters, temp)?;
        temp.persist(path)?;

        info!(
            path = %path.display(),
            chapters = chapters.len(),
            images = self.book.assets().len(),
            "wrote EPUB"
        );
        Ok(())
    }

    /// 把包写入任意可定位的输出
    pub fn write<W: Write + Seek>(&self, chapters: &[&Chapter], writer: W) -> Result<W, PackageError> {
        if chapters.is_empty() {
            return Err(PackageError::NoChapters);
        }

        let mut zip = ZipWriter::new(writer);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        // 1. mimetype 必须是第一个条目且不压缩
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        // 2. container.xml
        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(CONTAINER_XML)?;

        // 3. 包文档与目录
        zip.start_file(format!("{CONTENT_ROOT}/content.opf"), deflated)?;
        zip.write_all(self.package_document(chapters).as_bytes())?;

        zip.start_file(format!("{CONTENT_ROOT}/{NCX_HREF}"), deflated)?;
        zip.write_all(self.ncx(chapters).as_bytes())?;

        zip.start_file(format!("{CONTENT_ROOT}/{NAV_HREF}"), deflated)?;
        zip.write_all(self.nav(chapters).as_bytes())?;

        // 4. 样式表
        zip.start_file(format!("{CONTENT_ROOT}/{STYLESHEET_HREF}"), deflated)?;
        zip.write_all(self.stylesheet.as_bytes())?;

        // 5. 章节
        for chapter in chapters {
            zip.start_file(
                format!("{CONTENT_ROOT}/{}", chapter.file_name()),
                deflated,
            )?;
            zip.write_all(chapter_shell(chapter, &self.book.metadata.language).as_bytes())?;
        }

        // 6. 图片
        for asset in self.book.assets().iter() {
            zip.start_file(format!("{CONTENT_ROOT}/{}", asset.href()), deflated)?;
            zip.write_all(&asset.data)?;
        }

        Ok(zip.finish()?)
    }

    fn package_document(&self, chapters: &[&Chapter]) -> String {
        let metadata = &self.book.metadata;
        let cover = self.book.cover();
        let mut opf = String::new();

        opf.push_str(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
"#,
        );
        opf.push_str(&format!(
            "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
            package_identifier(metadata)
        ));
        opf.push_str(&format!(
            "    <dc:title>{}</dc:title>\n",
            escape_xml_text(&metadata.title)
        ));
        opf.push_str(&format!(
            "    <dc:creator>{}</dc:creator>\n",
            escape_xml_text(&metadata.author)
        ));
        opf.push_str(&format!(
            "    <dc:language>{}</dc:language>\n",
            escape_xml_text(&metadata.language)
        ));
        opf.push_str(&format!(
            "    <meta property=\"dcterms:modified\">{}</meta>\n",
            self.modified.format("%Y-%m-%dT%H:%M:%SZ")
        ));
        if let Some(cover) = cover {
            // EPUB 2 阅读器通过这个 meta 找封面
            opf.push_str(&format!(
                "    <meta name=\"cover\" content=\"{}\"/>\n",
                asset_id(cover)
            ));
        }
        opf.push_str("  </metadata>\n");

        opf.push_str("  <manifest>\n");
        opf.push_str(&format!(
            "    <item id=\"nav\" href=\"{NAV_HREF}\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n"
        ));
        opf.push_str(&format!(
            "    <item id=\"ncx\" href=\"{NCX_HREF}\" media-type=\"application/x-dtbncx+xml\"/>\n"
        ));
        opf.push_str(&format!(
            "    <item id=\"style\" href=\"{STYLESHEET_HREF}\" media-type=\"text/css\"/>\n"
        ));
        for chapter in chapters {
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                chapter.id(),
                chapter.file_name()
            ));
        }
        for asset in self.book.assets().iter() {
            let is_cover = cover.map_or(false, |c| c.name == asset.name);
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{}/>\n",
                asset_id(asset),
                escape_xml_attr(&asset.href()),
                escape_xml_attr(&asset.media_type),
                if is_cover { " properties=\"cover-image\"" } else { "" }
            ));
        }
        opf.push_str("  </manifest>\n");

        opf.push_str("  <spine toc=\"ncx\">\n");
        opf.push_str("    <itemref idref=\"nav\" linear=\"no\"/>\n");
        for chapter in chapters {
            opf.push_str(&format!("    <itemref idref=\"{}\"/>\n", chapter.id()));
        }
        opf.push_str("  </spine>\n");
        opf.push_str("</package>\n");
        opf
    }

    fn ncx(&self, chapters: &[&Chapter]) -> String {
        let metadata = &self.book.metadata;
        let mut ncx = String::new();

        ncx.push_str(&format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
"#,
            package_identifier(metadata),
            escape_xml_text(&metadata.title)
        ));

        for (index, chapter) in chapters.iter().enumerate() {
            let play_order = index + 1;
            ncx.push_str(&format!(
                "    <navPoint id=\"navPoint-{play_order}\" playOrder=\"{play_order}\">\n"
            ));
            ncx.push_str(&format!(
                "      <navLabel><text>{}</text></navLabel>\n",
                escape_xml_text(&chapter.title)
            ));
            ncx.push_str(&format!(
                "      <content src=\"{}\"/>\n",
                chapter.file_name()
            ));
            ncx.push_str("    </navPoint>\n");
        }

        ncx.push_str("  </navMap>\n</ncx>\n");
        ncx
    }

    fn nav(&self, chapters: &[&Chapter]) -> String {
        let metadata = &self.book.metadata;
        let entries: String = chapters
            .iter()
            .map(|chapter| {
                format!(
                    "      <li><a href=\"{}\">{}</a></li>\n",
                    chapter.file_name(),
                    escape_xml_text(&chapter.title)
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">
<head>
<meta charset="utf-8"/>
<title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
{entries}    </ol>
  </nav>
</body>
</html>
"#,
            lang = escape_xml_attr(&metadata.language),
            title = escape_xml_text(&metadata.title),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use chrono::TimeZone;
    use zip::ZipArchive;

    use super::*;
    use crate::book::{ChapterDraft, PageAssets};

    fn book_with(chapters: &[(&str, &str)], image: bool) -> Book {
        let mut book = Book::new(Metadata {
            title: "Field & Stream".to_string(),
            author: "A. Writer".to_string(),
            language: "en".to_string(),
        });
        for (index, (title, body)) in chapters.iter().enumerate() {
            let mut staged = PageAssets::new();
            if image && index == 0 {
                let name = book.assets_mut().allocate_name("img_1_", ".png");
                staged.push(Asset {
                    name,
                    media_type: "image/png".to_string(),
                    data: vec![0x89, b'P', b'N', b'G'],
                });
            }
            book.commit_chapter(
                ChapterDraft {
                    title: title.to_string(),
                    body_markup: body.to_string(),
                    render_heading: false,
                    source_name: format!("{index}.html"),
                },
                staged,
            );
        }
        book
    }

    fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut content = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    #[test]
    fn test_package_layout_and_order() {
        let book = book_with(&[("One", "<p>first</p>"), ("Two", "<p>second</p>")], true);
        let chapters = packaged_chapters(&book);
        let modified = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        let cursor = EpubWriter::new(&book, "p{}")
            .with_modified(modified)
            .write(&chapters, Cursor::new(Vec::new()))
            .unwrap();
        let mut archive = ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap();

        assert_eq!(archive.by_index(0).unwrap().name(), "mimetype");
        assert_eq!(read_entry(&mut archive, "mimetype"), "application/epub+zip");

        let opf = read_entry(&mut archive, "OEBPS/content.opf");
        assert!(opf.contains("<dc:title>Field &amp; Stream</dc:title>"));
        assert!(opf.contains("2024-05-01T08:30:00Z"));
        assert!(opf.contains(r#"properties="cover-image""#));
        let first = opf.find(r#"<itemref idref="ch_001"/>"#).unwrap();
        let second = opf.find(r#"<itemref idref="ch_002"/>"#).unwrap();
        assert!(first < second);

        let chapter = read_entry(&mut archive, "OEBPS/chapters/ch_002.xhtml");
        assert!(chapter.contains("<p>second</p>"));
        assert!(chapter.contains(r#"href="../style/style.css""#));

        assert!(archive.by_name("OEBPS/images/img_1_1.png").is_ok());
        assert!(archive.by_name("OEBPS/nav.xhtml").is_ok());
        assert_eq!(read_entry(&mut archive, "OEBPS/style/style.css"), "p{}");
    }

    #[test]
    fn test_empty_chapter_shell_is_skipped() {
        let book = book_with(&[("One", "<p>first</p>"), ("Blank", "<div> </div>")], false);
        let chapters = packaged_chapters(&book);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "One");
    }

    #[test]
    fn test_no_chapters_is_error() {
        let book = book_with(&[], false);
        let result = EpubWriter::new(&book, "").write(&[], Cursor::new(Vec::new()));
        assert!(matches!(result, Err(PackageError::NoChapters)));
    }

    #[test]
    fn test_write_file_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("book.epub");
        let book = book_with(&[("One", "<p>first</p>")], false);

        EpubWriter::new(&book, "")
            .write_file(&packaged_chapters(&book), &path)
            .unwrap();

        assert!(path.is_file());
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_identifier_is_stable() {
        let metadata = Metadata::default();
        let id = package_identifier(&metadata);
        assert_eq!(id, package_identifier(&metadata));
        assert!(id.starts_with("urn:uuid:"));
        assert_eq!(id.len(), "urn:uuid:".len() + 36);
    }
}
