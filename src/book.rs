//! 书籍聚合
//!
//! 一次运行只有一个 `Book`：章节按接受顺序获得连续序号，资源注册表
//! 持有全书唯一的资源计数器。页面处理期间新嵌入的资源先暂存在
//! `PageAssets` 中，页面通过章节门控后才按文件顺序提交到书中。

use std::collections::HashMap;

use crate::utils::url::PACKAGE_IMAGE_DIR;

/// 书籍元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub author: String,
    pub language: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            author: "Unknown".to_string(),
            language: "en".to_string(),
        }
    }
}

/// 包内资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl Asset {
    /// 相对于包内容根目录的路径
    pub fn href(&self) -> String {
        format!("{PACKAGE_IMAGE_DIR}/{}", self.name)
    }

    /// 章节文档中引用该资源的路径
    pub fn chapter_reference(&self) -> String {
        chapter_reference(&self.name)
    }
}

/// 章节文档（位于 `chapters/`）引用资源的路径
pub fn chapter_reference(name: &str) -> String {
    format!("../{PACKAGE_IMAGE_DIR}/{name}")
}

/// 通过章节门控、尚未编号的章节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDraft {
    pub title: String,
    pub body_markup: String,
    pub render_heading: bool,
    pub source_name: String,
}

/// 已接受的章节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub ordinal: usize,
    pub title: String,
    /// XHTML 片段（body 的子节点）
    pub body_markup: String,
    /// 仅当源页面真的有 `<h1>` 时为真
    pub render_heading: bool,
    pub source_name: String,
}

impl Chapter {
    pub fn file_name(&self) -> String {
        format!("chapters/ch_{:03}.xhtml", self.ordinal)
    }

    pub fn id(&self) -> String {
        format!("ch_{:03}", self.ordinal)
    }
}

/// 资源注册表，持有全书唯一的名称计数器
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: Vec<Asset>,
    index: HashMap<String, usize>,
    next_sequence: usize,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self {
            assets: Vec::new(),
            index: HashMap::new(),
            next_sequence: 1,
        }
    }

    /// 分配 `<prefix><sequence><ext>` 形式的资源名
    ///
    /// 计数器只增不减，即使分配出的名字最终没有被提交也不会复用。
    pub fn allocate_name(&mut self, prefix: &str, ext: &str) -> String {
        if self.next_sequence == 0 {
            self.next_sequence = 1;
        }
        let name = format!("{prefix}{}{ext}", self.next_sequence);
        self.next_sequence += 1;
        name
    }

    fn insert(&mut self, asset: Asset) {
        if self.index.contains_key(&asset.name) {
            return;
        }
        self.index.insert(asset.name.clone(), self.assets.len());
        self.assets.push(asset);
    }

    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.index.get(name).map(|&i| &self.assets[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// 单个页面暂存的资源
#[derive(Debug, Default)]
pub struct PageAssets {
    assets: Vec<Asset>,
}

impl PageAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, asset: Asset) {
        self.assets.push(asset);
    }

    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn first(&self) -> Option<&Asset> {
        self.assets.first()
    }
}

/// 一次运行的书籍聚合
#[derive(Debug)]
pub struct Book {
    pub metadata: Metadata,
    chapters: Vec<Chapter>,
    assets: AssetRegistry,
    cover: Option<String>,
}

impl Book {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            chapters: Vec::new(),
            assets: AssetRegistry::new(),
            cover: None,
        }
    }

    /// 名称分配需要可变地访问注册表
    pub fn assets_mut(&mut self) -> &mut AssetRegistry {
        &mut self.assets
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// 封面资源：第一个章节中第一个成功嵌入的图片
    pub fn cover(&self) -> Option<&Asset> {
        self.cover.as_deref().and_then(|name| self.assets.get(name))
    }

    /// 提交一个通过门控的页面
    ///
    /// 序号为已接受章节数加一，与被跳过的页面数量无关。
    pub fn commit_chapter(&mut self, draft: ChapterDraft, staged: PageAssets) -> &Chapter {
        let is_first = self.chapters.is_empty();
        if is_first {
            self.cover = staged.first().map(|asset| asset.name.clone());
        }

        for asset in staged.assets {
            self.assets.insert(asset);
        }

        let ordinal = self.chapters.len() + 1;
        self.chapters.push(Chapter {
            ordinal,
            title: draft.title,
            body_markup: draft.body_markup,
            render_heading: draft.render_heading,
            source_name: draft.source_name,
        });

        &self.chapters[ordinal - 1]
    }
}
