//! 源文档与其工作目录布局
//!
//! 每个 PDF 独占一个工作目录 `<folder>/<stem>/`：
//!
//! ```text
//! <root>/<folder>/<stem>/zip/                       原始下载的压缩包
//! <root>/<folder>/<stem>/output/final.md            合并后的文档
//! <root>/<folder>/<stem>/output/images/image_N.png  外置的图片
//! <root>/<folder>/<stem>/output/final.text2qti.txt  生成的题目文本
//! <root>/<folder>/<stem>/output/final.text2qti.zip  题目包
//! <root>/<folder>/<stem>/output/final.published.json 发布记录
//! ```
//!
//! 流水线从不删除这些目录，各阶段据此判断是否可以跳过。
//! 唯一的例外：生成文件被重写时，旧的题目包和发布记录会一并删除。

use std::path::{Path, PathBuf};

/// 合并文档的固定文件名
pub const CONSOLIDATED_FILE_NAME: &str = "final.md";
/// 生成文本的后缀
pub const ARTIFACT_SUFFIX: &str = "text2qti.txt";
/// 题目包的后缀
pub const PACKAGE_SUFFIX: &str = "text2qti.zip";
/// 发布记录的后缀
pub const PUBLICATION_MARKER_SUFFIX: &str = "published.json";

/// 待处理的源文档，身份为 (folder, file_name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    folder: String,
    file_name: String,
    folder_path: PathBuf,
    pdf_path: PathBuf,
}

impl SourceDocument {
    /// `pdf_path` 应为绝对路径，上传控件需要
    pub fn new(
        folder: impl Into<String>,
        file_name: impl Into<String>,
        folder_path: impl Into<PathBuf>,
        pdf_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            folder: folder.into(),
            file_name: file_name.into(),
            folder_path: folder_path.into(),
            pdf_path: pdf_path.into(),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn pdf_path(&self) -> &Path {
        &self.pdf_path
    }

    /// 去掉扩展名的文件名
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }

    pub fn working_dir(&self) -> PathBuf {
        self.folder_path.join(self.stem())
    }

    pub fn zip_dir(&self) -> PathBuf {
        self.working_dir().join("zip")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.working_dir().join("output")
    }

    pub fn consolidated_path(&self) -> PathBuf {
        self.output_dir().join(CONSOLIDATED_FILE_NAME)
    }

    /// 备用的合并文档：与工作目录同级的 `<stem>.md`
    pub fn fallback_markdown_path(&self) -> PathBuf {
        self.folder_path.join(format!("{}.md", self.stem()))
    }

    /// 生成文本路径，以合并文档的文件名为键
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("{}.{}", consolidated_stem(), ARTIFACT_SUFFIX))
    }

    pub fn package_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("{}.{}", consolidated_stem(), PACKAGE_SUFFIX))
    }

    pub fn publication_marker_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("{}.{}", consolidated_stem(), PUBLICATION_MARKER_SUFFIX))
    }

    /// 测验标题前缀，例如 `[1.Chuyen de]`
    pub fn quiz_tag(&self) -> String {
        format!("[{}]", self.folder)
    }
}

fn consolidated_stem() -> &'static str {
    CONSOLIDATED_FILE_NAME
        .strip_suffix(".md")
        .unwrap_or(CONSOLIDATED_FILE_NAME)
}

/// 一个子目录下的全部源文档
#[derive(Debug, Clone)]
pub struct FolderBatch {
    pub folder: String,
    pub path: PathBuf,
    pub documents: Vec<SourceDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SourceDocument {
        SourceDocument::new(
            "1.Chuyen de",
            "De 01.pdf",
            "/data/1.Chuyen de",
            "/data/1.Chuyen de/De 01.pdf",
        )
    }

    #[test]
    fn test_staging_layout() {
        let doc = sample();
        let root = PathBuf::from("/data/1.Chuyen de/De 01");

        assert_eq!(doc.stem(), "De 01");
        assert_eq!(doc.working_dir(), root);
        assert_eq!(doc.zip_dir(), root.join("zip"));
        assert_eq!(doc.consolidated_path(), root.join("output").join("final.md"));
        assert_eq!(
            doc.artifact_path(),
            root.join("output").join("final.text2qti.txt")
        );
        assert_eq!(
            doc.package_path(),
            root.join("output").join("final.text2qti.zip")
        );
        assert_eq!(
            doc.publication_marker_path(),
            root.join("output").join("final.published.json")
        );
    }

    #[test]
    fn test_fallback_and_tag() {
        let doc = sample();
        assert_eq!(
            doc.fallback_markdown_path(),
            PathBuf::from("/data/1.Chuyen de/De 01.md")
        );
        assert_eq!(doc.quiz_tag(), "[1.Chuyen de]");
    }
}
