//! 内嵌图片外置 - 业务能力层
//!
//! 把合并文档中的 `![..](data:image;base64,...)` 解码写入 `images/image_N.png`，
//! 并把原文替换为相对路径引用。编号由调用方按文档传入的 [`ImageCounter`] 决定。

use crate::error::{AppError, AppResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::{Captures, Regex};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// 外置图片所在的子目录名（相对合并文档）
pub const IMAGES_DIR_NAME: &str = "images";

const INLINE_IMAGE_PATTERN: &str = r"!\[.*?\]\(data:image;base64,(.*?)\)";

/// 单个文档内的图片编号，从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCounter(usize);

impl ImageCounter {
    pub fn new() -> Self {
        Self(1)
    }

    /// 取当前编号并前进
    fn advance(&mut self) -> usize {
        let current = self.0;
        self.0 += 1;
        current
    }

    pub fn peek(&self) -> usize {
        self.0
    }
}

impl Default for ImageCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// 一次外置的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub saved: usize,
    /// 解码或写入失败的编号，原文保持不变
    pub failed: Vec<usize>,
}

impl ExtractionSummary {
    pub fn total(&self) -> usize {
        self.saved + self.failed.len()
    }
}

/// 补齐 `=` 使长度为 4 的倍数
pub fn pad_base64(payload: &str) -> String {
    let mut padded = payload.trim().to_string();
    let remainder = padded.len() % 4;
    if remainder != 0 {
        padded.push_str(&"=".repeat(4 - remainder));
    }
    padded
}

/// 改写文本中的内嵌图片，返回改写后的文本
///
/// `output_dir` 为合并文档所在目录，图片写入其下的 `images/`。
pub fn rewrite_inline_images(
    text: &str,
    output_dir: &Path,
    counter: &mut ImageCounter,
) -> AppResult<(String, ExtractionSummary)> {
    let re = Regex::new(INLINE_IMAGE_PATTERN)
        .map_err(|e| AppError::Other(format!("内嵌图片正则无效: {}", e)))?;
    let images_dir = output_dir.join(IMAGES_DIR_NAME);
    let mut summary = ExtractionSummary::default();

    let rewritten = re.replace_all(text, |caps: &Captures| {
        let index = counter.advance();
        let original = caps[0].to_string();

        match save_image(&caps[1], &images_dir, index) {
            Ok(()) => {
                summary.saved += 1;
                format!("![]({}/image_{}.png)", IMAGES_DIR_NAME, index)
            }
            Err(e) => {
                warn!("⚠️ 第 {} 张图片处理失败，保留原文: {}", index, e);
                summary.failed.push(index);
                original
            }
        }
    });

    Ok((rewritten.into_owned(), summary))
}

fn save_image(payload: &str, images_dir: &Path, index: usize) -> AppResult<()> {
    let bytes = STANDARD
        .decode(pad_base64(payload))
        .map_err(|e| AppError::Other(format!("base64 解码失败: {}", e)))?;

    fs::create_dir_all(images_dir).map_err(|e| AppError::file_write_failed(images_dir, e))?;
    let image_path = images_dir.join(format!("image_{}.png", index));
    fs::write(&image_path, &bytes).map_err(|e| AppError::file_write_failed(&image_path, e))?;
    debug!("已保存图片: {} ({} 字节)", image_path.display(), bytes.len());
    Ok(())
}

/// 就地改写一个合并文档
///
/// 没有内嵌图片时不重写文件。
pub fn externalize_images(document: &Path, counter: &mut ImageCounter) -> AppResult<ExtractionSummary> {
    let text = fs::read_to_string(document).map_err(|e| AppError::file_read_failed(document, e))?;
    let output_dir = document.parent().unwrap_or_else(|| Path::new("."));

    let (rewritten, summary) = rewrite_inline_images(&text, output_dir, counter)?;
    if summary.total() == 0 {
        debug!("没有内嵌图片: {}", document.display());
        return Ok(summary);
    }

    fs::write(document, rewritten).map_err(|e| AppError::file_write_failed(document, e))?;
    info!(
        "🖼️ 外置图片 {} 张（失败 {}）: {}",
        summary.saved,
        summary.failed.len(),
        document.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_base64() {
        assert_eq!(pad_base64("QUJD"), "QUJD");
        assert_eq!(pad_base64("QUI"), "QUI=");
        assert_eq!(pad_base64("QQ"), "QQ==");
        assert_eq!(pad_base64("QUJDR"), "QUJDR===");
    }

    #[test]
    fn test_rewrite_single_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut counter = ImageCounter::new();

        let (text, summary) =
            rewrite_inline_images("![x](data:image;base64,QUJD)", dir.path(), &mut counter).unwrap();

        assert_eq!(text, "![](images/image_1.png)");
        assert_eq!(summary.saved, 1);
        assert_eq!(fs::read(dir.path().join("images/image_1.png")).unwrap(), b"ABC");
        assert_eq!(counter.peek(), 2);
    }

    #[test]
    fn test_stripped_padding_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let mut counter = ImageCounter::new();

        // "AB" 的标准编码为 "QUI="
        let (text, summary) =
            rewrite_inline_images("a ![](data:image;base64,QUI) b", dir.path(), &mut counter).unwrap();

        assert_eq!(text, "a ![](images/image_1.png) b");
        assert!(summary.failed.is_empty());
        assert_eq!(fs::read(dir.path().join("images/image_1.png")).unwrap(), b"AB");
    }

    #[test]
    fn test_invalid_payload_keeps_original_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut counter = ImageCounter::new();
        let input = "![bad](data:image;base64,@@@@)\n![ok](data:image;base64,QUJD)";

        let (text, summary) = rewrite_inline_images(input, dir.path(), &mut counter).unwrap();

        assert_eq!(
            text,
            "![bad](data:image;base64,@@@@)\n![](images/image_2.png)"
        );
        assert_eq!(summary.failed, vec![1]);
        assert_eq!(summary.saved, 1);
        assert!(!dir.path().join("images/image_1.png").exists());
    }

    #[test]
    fn test_counter_is_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a");
        let second = dir.path().join("b");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("final.md"), "![](data:image;base64,QUJD) ![](data:image;base64,QUJD)").unwrap();
        fs::write(second.join("final.md"), "![](data:image;base64,QUJD)").unwrap();

        externalize_images(&first.join("final.md"), &mut ImageCounter::new()).unwrap();
        externalize_images(&second.join("final.md"), &mut ImageCounter::new()).unwrap();

        assert!(first.join("images/image_2.png").exists());
        assert!(second.join("images/image_1.png").exists());
        assert!(!second.join("images/image_2.png").exists());
        assert_eq!(
            fs::read_to_string(second.join("final.md")).unwrap(),
            "![](images/image_1.png)"
        );
    }

    #[test]
    fn test_document_without_images_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("final.md");
        fs::write(&doc, "# Câu 1\n![](images/image_1.png)").unwrap();

        let summary = externalize_images(&doc, &mut ImageCounter::new()).unwrap();
        assert_eq!(summary.total(), 0);
    }
}
