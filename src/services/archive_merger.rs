//! 压缩包解压与分页合并 - 业务能力层
//!
//! OCR 结果压缩包中每页一个 Markdown 片段，命名为
//! `demo_<suffix>_page_<index>.md`，`suffix` 取压缩包文件名最后一个 `_` 之后的部分。
//! 合并时按页码升序拼接，缺失的页码直接跳过。

use crate::error::{AppError, AppResult};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// 片段文件名的固定前缀
const FRAGMENT_STEM_PREFIX: &str = "demo";
/// 页码查找上限（不含）
pub const MAX_PAGES: usize = 100;
/// 片段之间的分隔（一个空行）
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// 一次合并的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub consolidated: PathBuf,
    /// 实际找到的页码，升序
    pub pages: Vec<usize>,
}

/// 解压压缩包到 `extract_to`（同名文件覆盖），再合并片段到 `consolidated`
pub fn consolidate(archive: &Path, extract_to: &Path, consolidated: &Path) -> AppResult<MergeReport> {
    extract_archive(archive, extract_to)?;
    info!("已解压: {} -> {}", archive.display(), extract_to.display());

    let prefix = fragment_prefix(archive);
    let report = merge_fragments(extract_to, &prefix, consolidated)?;
    if report.pages.is_empty() {
        warn!(
            "⚠️ 压缩包中没有找到 {}_page_N.md 片段: {}",
            prefix,
            archive.display()
        );
    } else {
        info!(
            "已合并 {} 页到: {}",
            report.pages.len(),
            consolidated.display()
        );
    }
    Ok(report)
}

/// 完整解压，已存在的文件被覆盖
pub fn extract_archive(archive: &Path, extract_to: &Path) -> AppResult<()> {
    let file = File::open(archive).map_err(|e| AppError::file_read_failed(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| AppError::archive_failed(archive, e))?;
    fs::create_dir_all(extract_to).map_err(|e| AppError::file_write_failed(extract_to, e))?;
    zip.extract(extract_to)
        .map_err(|e| AppError::archive_failed(archive, e))?;
    Ok(())
}

/// 由压缩包文件名推导片段前缀：`xxx_ab12.zip` → `demo_ab12`
pub fn fragment_prefix(archive: &Path) -> String {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let suffix = stem.rsplit('_').next().unwrap_or(&stem);
    format!("{}_{}", FRAGMENT_STEM_PREFIX, suffix)
}

/// 按页码 `[0, MAX_PAGES)` 依次查找并拼接片段，写入 `consolidated`（覆盖）
pub fn merge_fragments(dir: &Path, prefix: &str, consolidated: &Path) -> AppResult<MergeReport> {
    let mut parts = Vec::new();
    let mut pages = Vec::new();

    for index in 0..MAX_PAGES {
        let part_path = dir.join(format!("{}_page_{}.md", prefix, index));
        if !part_path.is_file() {
            continue;
        }
        let content =
            fs::read_to_string(&part_path).map_err(|e| AppError::file_read_failed(&part_path, e))?;
        debug!("读取片段 {}: {} 字节", index, content.len());
        parts.push(content);
        pages.push(index);
    }

    if let Some(parent) = consolidated.parent() {
        fs::create_dir_all(parent).map_err(|e| AppError::file_write_failed(parent, e))?;
    }
    fs::write(consolidated, parts.join(FRAGMENT_SEPARATOR))
        .map_err(|e| AppError::file_write_failed(consolidated, e))?;

    Ok(MergeReport {
        consolidated: consolidated.to_path_buf(),
        pages,
    })
}

/// 在下载目录中查找已完成的压缩包（用于中断后续跑），按文件名取第一个
pub fn find_completed_archive(zip_dir: &Path) -> Option<PathBuf> {
    let mut archives: Vec<PathBuf> = fs::read_dir(zip_dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("zip"))
                    .unwrap_or(false)
        })
        .collect();
    archives.sort();
    archives.into_iter().next()
}
