//! 目录扫描 - 业务能力层
//!
//! 按配置顺序遍历子目录，收集其中的 PDF 文件

use crate::error::AppResult;
use crate::models::{FolderBatch, SourceDocument};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// 扫描 `root` 下的各子目录
///
/// 不存在或无法读取的子目录记录警告后跳过。目录内文件保持 `read_dir` 返回的顺序，不做排序。
pub async fn scan_folders(root: &Path, folders: &[String]) -> AppResult<Vec<FolderBatch>> {
    let mut batches = Vec::with_capacity(folders.len());

    for folder in folders {
        let folder_path = root.join(folder);
        if !fs::metadata(&folder_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            warn!("⚠️ 跳过不存在的目录: {}", folder_path.display());
            continue;
        }

        let documents = match scan_folder(folder, &folder_path).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!("⚠️ 跳过无法读取的目录 {}: {}", folder_path.display(), e);
                continue;
            }
        };
        info!("📂 {}: 找到 {} 个 PDF", folder, documents.len());

        batches.push(FolderBatch {
            folder: folder.clone(),
            path: folder_path,
            documents,
        });
    }

    Ok(batches)
}

async fn scan_folder(folder: &str, folder_path: &Path) -> AppResult<Vec<SourceDocument>> {
    let mut documents = Vec::new();
    let mut entries = fs::read_dir(folder_path)
        .await
        .map_err(|e| crate::error::AppError::file_read_failed(folder_path, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| crate::error::AppError::file_read_failed(folder_path, e))?
    {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !is_pdf(&file_name) {
            continue;
        }
        // 跟随符号链接
        let path = entry.path();
        if !fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            continue;
        }

        let absolute = match fs::canonicalize(&path).await {
            Ok(p) => p,
            Err(_) => std::path::absolute(&path).unwrap_or(path),
        };
        debug!("发现 PDF: {}", absolute.display());

        documents.push(SourceDocument::new(folder, file_name, folder_path, absolute));
    }

    Ok(documents)
}

/// 扩展名不区分大小写
fn is_pdf(file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(".pdf")
}
