//! 警告写入服务 - 业务能力层
//!
//! 只负责"写 warn.txt"能力，不关心流程

use crate::error::{AppError, AppResult};
use crate::models::SourceDocument;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// 警告写入服务
///
/// 每个被跳过或失败的文档追加一行：时间、阶段、PDF 路径、原因。
/// 运行结束后可据此重跑。
pub struct WarnWriter {
    warn_file_path: PathBuf,
}

impl WarnWriter {
    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            warn_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.warn_file_path
    }

    /// 追加一条记录，原因中的换行会被压成空格
    pub fn write(&self, stage: &str, doc: &SourceDocument, reason: &str) -> AppResult<()> {
        debug!("写入警告: {} | {} | {}", stage, doc.file_name(), reason);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.warn_file_path)
            .map_err(|e| AppError::file_write_failed(&self.warn_file_path, e))?;

        let warn_msg = format!(
            "{} | {} | {} | {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            stage,
            doc.pdf_path().display(),
            reason.split_whitespace().collect::<Vec<_>>().join(" ")
        );

        file.write_all(warn_msg.as_bytes())
            .map_err(|e| AppError::file_write_failed(&self.warn_file_path, e))?;

        Ok(())
    }
}
