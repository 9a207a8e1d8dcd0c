//! 文档处理上下文
//!
//! 封装"我正在处理哪个目录的第几个文档"这一信息

use crate::models::SourceDocument;
use std::fmt::Display;

/// 文档处理上下文
#[derive(Debug, Clone)]
pub struct DocumentCtx {
    /// 当前阶段名
    pub stage: &'static str,

    /// 阶段内序号（从1开始）
    pub index: usize,

    pub total: usize,

    pub folder: String,

    pub file_name: String,
}

impl DocumentCtx {
    pub fn new(stage: &'static str, index: usize, total: usize, doc: &SourceDocument) -> Self {
        Self {
            stage,
            index,
            total,
            folder: doc.folder().to_string(),
            file_name: doc.file_name().to_string(),
        }
    }
}

impl Display for DocumentCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {}/{} {}/{}]",
            self.stage, self.index, self.total, self.folder, self.file_name
        )
    }
}
