//! 文档提取流程 - 流程层
//!
//! 核心职责：定义"一个 PDF"如何得到可用的合并文档
//!
//! 流程顺序：
//! 1. `output/final.md` 已存在 → 直接使用
//! 2. `zip/` 中已有完整压缩包（上次下载后中断）→ 从压缩包合并
//! 3. 驱动 OCR 页面：上传 → 解析 → 下载 → 合并 → 清空（没有页面时跳过该文档）
//! 4. 对合并文档做图片外置（每个文档单独编号）

use tracing::{info, warn};

use crate::config::DriverTimeouts;
use crate::infrastructure::PageController;
use crate::models::{OcrSelectors, SourceDocument};
use crate::services::archive_merger;
use crate::services::image_extractor::{self, ExtractionSummary, ImageCounter};
use crate::services::{DriveOutcome, OcrDriver};
use crate::workflow::document_ctx::DocumentCtx;

/// 合并文档的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// 此前的运行已生成
    Existing,
    /// 从已下载的压缩包恢复
    Resumed,
    /// 本次从 OCR 页面获取
    Remote,
}

/// 提取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    Ready {
        origin: DocumentOrigin,
        images: ExtractionSummary,
    },
    /// 页面驱动中途放弃
    Skipped(String),
    /// 已下载但无法合并
    Failed(String),
}

/// 既没有合并文档，也没有可恢复的压缩包
pub fn needs_remote_ocr(doc: &SourceDocument) -> bool {
    !doc.consolidated_path().is_file()
        && archive_merger::find_completed_archive(&doc.zip_dir()).is_none()
}

/// 文档提取流程
///
/// - 编排单个文档的提取步骤
/// - 决定何时复用、何时恢复、何时驱动页面
/// - 页面由编排层持有，这里只借用
pub struct ExtractionFlow<'a> {
    driver: Option<OcrDriver<'a>>,
}

impl<'a> ExtractionFlow<'a> {
    /// `page` 为 `None` 时只能复用或恢复已有结果
    pub fn new(
        page: Option<&'a dyn PageController>,
        selectors: &'a OcrSelectors,
        timeouts: &'a DriverTimeouts,
    ) -> Self {
        Self {
            driver: page.map(|page| OcrDriver::new(page, selectors, timeouts)),
        }
    }

    pub async fn run(&self, doc: &SourceDocument, ctx: &DocumentCtx) -> ExtractionResult {
        let origin = match self.consolidate(doc, ctx).await {
            Ok(origin) => origin,
            Err(result) => return result,
        };

        let mut counter = ImageCounter::new();
        let images = match image_extractor::externalize_images(&doc.consolidated_path(), &mut counter)
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!("{} ⚠️ 图片外置失败: {}", ctx, e);
                ExtractionSummary::default()
            }
        };

        ExtractionResult::Ready { origin, images }
    }

    async fn consolidate(
        &self,
        doc: &SourceDocument,
        ctx: &DocumentCtx,
    ) -> Result<DocumentOrigin, ExtractionResult> {
        if doc.consolidated_path().is_file() {
            info!("{} ✓ 合并文档已存在，跳过 OCR", ctx);
            return Ok(DocumentOrigin::Existing);
        }

        if let Some(archive) = archive_merger::find_completed_archive(&doc.zip_dir()) {
            info!("{} 🔁 发现已下载的压缩包: {}", ctx, archive.display());
            match archive_merger::consolidate(&archive, &doc.output_dir(), &doc.consolidated_path())
            {
                Ok(_) => return Ok(DocumentOrigin::Resumed),
                Err(e) => warn!("{} 压缩包无法使用，重新提交 OCR: {}", ctx, e),
            }
        }

        let Some(driver) = &self.driver else {
            return Err(ExtractionResult::Skipped("OCR 页面不可用".to_string()));
        };
        info!("{} 🔍 提交 OCR 页面...", ctx);
        match driver.process(doc).await {
            DriveOutcome::Consolidated(report) => {
                info!("{} ✓ 合并完成，共 {} 页", ctx, report.pages.len());
                Ok(DocumentOrigin::Remote)
            }
            DriveOutcome::ArchiveFailed { archive, reason } => Err(ExtractionResult::Failed(
                format!("{}: {}", archive.display(), reason),
            )),
            DriveOutcome::Skipped { state, reason } => {
                Err(ExtractionResult::Skipped(format!("{}: {}", state, reason)))
            }
        }
    }
}
