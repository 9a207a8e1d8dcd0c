//! 阶段调度 - 编排层
//!
//! 按阶段依次遍历全部文档：提取 → 生成 → 打包 → 发布（可选）。
//! 每个文档的失败只记入本阶段统计和 warn 文件，不影响其他文档；
//! 只有转换器缺失这种环境错误会提前结束打包阶段。

use crate::clients::{CompletionService, CourseApi};
use crate::config::{Config, DriverTimeouts};
use crate::error::AppError;
use crate::infrastructure::PageController;
use crate::models::{FolderBatch, OcrSelectors, SourceDocument};
use crate::services::{
    GenerationOutcome, PackagingOutcome, PublicationOutcome, QuestionGenerator, QuizPackager,
    QuizPublisher, WarnWriter,
};
use crate::utils::logging::{log_stage_complete, log_stage_start, truncate_text};
use crate::workflow::{DocumentCtx, DocumentOrigin, ExtractionFlow, ExtractionResult};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const STAGE_EXTRACTION: &str = "提取";
pub const STAGE_GENERATION: &str = "生成";
pub const STAGE_PACKAGING: &str = "打包";
pub const STAGE_PUBLICATION: &str = "发布";

/// 单个阶段的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StageStats {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// 一次运行的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub extraction: StageStats,
    pub generation: StageStats,
    pub packaging: StageStats,
    pub publication: StageStats,
    /// 转换器缺失，打包阶段未跑完
    pub packaging_aborted: bool,
}

impl PipelineReport {
    pub fn stages(&self) -> [(&'static str, &StageStats); 4] {
        [
            (STAGE_EXTRACTION, &self.extraction),
            (STAGE_GENERATION, &self.generation),
            (STAGE_PACKAGING, &self.packaging),
            (STAGE_PUBLICATION, &self.publication),
        ]
    }
}

/// 流水线运行参数
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub selectors: OcrSelectors,
    pub driver_timeouts: DriverTimeouts,
    pub prompt_template: String,
    pub overwrite_generated: bool,
    pub publish_enabled: bool,
    pub migration_poll_interval: Duration,
    pub migration_max_polls: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &Config, selectors: OcrSelectors, prompt_template: String) -> Self {
        Self {
            selectors,
            driver_timeouts: config.driver_timeouts.clone(),
            prompt_template,
            overwrite_generated: config.overwrite_generated,
            publish_enabled: config.publish_enabled,
            migration_poll_interval: config.migration_poll_interval,
            migration_max_polls: config.migration_max_polls,
        }
    }
}

/// 流水线
///
/// 只借用各项能力，不持有浏览器等资源。
pub struct Pipeline<'a> {
    page: Option<&'a dyn PageController>,
    completion: &'a dyn CompletionService,
    packager: &'a QuizPackager,
    course: Option<&'a dyn CourseApi>,
    warn_writer: &'a WarnWriter,
    settings: &'a PipelineSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        completion: &'a dyn CompletionService,
        packager: &'a QuizPackager,
        warn_writer: &'a WarnWriter,
        settings: &'a PipelineSettings,
    ) -> Self {
        Self {
            page: None,
            completion,
            packager,
            course: None,
            warn_writer,
            settings,
        }
    }

    /// 提供 OCR 页面；没有页面时，缺少合并文档的文档在提取阶段被跳过
    pub fn with_page(mut self, page: &'a dyn PageController) -> Self {
        self.page = Some(page);
        self
    }

    /// 启用发布阶段所用的课程平台
    pub fn with_course(mut self, course: &'a dyn CourseApi) -> Self {
        self.course = Some(course);
        self
    }

    pub async fn run(&self, batches: &[FolderBatch]) -> PipelineReport {
        let documents: Vec<&SourceDocument> =
            batches.iter().flat_map(|b| b.documents.iter()).collect();

        let mut report = PipelineReport {
            extraction: self.extraction_pass(&documents).await,
            generation: self.generation_pass(&documents).await,
            ..Default::default()
        };

        let (packaging, aborted) = self.packaging_pass(&documents).await;
        report.packaging = packaging;
        report.packaging_aborted = aborted;

        match (self.settings.publish_enabled, self.course) {
            (true, Some(course)) => {
                report.publication = self.publication_pass(course, &documents).await;
            }
            (true, None) => warn!("⚠️ 已启用发布但未配置课程平台，跳过发布阶段"),
            (false, _) => debug!("发布阶段未启用"),
        }

        report
    }

    fn record_skip(&self, stage: &str, doc: &SourceDocument, reason: &str) {
        if let Err(e) = self.warn_writer.write(stage, doc, reason) {
            warn!("写入 {} 失败: {}", self.warn_writer.path().display(), e);
        }
    }

    /// 提取阶段：OCR → 合并 → 图片外置
    async fn extraction_pass(&self, documents: &[&SourceDocument]) -> StageStats {
        log_stage_start(STAGE_EXTRACTION, documents.len());
        let flow = ExtractionFlow::new(
            self.page,
            &self.settings.selectors,
            &self.settings.driver_timeouts,
        );
        let mut stats = StageStats::default();

        for (index, doc) in documents.iter().enumerate() {
            let ctx = DocumentCtx::new(STAGE_EXTRACTION, index + 1, documents.len(), doc);
            match flow.run(doc, &ctx).await {
                ExtractionResult::Ready { origin, images } => {
                    if images.total() > 0 {
                        info!("{} 🖼️ 图片 {} 张，失败 {}", ctx, images.saved, images.failed.len());
                    }
                    if origin == DocumentOrigin::Existing {
                        stats.skipped += 1;
                    } else {
                        stats.succeeded += 1;
                    }
                }
                ExtractionResult::Skipped(reason) => {
                    warn!("{} ⏭️ 已跳过: {}", ctx, reason);
                    self.record_skip(STAGE_EXTRACTION, doc, &reason);
                    stats.skipped += 1;
                }
                ExtractionResult::Failed(reason) => {
                    error!("{} ❌ 合并失败: {}", ctx, reason);
                    self.record_skip(STAGE_EXTRACTION, doc, &reason);
                    stats.failed += 1;
                }
            }
        }

        log_stage_complete(STAGE_EXTRACTION, &stats);
        stats
    }

    async fn generation_pass(&self, documents: &[&SourceDocument]) -> StageStats {
        log_stage_start(STAGE_GENERATION, documents.len());
        let generator = QuestionGenerator::new(
            self.completion,
            &self.settings.prompt_template,
            self.settings.overwrite_generated,
        );
        let mut stats = StageStats::default();

        for (index, doc) in documents.iter().enumerate() {
            let ctx = DocumentCtx::new(STAGE_GENERATION, index + 1, documents.len(), doc);
            match generator.generate(doc).await {
                Ok(GenerationOutcome::Generated { artifact, chars }) => {
                    info!("{} ✓ 已写入 {} ({} 字符)", ctx, artifact.display(), chars);
                    stats.succeeded += 1;
                }
                Ok(GenerationOutcome::AlreadyGenerated(artifact)) => {
                    info!("{} ⏭️ 生成文件已存在: {}", ctx, artifact.display());
                    stats.skipped += 1;
                }
                Ok(GenerationOutcome::MissingSource) => {
                    warn!("{} ⏭️ 没有合并文档", ctx);
                    self.record_skip(STAGE_GENERATION, doc, "没有合并文档");
                    stats.skipped += 1;
                }
                Err(e) => {
                    error!("{} ❌ 生成失败 ({}): {}", ctx, doc.consolidated_path().display(), e);
                    self.record_skip(STAGE_GENERATION, doc, &e.to_string());
                    stats.failed += 1;
                }
            }
        }

        log_stage_complete(STAGE_GENERATION, &stats);
        stats
    }

    /// 返回统计以及是否因环境错误中止
    async fn packaging_pass(&self, documents: &[&SourceDocument]) -> (StageStats, bool) {
        log_stage_start(STAGE_PACKAGING, documents.len());
        let mut stats = StageStats::default();
        let mut aborted = false;

        for (index, doc) in documents.iter().enumerate() {
            let ctx = DocumentCtx::new(STAGE_PACKAGING, index + 1, documents.len(), doc);
            match self.packager.package(doc).await {
                Ok(PackagingOutcome::MissingArtifact) => {
                    debug!("{} 没有生成文件", ctx);
                    stats.skipped += 1;
                }
                Ok(PackagingOutcome::AlreadyPackaged) => {
                    info!("{} ⏭️ 题目包已存在", ctx);
                    stats.skipped += 1;
                }
                Ok(PackagingOutcome::Packaged { stdout }) => {
                    info!("{} ✓ 打包成功: {}", ctx, doc.package_path().display());
                    if !stdout.is_empty() {
                        debug!("{} stdout: {}", ctx, stdout);
                    }
                    stats.succeeded += 1;
                }
                Ok(PackagingOutcome::Failed {
                    code,
                    stdout,
                    stderr,
                }) => {
                    error!("{} ❌ 转换器退出码 {:?}", ctx, code);
                    if !stdout.is_empty() {
                        error!("{} stdout: {}", ctx, stdout);
                    }
                    if !stderr.is_empty() {
                        error!("{} stderr: {}", ctx, stderr);
                    }
                    let reason = format!("退出码 {:?}: {}", code, truncate_text(&stderr, 200));
                    self.record_skip(STAGE_PACKAGING, doc, &reason);
                    stats.failed += 1;
                }
                Err(e) if e.is_environment() => {
                    error!("❌ {}，中止打包阶段", e);
                    aborted = true;
                    break;
                }
                Err(e) => {
                    error!("{} ❌ 运行转换器失败: {}", ctx, e);
                    self.record_skip(STAGE_PACKAGING, doc, &e.to_string());
                    stats.failed += 1;
                }
            }
        }

        log_stage_complete(STAGE_PACKAGING, &stats);
        (stats, aborted)
    }

    async fn publication_pass(
        &self,
        course: &dyn CourseApi,
        documents: &[&SourceDocument],
    ) -> StageStats {
        log_stage_start(STAGE_PUBLICATION, documents.len());
        let publisher = QuizPublisher::new(
            course,
            self.settings.migration_poll_interval,
            self.settings.migration_max_polls,
        );
        let mut stats = StageStats::default();

        for (index, doc) in documents.iter().enumerate() {
            let ctx = DocumentCtx::new(STAGE_PUBLICATION, index + 1, documents.len(), doc);
            match publisher.publish_document(doc).await {
                Ok(PublicationOutcome::Published { title, url, .. }) => {
                    info!("{} ✓ 已发布 {}: {}", ctx, title, url);
                    stats.succeeded += 1;
                }
                Ok(PublicationOutcome::MissingPackage) => {
                    debug!("{} 没有题目包", ctx);
                    stats.skipped += 1;
                }
                Ok(PublicationOutcome::AlreadyPublished(marker)) => {
                    info!("{} ⏭️ 已发布过: {}", ctx, marker.display());
                    stats.skipped += 1;
                }
                Ok(PublicationOutcome::NoQuizCreated) => {
                    warn!("{} ⚠️ 迁移完成但没有找到测验", ctx);
                    self.record_skip(STAGE_PUBLICATION, doc, "迁移完成但没有找到测验");
                    stats.skipped += 1;
                }
                Err(e) => {
                    error!("{} ❌ 发布失败 ({}): {}", ctx, doc.package_path().display(), e);
                    self.record_skip(STAGE_PUBLICATION, doc, &describe(&e));
                    stats.failed += 1;
                }
            }
        }

        log_stage_complete(STAGE_PUBLICATION, &stats);
        stats
    }
}

fn describe(e: &AppError) -> String {
    truncate_text(&e.to_string(), 300)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_stage_order() {
        let report = PipelineReport {
            generation: StageStats {
                succeeded: 2,
                skipped: 1,
                failed: 0,
            },
            ..Default::default()
        };
        let names: Vec<&str> = report.stages().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["提取", "生成", "打包", "发布"]);
        assert_eq!(report.stages()[1].1.total(), 3);
    }
}
