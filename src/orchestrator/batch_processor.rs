//! 批量文档处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责资源管理和全局统计。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：加载选择器与提示词、创建 LLM 与课程平台客户端
//! 2. **批量加载**：扫描配置的子目录，收集全部 PDF（`Vec<FolderBatch>`）
//! 3. **按需连接浏览器**：只有存在需要远程 OCR 的文档时才连接并等待 OCR 页面就绪
//! 4. **顺序处理**：OCR 页面是单一会话，所有文档依次处理
//! 5. **资源管理**：Browser 与页面控制器的生命周期覆盖整个流水线
//! 6. **全局统计**：输出各阶段的成功 / 跳过 / 失败数

use crate::browser;
use crate::clients::{CanvasClient, OpenAiCompletion};
use crate::config::Config;
use crate::infrastructure::{ChromiumPage, JsExecutor};
use crate::models::OcrSelectors;
use crate::orchestrator::pipeline::{Pipeline, PipelineReport, PipelineSettings};
use crate::services::question_generator::load_prompt_template;
use crate::services::{scan_folders, QuizPackager, WarnWriter};
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::needs_remote_ocr;
use anyhow::{Context, Result};
use chromiumoxide::Browser;
use tracing::{info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    completion: OpenAiCompletion,
    course: Option<CanvasClient>,
    settings: PipelineSettings,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let selectors = match &config.selectors_file {
            Some(path) => OcrSelectors::load(path)?,
            None => OcrSelectors::default(),
        };
        let prompt_template = load_prompt_template(&config.prompt_file)?;

        let course = match (&config.canvas, config.publish_enabled) {
            (Some(canvas), true) => {
                info!("📚 课程 {} (部分: {})", canvas.course_id, canvas.part_used);
                Some(CanvasClient::new(canvas)?)
            }
            _ => None,
        };

        let settings = PipelineSettings::from_config(&config, selectors, prompt_template);

        Ok(Self {
            completion: OpenAiCompletion::new(&config),
            config,
            course,
            settings,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<PipelineReport> {
        info!("\n📁 正在扫描待处理的 PDF...");
        let batches = scan_folders(&self.config.data_dir, &self.config.loading_folders)
            .await
            .with_context(|| format!("扫描 {} 失败", self.config.data_dir.display()))?;

        let total: usize = batches.iter().map(|b| b.documents.len()).sum();
        if total == 0 {
            warn!("⚠️ 没有找到待处理的 PDF 文件，程序结束");
            return Ok(PipelineReport::default());
        }
        info!("✓ 找到 {} 个待处理的 PDF（{} 个目录）", total, batches.len());

        let packager = QuizPackager::new(&self.config.converter);
        let warn_writer = WarnWriter::with_path(&self.config.warn_file);

        let pending = batches
            .iter()
            .flat_map(|b| b.documents.iter())
            .filter(|doc| needs_remote_ocr(doc))
            .count();
        let ocr = if pending > 0 {
            info!("🌐 {} 个文档需要远程 OCR，连接浏览器", pending);
            Some(self.open_ocr_page().await?)
        } else {
            info!("✓ 所有文档都已有合并文档或压缩包，不启动浏览器");
            None
        };

        let mut pipeline =
            Pipeline::new(&self.completion, &packager, &warn_writer, &self.settings);
        if let Some((_browser, page)) = &ocr {
            pipeline = pipeline.with_page(page);
        }
        if let Some(course) = &self.course {
            pipeline = pipeline.with_course(course);
        }

        let report = pipeline.run(&batches).await;

        print_final_stats(&report, &self.config.output_log_file);
        Ok(report)
    }

    /// 连接或启动浏览器，并等待 OCR 页面就绪
    async fn open_ocr_page(&self) -> Result<(Browser, ChromiumPage)> {
        let (browser, page) = match self.config.browser_debug_port {
            Some(port) => {
                browser::connect_to_browser_and_page(port, &self.config.ocr_target_url).await?
            }
            None => {
                browser::launch_headless_browser(
                    &self.config.ocr_target_url,
                    self.config.chrome_executable.as_deref(),
                )
                .await?
            }
        };

        let page = ChromiumPage::new(JsExecutor::new(page));
        let selectors = &self.settings.selectors;
        page.wait_until_ready(
            &selectors.parse_button,
            &selectors.file_input,
            self.config.page_ready_timeout,
        )
        .await
        .context("OCR 页面未就绪")?;
        info!("✓ OCR 页面已就绪");

        Ok((browser, page))
    }
}
