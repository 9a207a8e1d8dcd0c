//! # PDF Quiz Pipeline
//!
//! 把成批的 PDF 试卷转换为可导入的测验：远程 OCR → 合并 Markdown → 图片外置
//! → LLM 生成题目文本 → 外部转换器打包 →（可选）上传到课程平台并发布
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `PageController` - 上传 / 点击 / 下载目录 / 有界等待
//! - `clients/` - 补全服务（`CompletionService`）与课程平台（`CourseApi`）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个文档
//! - `OcrDriver` - OCR 页面状态机
//! - `archive_merger` / `image_extractor` - 合并分页、外置图片
//! - `QuestionGenerator` / `QuizPackager` / `QuizPublisher` - 生成、打包、发布
//! - `WarnWriter` - 写 warn.txt 能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文档"的提取流程
//! - `DocumentCtx` - 上下文封装（阶段 + 序号 + 目录 + 文件名）
//! - `ExtractionFlow` - 复用 → 恢复 → OCR → 图片外置
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 应用入口，管理浏览器资源
//! - `orchestrator/pipeline` - 按阶段调度全部文档并统计
//!
//! ## 模块结构

pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{connect_to_browser_and_page, launch_headless_browser};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ChromiumPage, JsExecutor, PageController, WaitCondition, WaitOutcome};
pub use models::{CompletionResponse, FolderBatch, OcrSelectors, SourceDocument};
pub use orchestrator::{App, Pipeline, PipelineReport, PipelineSettings, StageStats};
pub use workflow::{DocumentCtx, ExtractionFlow, ExtractionResult};
