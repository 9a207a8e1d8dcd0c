//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和阶段调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 管理浏览器资源（Browser、ChromiumPage）
//! - 扫描目录，输出全局统计信息
//!
//! ### `pipeline` - 阶段调度
//! - 按阶段遍历全部文档：提取 → 生成 → 打包 → 发布
//! - 统计每个阶段的成功 / 跳过 / 失败
//! - 把跳过和失败的文档写入 warn 文件
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (Vec<FolderBatch>)
//!     ↓
//! pipeline (按阶段遍历 SourceDocument)
//!     ↓
//! workflow::ExtractionFlow (单个文档的提取)
//!     ↓
//! services (能力层：ocr / merge / images / generate / package / publish / warn)
//!     ↓
//! infrastructure / clients (页面控制器、补全服务、课程平台)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层持有 Browser
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和统计

pub mod batch_processor;
pub mod pipeline;

// 重新导出主要类型
pub use batch_processor::App;
pub use pipeline::{Pipeline, PipelineReport, PipelineSettings, StageStats};
