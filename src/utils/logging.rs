/// 日志工具模块
///
/// 初始化 tracing（控制台 + 运行日志文件），以及各阶段的横幅输出
use crate::config::Config;
use crate::orchestrator::pipeline::{PipelineReport, StageStats};
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日志：控制台带颜色，同时追加写入运行日志文件
///
/// `RUST_LOG` 优先；否则按 `verbose` 选择 debug 或 info。
pub fn init(log_file_path: &str, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .with_context(|| format!("无法打开日志文件: {}", log_file_path))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("日志系统已初始化")?;

    Ok(())
}

/// 初始化日志文件（截断并写入表头）
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n文档转换日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - PDF → 题目包 流水线");
    info!("📁 数据目录: {}", config.data_dir.display());
    info!("📂 子目录: {:?}", config.loading_folders);
    info!("🤖 模型: {}", config.llm_model_name);
    info!(
        "📤 发布阶段: {}",
        if config.publish_enabled { "启用" } else { "未启用" }
    );
    info!("{}", "=".repeat(60));
}

/// 记录阶段开始
pub fn log_stage_start(stage: &str, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 阶段开始: {} (共 {} 个文档)", stage, total);
    info!("{}", "=".repeat(60));
}

/// 记录阶段完成
pub fn log_stage_complete(stage: &str, stats: &StageStats) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 阶段完成: {} | 成功 {} | 跳过 {} | 失败 {}",
        stage, stats.succeeded, stats.skipped, stats.failed
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(report: &PipelineReport, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    for (stage, stats) in report.stages() {
        info!(
            "{:<8} ✅ {:>4}  ⏭️ {:>4}  ❌ {:>4}",
            stage, stats.succeeded, stats.skipped, stats.failed
        );
    }
    if report.packaging_aborted {
        info!("⚠️ 打包阶段因转换器缺失而中止");
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("Câu hỏi số một", 3), "Câu...");
    }

    #[test]
    fn test_init_log_file_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        fs::write(&path, "old content").unwrap();

        init_log_file(path.to_str().unwrap()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("文档转换日志"));
        assert!(!content.contains("old content"));
    }
}
