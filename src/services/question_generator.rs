//! 题目生成 - 业务能力层
//!
//! 把提示词模板和合并文档拼接后交给补全服务，归一化响应文本并写入生成文件。
//! 本阶段不重试，失败由调用方记录并跳过。

use crate::clients::CompletionService;
use crate::error::{AppError, AppResult};
use crate::models::SourceDocument;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 模板与文档之间的分隔
pub const PROMPT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// 写入了新的生成文件
    Generated { artifact: PathBuf, chars: usize },
    /// 生成文件已存在且未要求覆盖
    AlreadyGenerated(PathBuf),
    /// 合并文档和备用文档都不存在
    MissingSource,
}

/// 读取提示词模板，文件不存在时返回空模板
pub fn load_prompt_template(path: &Path) -> AppResult<String> {
    match fs::read_to_string(path) {
        Ok(template) => {
            info!("已加载提示词: {} ({} 字符)", path.display(), template.chars().count());
            Ok(template)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("⚠️ 未找到提示词文件 {}，使用空模板", path.display());
            Ok(String::new())
        }
        Err(e) => Err(AppError::file_read_failed(path, e)),
    }
}

pub fn build_prompt(template: &str, document: &str) -> String {
    format!("{}{}{}", template, PROMPT_SEPARATOR, document)
}

/// 合并文档优先，其次是与工作目录同级的 `<stem>.md`
pub fn resolve_source(doc: &SourceDocument) -> Option<PathBuf> {
    [doc.consolidated_path(), doc.fallback_markdown_path()]
        .into_iter()
        .find(|p| p.is_file())
}

/// 生成文件即将重写，旧的题目包和发布记录不再与之对应
fn discard_stale_outputs(doc: &SourceDocument) -> AppResult<()> {
    for stale in [doc.package_path(), doc.publication_marker_path()] {
        match fs::remove_file(&stale) {
            Ok(()) => info!("🗑️ 已删除过期产物: {}", stale.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::file_write_failed(&stale, e)),
        }
    }
    Ok(())
}

pub struct QuestionGenerator<'a> {
    service: &'a dyn CompletionService,
    template: &'a str,
    overwrite: bool,
}

impl<'a> QuestionGenerator<'a> {
    pub fn new(service: &'a dyn CompletionService, template: &'a str, overwrite: bool) -> Self {
        Self {
            service,
            template,
            overwrite,
        }
    }

    pub async fn generate(&self, doc: &SourceDocument) -> AppResult<GenerationOutcome> {
        let artifact = doc.artifact_path();
        if artifact.exists() && !self.overwrite {
            debug!("生成文件已存在: {}", artifact.display());
            return Ok(GenerationOutcome::AlreadyGenerated(artifact));
        }

        let Some(source) = resolve_source(doc) else {
            return Ok(GenerationOutcome::MissingSource);
        };
        let document =
            fs::read_to_string(&source).map_err(|e| AppError::file_read_failed(&source, e))?;
        debug!("读取文档: {} ({} 字符)", source.display(), document.chars().count());

        let response = self
            .service
            .complete(&build_prompt(self.template, &document))
            .await?;
        let text = response.into_text();

        discard_stale_outputs(doc)?;
        if let Some(parent) = artifact.parent() {
            fs::create_dir_all(parent).map_err(|e| AppError::file_write_failed(parent, e))?;
        }
        fs::write(&artifact, &text).map_err(|e| AppError::file_write_failed(&artifact, e))?;

        Ok(GenerationOutcome::Generated {
            artifact,
            chars: text.chars().count(),
        })
    }
}
