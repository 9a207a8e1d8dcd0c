//! 题目打包 - 业务能力层
//!
//! 以子进程方式运行外部转换器：`<converter> <artifact>`，转换器在生成文件旁边写出
//! `final.text2qti.zip`。退出码非 0 只影响当前文档；找不到转换器则返回
//! [`ConverterError::NotInstalled`]，由调用方中止整个打包阶段。

use crate::error::{AppResult, ConverterError};
use crate::models::SourceDocument;
use std::io::ErrorKind;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackagingOutcome {
    /// 没有生成文件
    MissingArtifact,
    /// 题目包已存在
    AlreadyPackaged,
    Packaged { stdout: String },
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// 外部转换器
pub struct QuizPackager {
    program: String,
    args: Vec<String>,
}

impl QuizPackager {
    /// `command` 按空白拆分，第一段为程序名，其余为固定参数
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub async fn package(&self, doc: &SourceDocument) -> AppResult<PackagingOutcome> {
        let artifact = doc.artifact_path();
        if !artifact.is_file() {
            return Ok(PackagingOutcome::MissingArtifact);
        }
        if doc.package_path().exists() {
            debug!("题目包已存在: {}", doc.package_path().display());
            return Ok(PackagingOutcome::AlreadyPackaged);
        }
        self.run(&artifact).await
    }

    /// 对单个生成文件运行转换器
    pub async fn run(&self, artifact: &Path) -> AppResult<PackagingOutcome> {
        debug!("运行: {} {:?} {}", self.program, self.args, artifact.display());

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(artifact)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    ConverterError::NotInstalled {
                        program: self.program.clone(),
                    }
                } else {
                    ConverterError::SpawnFailed {
                        program: self.program.clone(),
                        source: e,
                    }
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(PackagingOutcome::Packaged { stdout })
        } else {
            Ok(PackagingOutcome::Failed {
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}
