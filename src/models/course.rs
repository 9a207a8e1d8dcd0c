//! 课程平台的数据结构（只覆盖流水线用到的字段）

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `POST /courses/{id}/content_migrations/` 的返回
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationDescriptor {
    #[serde(default)]
    pub id: Option<u64>,
    pub progress_url: String,
    pub pre_attachment: PreAttachment,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreAttachment {
    pub upload_url: String,
    #[serde(default)]
    pub upload_params: Map<String, Value>,
}

impl PreAttachment {
    /// 上传表单中文件字段使用的文件名
    pub fn file_name(&self) -> Option<&str> {
        self.upload_params.get("Filename").and_then(|v| v.as_str())
    }
}

/// 迁移任务的状态：queued → running → completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Queued,
    Running,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// `GET {progress_url}` 的返回
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationProgress {
    #[serde(default)]
    pub completion: Option<f64>,
    pub workflow_state: WorkflowState,
}

/// 发布成功后写在题目包旁边的记录，文件存在即视为已发布
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublishedQuiz {
    pub quiz_id: u64,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuizSummary {
    pub id: u64,
    #[serde(default)]
    pub title: String,
}
