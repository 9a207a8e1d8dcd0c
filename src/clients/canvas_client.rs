//! 课程平台 API 客户端
//!
//! 封装迁移任务（创建 → 上传 → 查询进度）与测验的查询、改名、发布。
//! 所有非 2xx 响应都转换为 [`ApiError::BadResponse`]。

use crate::config::CanvasConfig;
use crate::error::{ApiError, AppError, AppResult};
use crate::models::{MigrationDescriptor, MigrationProgress, PreAttachment, QuizSummary};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, LINK};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 每页测验数量
const QUIZ_PAGE_SIZE: u32 = 100;

/// 课程平台能力
#[async_trait]
pub trait CourseApi: Send + Sync {
    /// 创建一个 QTI 导入迁移任务，`package_name` 为预上传附件的文件名
    async fn create_migration(&self, package_name: &str) -> AppResult<MigrationDescriptor>;

    /// 把题目包上传到迁移任务给出的预签名地址
    async fn upload_package(&self, attachment: &PreAttachment, package: &Path) -> AppResult<()>;

    async fn migration_progress(&self, progress_url: &str) -> AppResult<MigrationProgress>;

    /// 课程下全部测验（自动翻页）
    async fn list_quizzes(&self) -> AppResult<Vec<QuizSummary>>;

    async fn rename_quiz(&self, quiz_id: u64, title: &str) -> AppResult<()>;

    async fn publish_quiz(&self, quiz_id: u64) -> AppResult<()>;

    /// 测验的浏览器访问地址
    fn quiz_url(&self, quiz_id: u64) -> String;
}

/// Canvas REST API 客户端
pub struct CanvasClient {
    http: Client,
    api_url: String,
    api_key: String,
    course_id: String,
}

impl CanvasClient {
    pub fn new(config: &CanvasConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| AppError::api_request_failed(&config.api_url, e))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            course_id: config.course_id.clone(),
        })
    }

    fn course_endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/v1/courses/{}/{}",
            self.api_url, self.course_id, path
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.api_key)
    }

    async fn send(&self, endpoint: &str, builder: RequestBuilder) -> AppResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;
        ensure_success(endpoint, response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        builder: RequestBuilder,
    ) -> AppResult<T> {
        let response = self.send(endpoint, builder).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn edit_quiz(&self, quiz_id: u64, quiz: Value) -> AppResult<()> {
        let endpoint = self.course_endpoint(&format!("quizzes/{}", quiz_id));
        let builder = self
            .authorized(self.http.put(&endpoint))
            .json(&json!({ "quiz": quiz }));
        self.send(&endpoint, builder).await?;
        Ok(())
    }
}

async fn ensure_success(endpoint: &str, response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::BadResponse {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    }
    .into())
}

/// 迁移任务的请求体
pub fn migration_payload(package_name: &str) -> Value {
    json!({
        "migration_type": "qti_converter",
        "pre_attachment": { "name": package_name },
        "settings": { "import_quizzes_next": false },
    })
}

/// 从 `Link` 响应头中取 `rel="next"` 的地址
pub fn next_page_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let mut segments = link.split(';').map(str::trim);
            let url = segments.next()?.strip_prefix('<')?.strip_suffix('>')?;
            segments
                .any(|param| param == r#"rel="next""# || param == "rel=next")
                .then(|| url.to_string())
        })
}

#[async_trait]
impl CourseApi for CanvasClient {
    async fn create_migration(&self, package_name: &str) -> AppResult<MigrationDescriptor> {
        let endpoint = self.course_endpoint("content_migrations/");
        let builder = self
            .authorized(self.http.post(&endpoint))
            .json(&migration_payload(package_name));
        let migration: MigrationDescriptor = self.send_json(&endpoint, builder).await?;
        debug!("已创建迁移任务: {:?}", migration.id);
        Ok(migration)
    }

    async fn upload_package(&self, attachment: &PreAttachment, package: &Path) -> AppResult<()> {
        let endpoint = attachment.upload_url.clone();
        let file_name = attachment.file_name().map(str::to_string).ok_or_else(|| {
            AppError::Api(ApiError::MissingField {
                endpoint: endpoint.clone(),
                field: "upload_params.Filename".to_string(),
            })
        })?;

        let bytes = tokio::fs::read(package)
            .await
            .map_err(|e| AppError::file_read_failed(package, e))?;
        debug!("上传题目包 {} ({} 字节)", file_name, bytes.len());

        let mut form = Form::new();
        for (key, value) in &attachment.upload_params {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(key.clone(), text);
        }
        form = form.part("file", Part::bytes(bytes).file_name(file_name));

        // 预签名地址不携带令牌
        self.send(&endpoint, self.http.post(&endpoint).multipart(form))
            .await?;
        Ok(())
    }

    async fn migration_progress(&self, progress_url: &str) -> AppResult<MigrationProgress> {
        let builder = self.authorized(self.http.get(progress_url));
        self.send_json(progress_url, builder).await
    }

    async fn list_quizzes(&self) -> AppResult<Vec<QuizSummary>> {
        let mut quizzes = Vec::new();
        let mut next = Some(format!(
            "{}?per_page={}",
            self.course_endpoint("quizzes"),
            QUIZ_PAGE_SIZE
        ));

        while let Some(endpoint) = next.take() {
            let response = self
                .send(&endpoint, self.authorized(self.http.get(&endpoint)))
                .await?;
            next = next_page_url(response.headers());
            let body = response
                .text()
                .await
                .map_err(|e| AppError::api_request_failed(&endpoint, e))?;
            let page: Vec<QuizSummary> = serde_json::from_str(&body)?;
            debug!("获取测验 {} 个: {}", page.len(), endpoint);
            quizzes.extend(page);
        }

        Ok(quizzes)
    }

    async fn rename_quiz(&self, quiz_id: u64, title: &str) -> AppResult<()> {
        self.edit_quiz(quiz_id, json!({ "title": title })).await
    }

    async fn publish_quiz(&self, quiz_id: u64) -> AppResult<()> {
        self.edit_quiz(quiz_id, json!({ "published": true })).await
    }

    fn quiz_url(&self, quiz_id: u64) -> String {
        format!(
            "{}/courses/{}/quizzes/{}",
            self.api_url, self.course_id, quiz_id
        )
    }
}
