//! 补全服务客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};
use crate::models::{CompletionChoice, CompletionResponse};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

/// 补全服务
///
/// 输入一段完整提示词，返回未经归一化的响应，由调用方通过
/// [`CompletionResponse::into_text`] 取出文本。
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> AppResult<CompletionResponse>;
}

/// 基于 OpenAI 兼容接口的补全服务
pub struct OpenAiCompletion {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
}

impl OpenAiCompletion {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
        }
    }
}

fn build_failed(e: impl std::error::Error + Send + Sync + 'static) -> AppError {
    AppError::Llm(LlmError::RequestBuildFailed {
        source: Box::new(e),
    })
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> AppResult<CompletionResponse> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("提示词长度: {} 字符", prompt.len());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(build_failed)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(self.temperature)
            .build()
            .map_err(build_failed)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(&self.model_name, e)
        })?;

        debug!("LLM API 调用成功，返回 {} 个候选", response.choices.len());

        let choices: Vec<CompletionChoice> = response
            .choices
            .into_iter()
            .map(|choice| CompletionChoice::Message(Box::new(choice.message.content.into())))
            .collect();

        if choices.is_empty() {
            return Ok(CompletionResponse::Absent);
        }
        Ok(CompletionResponse::Choices(choices))
    }
}
