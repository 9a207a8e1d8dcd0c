//! 补全服务的响应形态
//!
//! 不同后端返回的结构各不相同：纯字符串、带 `content` 的消息、带 `text`
//! 的对象、或 `choices` 列表，且字段可能嵌套。这里把已知形态建模为
//! 枚举，并保留一个 `Unrecognized` 兜底分支，`into_text` 对所有分支都有定义。

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResponse {
    /// 没有响应
    Absent,
    Text(String),
    /// `{ "content": ... }`
    Content(Box<CompletionResponse>),
    /// `{ "text": ... }`
    TextField(Box<CompletionResponse>),
    /// `{ "choices": [...] }`
    Choices(Vec<CompletionChoice>),
    Unrecognized(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionChoice {
    /// `{ "message": { "content": ... } }` 或 `{ "message": "..." }`
    Message(Box<CompletionResponse>),
    /// `{ "text": ... }`
    Text(Box<CompletionResponse>),
    Other(Value),
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        CompletionResponse::Text(text.into())
    }

    /// 从任意 JSON 值识别响应形态
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => CompletionResponse::Absent,
            Value::String(s) => CompletionResponse::Text(s),
            Value::Object(mut map) => {
                if let Some(content) = map.remove("content") {
                    return CompletionResponse::Content(Box::new(Self::from_value(content)));
                }
                if let Some(text) = map.remove("text") {
                    return CompletionResponse::TextField(Box::new(Self::from_value(text)));
                }
                match map.remove("choices") {
                    Some(Value::Array(choices)) if !choices.is_empty() => {
                        CompletionResponse::Choices(
                            choices.into_iter().map(CompletionChoice::from_value).collect(),
                        )
                    }
                    Some(other) => {
                        map.insert("choices".to_string(), other);
                        CompletionResponse::Unrecognized(Value::Object(map))
                    }
                    None => CompletionResponse::Unrecognized(Value::Object(map)),
                }
            }
            other => CompletionResponse::Unrecognized(other),
        }
    }

    /// 提取纯文本；无法识别时退化为 JSON 字符串
    pub fn into_text(self) -> String {
        match self {
            CompletionResponse::Absent => String::new(),
            CompletionResponse::Text(s) => s,
            CompletionResponse::Content(inner) | CompletionResponse::TextField(inner) => {
                inner.into_text()
            }
            CompletionResponse::Choices(choices) => choices
                .into_iter()
                .next()
                .map(CompletionChoice::into_text)
                .unwrap_or_default(),
            CompletionResponse::Unrecognized(value) => value.to_string(),
        }
    }
}

impl CompletionChoice {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                if let Some(message) = map.remove("message") {
                    let inner = match message {
                        Value::Object(mut message) => match message.remove("content") {
                            Some(content) => CompletionResponse::from_value(content),
                            None => CompletionResponse::Unrecognized(Value::Object(message)),
                        },
                        other => CompletionResponse::from_value(other),
                    };
                    return CompletionChoice::Message(Box::new(inner));
                }
                match map.remove("text") {
                    Some(text) => CompletionChoice::Text(Box::new(CompletionResponse::from_value(text))),
                    None => CompletionChoice::Other(Value::Object(map)),
                }
            }
            other => CompletionChoice::Other(other),
        }
    }

    fn into_text(self) -> String {
        match self {
            CompletionChoice::Message(inner) | CompletionChoice::Text(inner) => inner.into_text(),
            CompletionChoice::Other(value) => match value {
                Value::String(s) => s,
                other => other.to_string(),
            },
        }
    }
}

impl From<String> for CompletionResponse {
    fn from(text: String) -> Self {
        CompletionResponse::Text(text)
    }
}

impl From<Option<String>> for CompletionResponse {
    fn from(text: Option<String>) -> Self {
        text.map(CompletionResponse::Text)
            .unwrap_or(CompletionResponse::Absent)
    }
}
