//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"的能力

use crate::error::{AppError, AppResult, BrowserError};
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// JS 执行器
///
/// 职责：
/// - 持有 Page
/// - 暴露 eval() 能力
/// - 不认识文档和流水线阶段
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于 CDP 命令）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value().map_err(|e| {
            AppError::Browser(BrowserError::ScriptExecutionFailed {
                source: Box::new(e),
            })
        })?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 对 `document.querySelector(selector)` 的结果执行一段脚本
    ///
    /// `body` 中以 `el` 引用元素（可能为 null），须自行 `return`。
    pub async fn eval_on_selector<T: DeserializeOwned>(
        &self,
        selector: &str,
        body: &str,
    ) -> AppResult<T> {
        self.eval_as(selector_script(selector, body)?).await
    }
}

/// 构建以选择器为入参的立即执行脚本
pub(crate) fn selector_script(selector: &str, body: &str) -> AppResult<String> {
    let selector_json = serde_json::to_string(selector)?;
    Ok(format!(
        "(() => {{ const el = document.querySelector({}); {} }})()",
        selector_json, body
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_is_json_escaped() {
        let script =
            selector_script("input[type='file'][data-testid=\"x\"]", "return !!el;").unwrap();
        assert!(script.contains(r#"document.querySelector("input[type='file'][data-testid=\"x\"]")"#));
        assert!(script.ends_with("return !!el; })()"));
    }
}
