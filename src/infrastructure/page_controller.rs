//! 远程页面控制器
//!
//! 流水线只通过 [`PageController`] 操作 OCR 页面：上传、点击、设置下载目录、
//! 等待元素状态。等待不抛错，而是返回 [`WaitOutcome`]，由调用方决定超时是否致命。

use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::JsExecutor;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// 等待的目标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// 元素存在于 DOM 中
    Present,
    Visible,
    /// 元素不存在或不可见
    Invisible,
    /// 可见且未禁用
    Clickable,
}

/// 一次有界等待的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Failed(String),
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready)
    }
}

#[async_trait]
pub trait PageController: Send + Sync {
    /// 把本地文件交给上传控件
    async fn upload_file(&self, selector: &str, path: &Path) -> AppResult<()>;

    async fn click(&self, selector: &str) -> AppResult<()>;

    /// 设置浏览器下载目录
    async fn set_download_dir(&self, dir: &Path) -> AppResult<()>;

    async fn wait_for(
        &self,
        selector: &str,
        condition: WaitCondition,
        timeout: Duration,
    ) -> WaitOutcome;
}

/// 元素状态探针的返回
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct ElementProbe {
    present: bool,
    visible: bool,
    enabled: bool,
}

impl ElementProbe {
    fn satisfies(self, condition: WaitCondition) -> bool {
        match condition {
            WaitCondition::Present => self.present,
            WaitCondition::Visible => self.present && self.visible,
            WaitCondition::Invisible => !self.present || !self.visible,
            WaitCondition::Clickable => self.present && self.visible && self.enabled,
        }
    }
}

const PROBE_BODY: &str = r#"
    if (!el) { return { present: false, visible: false, enabled: false }; }
    const style = window.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    const visible = style.display !== 'none'
        && style.visibility !== 'hidden'
        && (rect.width > 0 || rect.height > 0);
    return { present: true, visible: visible, enabled: !el.disabled };
"#;

const CLICK_BODY: &str = "if (!el) { return false; } el.click(); return true;";

/// 基于 chromiumoxide 的页面控制器
pub struct ChromiumPage {
    executor: JsExecutor,
    poll_interval: Duration,
}

impl ChromiumPage {
    pub fn new(executor: JsExecutor) -> Self {
        Self {
            executor,
            poll_interval: Duration::from_millis(250),
        }
    }

    async fn probe(&self, selector: &str) -> AppResult<ElementProbe> {
        self.executor.eval_on_selector(selector, PROBE_BODY).await
    }

    /// 等待页面加载完成，且解析按钮或上传控件之一出现
    pub async fn wait_until_ready(
        &self,
        parse_selector: &str,
        file_input_selector: &str,
        timeout: Duration,
    ) -> AppResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let state: Option<String> = self
                .executor
                .eval_as("document.readyState")
                .await
                .ok();
            if state.as_deref() == Some("complete") {
                for selector in [parse_selector, file_input_selector] {
                    if self.probe(selector).await.map(|p| p.present).unwrap_or(false) {
                        return Ok(());
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(AppError::Browser(BrowserError::PageNotReady {
                    reason: format!("{} 秒内未找到 {}", timeout.as_secs(), parse_selector),
                }));
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl PageController for ChromiumPage {
    async fn upload_file(&self, selector: &str, path: &Path) -> AppResult<()> {
        let element = self
            .executor
            .page()
            .find_element(selector)
            .await
            .map_err(|_| AppError::element_not_found(selector))?;

        let mut params = SetFileInputFilesParams::new(vec![path.to_string_lossy().to_string()]);
        params.backend_node_id = Some(element.backend_node_id);
        self.executor.page().execute(params).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> AppResult<()> {
        let clicked: bool = self.executor.eval_on_selector(selector, CLICK_BODY).await?;
        if clicked {
            Ok(())
        } else {
            Err(AppError::element_not_found(selector))
        }
    }

    async fn set_download_dir(&self, dir: &Path) -> AppResult<()> {
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.to_string_lossy().to_string())
            .build()
            .map_err(|reason| {
                AppError::Browser(BrowserError::CommandFailed {
                    command: "Browser.setDownloadBehavior".to_string(),
                    reason,
                })
            })?;
        self.executor.page().execute(params).await?;
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &str,
        condition: WaitCondition,
        timeout: Duration,
    ) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut last_error = None;
        let mut probed_once = false;

        loop {
            match self.probe(selector).await {
                Ok(probe) => {
                    probed_once = true;
                    if probe.satisfies(condition) {
                        return WaitOutcome::Ready;
                    }
                }
                Err(e) => {
                    debug!("探测 {} 失败: {}", selector, e);
                    last_error = Some(e.to_string());
                }
            }

            if Instant::now() >= deadline {
                return match (probed_once, last_error) {
                    (false, Some(reason)) => WaitOutcome::Failed(reason),
                    _ => WaitOutcome::TimedOut,
                };
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(present: bool, visible: bool, enabled: bool) -> ElementProbe {
        ElementProbe {
            present,
            visible,
            enabled,
        }
    }

    #[test]
    fn test_invisible_includes_missing() {
        assert!(probe(false, false, false).satisfies(WaitCondition::Invisible));
        assert!(probe(true, false, true).satisfies(WaitCondition::Invisible));
        assert!(!probe(true, true, true).satisfies(WaitCondition::Invisible));
    }

    #[test]
    fn test_clickable_requires_enabled() {
        assert!(!probe(true, true, false).satisfies(WaitCondition::Clickable));
        assert!(probe(true, true, true).satisfies(WaitCondition::Clickable));
        assert!(probe(true, false, false).satisfies(WaitCondition::Present));
        assert!(!probe(true, false, true).satisfies(WaitCondition::Visible));
    }
}
