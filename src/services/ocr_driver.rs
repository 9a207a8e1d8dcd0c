//! 远程 OCR 页面驱动 - 业务能力层
//!
//! 每个文档走一遍状态机：
//!
//! ```text
//! LOADED → UPLOADING → UPLOADED → PARSING → PARSED → TAB_SELECTED
//!        → DOWNLOADING → DOWNLOADED → RESET
//! ```
//!
//! 所有等待都有上限。上传标记和结果标签页的超时只记录日志；下载超时则放弃当前文档。
//! 无论成功还是放弃，最后都会尝试清空页面，让下一个文档可以上传。

use crate::config::DriverTimeouts;
use crate::infrastructure::{PageController, WaitCondition, WaitOutcome};
use crate::models::{OcrSelectors, SourceDocument};
use crate::services::archive_merger::{self, MergeReport};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// 浏览器下载中的临时文件后缀
pub const IN_PROGRESS_SUFFIX: &str = ".crdownload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Loaded,
    Uploading,
    Uploaded,
    Parsing,
    Parsed,
    TabSelected,
    Downloading,
    Downloaded,
    Reset,
}

impl fmt::Display for ExtractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionState::Loaded => "LOADED",
            ExtractionState::Uploading => "UPLOADING",
            ExtractionState::Uploaded => "UPLOADED",
            ExtractionState::Parsing => "PARSING",
            ExtractionState::Parsed => "PARSED",
            ExtractionState::TabSelected => "TAB_SELECTED",
            ExtractionState::Downloading => "DOWNLOADING",
            ExtractionState::Downloaded => "DOWNLOADED",
            ExtractionState::Reset => "RESET",
        };
        f.write_str(name)
    }
}

/// 单个文档的驱动结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveOutcome {
    /// 已下载并合并
    Consolidated(MergeReport),
    /// 已下载，但解压或合并失败
    ArchiveFailed { archive: PathBuf, reason: String },
    /// 在 `state` 放弃
    Skipped {
        state: ExtractionState,
        reason: String,
    },
}

/// 状态机中途放弃
#[derive(Debug)]
struct Abort {
    state: ExtractionState,
    reason: String,
}

impl Abort {
    fn new(state: ExtractionState, reason: impl Into<String>) -> Self {
        Self {
            state,
            reason: reason.into(),
        }
    }
}

/// OCR 页面驱动
///
/// 页面是单一的有状态会话，同一时间只能驱动一个文档。
pub struct OcrDriver<'a> {
    page: &'a dyn PageController,
    selectors: &'a OcrSelectors,
    timeouts: &'a DriverTimeouts,
}

impl<'a> OcrDriver<'a> {
    pub fn new(
        page: &'a dyn PageController,
        selectors: &'a OcrSelectors,
        timeouts: &'a DriverTimeouts,
    ) -> Self {
        Self {
            page,
            selectors,
            timeouts,
        }
    }

    /// 驱动一个文档直到 RESET
    pub async fn process(&self, doc: &SourceDocument) -> DriveOutcome {
        let outcome = match self.drive(doc).await {
            Ok(archive) => {
                info!("[{}] 📦 已下载: {}", doc.file_name(), archive.display());
                match archive_merger::consolidate(
                    &archive,
                    &doc.output_dir(),
                    &doc.consolidated_path(),
                ) {
                    Ok(report) => DriveOutcome::Consolidated(report),
                    Err(e) => DriveOutcome::ArchiveFailed {
                        archive,
                        reason: e.to_string(),
                    },
                }
            }
            Err(abort) => {
                warn!(
                    "[{}] ⚠️ 在 {} 放弃: {}",
                    doc.file_name(),
                    abort.state,
                    abort.reason
                );
                DriveOutcome::Skipped {
                    state: abort.state,
                    reason: abort.reason,
                }
            }
        };

        debug!("[{}] → {}", doc.file_name(), ExtractionState::Reset);
        self.reset().await;
        outcome
    }

    /// LOADED → DOWNLOADED，返回下载到的压缩包路径
    async fn drive(&self, doc: &SourceDocument) -> Result<PathBuf, Abort> {
        let name = doc.file_name();
        let zip_dir = doc.zip_dir();
        fs::create_dir_all(&zip_dir).map_err(|e| {
            Abort::new(
                ExtractionState::Loaded,
                format!("无法创建下载目录 {}: {}", zip_dir.display(), e),
            )
        })?;

        // LOADED → UPLOADING
        debug!("[{}] → {}", name, ExtractionState::Uploading);
        self.page
            .upload_file(&self.selectors.file_input, doc.pdf_path())
            .await
            .map_err(|e| Abort::new(ExtractionState::Uploading, e.to_string()))?;
        info!("[{}] 📤 已提交上传: {}", name, doc.pdf_path().display());

        // UPLOADING → UPLOADED（超时不致命）
        match self
            .page
            .wait_for(
                &self.selectors.uploading_indicator,
                WaitCondition::Invisible,
                self.timeouts.upload,
            )
            .await
        {
            WaitOutcome::Ready => debug!("[{}] → {}", name, ExtractionState::Uploaded),
            WaitOutcome::TimedOut => warn!("[{}] 上传标记未在时限内消失，继续处理", name),
            WaitOutcome::Failed(reason) => warn!("[{}] 等待上传完成失败: {}，继续处理", name, reason),
        }
        sleep(self.timeouts.settle).await;

        // UPLOADED → PARSING → PARSED
        debug!("[{}] → {}", name, ExtractionState::Parsing);
        self.page
            .click(&self.selectors.parse_button)
            .await
            .map_err(|e| Abort::new(ExtractionState::Parsing, e.to_string()))?;
        debug!("[{}] → {}", name, ExtractionState::Parsed);

        // PARSED → TAB_SELECTED（失败不致命）
        self.select_results_tab(name).await;

        // TAB_SELECTED → DOWNLOADING
        let download_dir = absolute(&zip_dir);
        if let Err(e) = self.page.set_download_dir(&download_dir).await {
            warn!("[{}] 设置下载目录失败: {}", name, e);
        }
        let before = list_file_names(&zip_dir);

        match self
            .page
            .wait_for(
                &self.selectors.download_button,
                WaitCondition::Clickable,
                self.timeouts.download,
            )
            .await
        {
            WaitOutcome::Ready => {}
            WaitOutcome::TimedOut => {
                return Err(Abort::new(ExtractionState::TabSelected, "下载按钮未在时限内出现"))
            }
            WaitOutcome::Failed(reason) => {
                return Err(Abort::new(ExtractionState::TabSelected, reason))
            }
        }
        self.page
            .click(&self.selectors.download_button)
            .await
            .map_err(|e| Abort::new(ExtractionState::TabSelected, e.to_string()))?;
        debug!(
            "[{}] → {}，目标目录: {}",
            name,
            ExtractionState::Downloading,
            download_dir.display()
        );

        // DOWNLOADING → DOWNLOADED
        let file_name = wait_for_new_file(
            &zip_dir,
            &before,
            self.timeouts.download,
            self.timeouts.download_poll,
        )
        .await
        .ok_or_else(|| {
            Abort::new(
                ExtractionState::Downloading,
                format!("{} 秒内未检测到完成的下载", self.timeouts.download.as_secs()),
            )
        })?;
        debug!("[{}] → {}", name, ExtractionState::Downloaded);

        Ok(zip_dir.join(file_name))
    }

    async fn select_results_tab(&self, name: &str) {
        let outcome = self
            .page
            .wait_for(
                &self.selectors.results_tab,
                WaitCondition::Clickable,
                self.timeouts.results_tab,
            )
            .await;
        if !outcome.is_ready() {
            warn!("[{}] 结果标签页不可点击: {:?}", name, outcome);
            return;
        }
        match self.page.click(&self.selectors.results_tab).await {
            Ok(()) => debug!("[{}] → {}", name, ExtractionState::TabSelected),
            Err(e) => warn!("[{}] 点击结果标签页失败: {}", name, e),
        }
    }

    /// 清空页面并等待上传控件与拖放区域重新出现，返回页面是否就绪
    pub async fn reset(&self) -> bool {
        let cleared = self.clear().await;
        if let Err(reason) = &cleared {
            warn!("清空页面失败: {}", reason);
        }

        let drop_area = self
            .page
            .wait_for(
                &self.selectors.drop_area,
                WaitCondition::Visible,
                self.timeouts.drop_area,
            )
            .await;
        if !drop_area.is_ready() {
            warn!("拖放区域未重新出现: {:?}", drop_area);
        }

        cleared.is_ok() && drop_area.is_ready()
    }

    async fn clear(&self) -> Result<(), String> {
        let clear_button = self
            .page
            .wait_for(
                &self.selectors.clear_button,
                WaitCondition::Clickable,
                self.timeouts.reset,
            )
            .await;
        if !clear_button.is_ready() {
            return Err(format!("清空按钮不可点击: {:?}", clear_button));
        }
        self.page
            .click(&self.selectors.clear_button)
            .await
            .map_err(|e| e.to_string())?;

        let file_input = self
            .page
            .wait_for(
                &self.selectors.file_input,
                WaitCondition::Present,
                self.timeouts.reset,
            )
            .await;
        if !file_input.is_ready() {
            return Err(format!("上传控件未重新出现: {:?}", file_input));
        }
        sleep(self.timeouts.reset_settle).await;
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn list_file_names(dir: &Path) -> HashSet<String> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// 轮询目录直到出现一个不在 `before` 中、且不是下载中临时文件的新文件
///
/// 同时出现多个时取文件名排序后的第一个。
pub async fn wait_for_new_file(
    dir: &Path,
    before: &HashSet<String>,
    timeout: Duration,
    poll_interval: Duration,
) -> Option<String> {
    let deadline = Instant::now() + timeout;
    loop {
        sleep(poll_interval).await;

        let mut fresh: Vec<String> = list_file_names(dir)
            .into_iter()
            .filter(|name| !before.contains(name) && !name.ends_with(IN_PROGRESS_SUFFIX))
            .collect();
        if !fresh.is_empty() {
            fresh.sort();
            return fresh.into_iter().next();
        }

        if Instant::now() >= deadline {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// 模拟 OCR 页面：点击下载按钮时把预置的压缩包写进下载目录
    #[derive(Default)]
    struct FakePage {
        calls: Mutex<Vec<String>>,
        download_dir: Mutex<Option<PathBuf>>,
        archive: Option<(String, Vec<(String, String)>)>,
        waits: HashMap<String, WaitOutcome>,
        failing_clicks: Vec<String>,
    }

    impl FakePage {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl PageController for FakePage {
        async fn upload_file(&self, selector: &str, path: &Path) -> AppResult<()> {
            self.record(format!("upload {} {}", selector, path.display()));
            Ok(())
        }

        async fn click(&self, selector: &str) -> AppResult<()> {
            self.record(format!("click {}", selector));
            if self.failing_clicks.iter().any(|s| s == selector) {
                return Err(AppError::element_not_found(selector));
            }
            if selector == OcrSelectors::default().download_button {
                if let (Some(dir), Some((name, files))) =
                    (self.download_dir.lock().unwrap().clone(), &self.archive)
                {
                    let mut writer = ZipWriter::new(fs::File::create(dir.join(name)).unwrap());
                    for (entry, content) in files {
                        writer.start_file(entry.as_str(), SimpleFileOptions::default()).unwrap();
                        writer.write_all(content.as_bytes()).unwrap();
                    }
                    writer.finish().unwrap();
                }
            }
            Ok(())
        }

        async fn set_download_dir(&self, dir: &Path) -> AppResult<()> {
            self.record(format!("download_dir {}", dir.display()));
            *self.download_dir.lock().unwrap() = Some(dir.to_path_buf());
            Ok(())
        }

        async fn wait_for(
            &self,
            selector: &str,
            _condition: WaitCondition,
            _timeout: Duration,
        ) -> WaitOutcome {
            self.record(format!("wait {}", selector));
            self.waits
                .get(selector)
                .cloned()
                .unwrap_or(WaitOutcome::Ready)
        }
    }

    fn fast_timeouts() -> DriverTimeouts {
        DriverTimeouts {
            upload: Duration::from_millis(50),
            results_tab: Duration::from_millis(50),
            download: Duration::from_millis(200),
            download_poll: Duration::from_millis(10),
            reset: Duration::from_millis(50),
            drop_area: Duration::from_millis(50),
            settle: Duration::ZERO,
            reset_settle: Duration::ZERO,
        }
    }

    fn document(root: &Path) -> SourceDocument {
        let folder = root.join("1.Chuyen de");
        fs::create_dir_all(&folder).unwrap();
        let pdf = folder.join("De 01.pdf");
        fs::write(&pdf, b"%PDF").unwrap();
        SourceDocument::new("1.Chuyen de", "De 01.pdf", &folder, &pdf)
    }

    #[tokio::test]
    async fn test_successful_document_is_consolidated_and_reset() {
        let root = tempfile::tempdir().unwrap();
        let doc = document(root.path());
        let page = FakePage {
            archive: Some((
                "demo_x1.zip".to_string(),
                vec![
                    ("demo_x1_page_0.md".to_string(), "A".to_string()),
                    ("demo_x1_page_1.md".to_string(), "B".to_string()),
                ],
            )),
            // 上传标记超时不影响后续步骤
            waits: HashMap::from([("span.uploading".to_string(), WaitOutcome::TimedOut)]),
            ..Default::default()
        };
        let selectors = OcrSelectors::default();
        let timeouts = fast_timeouts();
        let driver = OcrDriver::new(&page, &selectors, &timeouts);

        let outcome = driver.process(&doc).await;

        match outcome {
            DriveOutcome::Consolidated(report) => assert_eq!(report.pages, vec![0, 1]),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fs::read_to_string(doc.consolidated_path()).unwrap(), "A\n\nB");

        let calls = page.calls();
        let position = |needle: &str| calls.iter().position(|c| c == needle).unwrap();
        assert!(position("click #parse_button") < position("click #component-38-button"));
        assert!(position("click #component-45") < position("click #component-13"));
        assert_eq!(calls.last().unwrap(), "wait div.wrap.svelte-12ioyct");
    }

    #[tokio::test]
    async fn test_results_tab_timeout_still_downloads() {
        let root = tempfile::tempdir().unwrap();
        let doc = document(root.path());
        let page = FakePage {
            archive: Some((
                "demo_x2.zip".to_string(),
                vec![("demo_x2_page_0.md".to_string(), "A".to_string())],
            )),
            waits: HashMap::from([(
                "#component-38-button".to_string(),
                WaitOutcome::TimedOut,
            )]),
            ..Default::default()
        };
        let selectors = OcrSelectors::default();
        let timeouts = fast_timeouts();
        let driver = OcrDriver::new(&page, &selectors, &timeouts);

        let outcome = driver.process(&doc).await;

        assert!(matches!(outcome, DriveOutcome::Consolidated(_)));
        assert_eq!(fs::read_to_string(doc.consolidated_path()).unwrap(), "A");
        let calls = page.calls();
        assert!(!calls.iter().any(|c| c == "click #component-38-button"));
        assert!(calls.iter().any(|c| c == "click #component-45"));
    }

    #[tokio::test]
    async fn test_download_timeout_skips_and_still_resets() {
        let root = tempfile::tempdir().unwrap();
        let doc = document(root.path());
        let page = FakePage::default();
        let selectors = OcrSelectors::default();
        let timeouts = fast_timeouts();
        let driver = OcrDriver::new(&page, &selectors, &timeouts);

        let outcome = driver.process(&doc).await;

        assert!(matches!(
            outcome,
            DriveOutcome::Skipped {
                state: ExtractionState::Downloading,
                ..
            }
        ));
        assert!(!doc.consolidated_path().exists());
        assert!(page.calls().contains(&"click #component-13".to_string()));
    }

    #[tokio::test]
    async fn test_parse_click_failure_aborts_document() {
        let root = tempfile::tempdir().unwrap();
        let doc = document(root.path());
        let page = FakePage {
            failing_clicks: vec!["#parse_button".to_string()],
            ..Default::default()
        };
        let selectors = OcrSelectors::default();
        let timeouts = fast_timeouts();
        let driver = OcrDriver::new(&page, &selectors, &timeouts);

        let outcome = driver.process(&doc).await;

        assert!(matches!(
            outcome,
            DriveOutcome::Skipped {
                state: ExtractionState::Parsing,
                ..
            }
        ));
        assert!(!page.calls().iter().any(|c| c == "click #component-45"));
    }

    #[tokio::test]
    async fn test_reset_reports_unready_surface() {
        let page = FakePage {
            waits: HashMap::from([("#component-13".to_string(), WaitOutcome::TimedOut)]),
            ..Default::default()
        };
        let selectors = OcrSelectors::default();
        let timeouts = fast_timeouts();
        let driver = OcrDriver::new(&page, &selectors, &timeouts);

        assert!(!driver.reset().await);
        // 清空失败后仍然等待拖放区域
        assert!(page
            .calls()
            .contains(&"wait div.wrap.svelte-12ioyct".to_string()));
    }

    #[tokio::test]
    async fn test_wait_for_new_file_ignores_partial_downloads() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.zip"), b"").unwrap();
        let before = list_file_names(dir.path());
        fs::write(dir.path().join("demo_a.zip.crdownload"), b"").unwrap();

        let none = wait_for_new_file(
            dir.path(),
            &before,
            Duration::from_millis(30),
            Duration::from_millis(10),
        )
        .await;
        assert!(none.is_none());

        fs::write(dir.path().join("demo_a.zip"), b"").unwrap();
        let found = wait_for_new_file(
            dir.path(),
            &before,
            Duration::from_millis(30),
            Duration::from_millis(10),
        )
        .await;
        assert_eq!(found.as_deref(), Some("demo_a.zip"));
    }
}
