use crate::error::{AppResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// OCR 页面上各控件的 CSS 选择器
///
/// 默认值对应当前的 OCR 站点；站点改版时可通过 TOML 文件覆盖部分字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSelectors {
    pub file_input: String,
    pub uploading_indicator: String,
    pub parse_button: String,
    pub results_tab: String,
    pub download_button: String,
    pub clear_button: String,
    pub drop_area: String,
}

impl Default for OcrSelectors {
    fn default() -> Self {
        Self {
            file_input: "input[type='file'][data-testid='file-upload']".to_string(),
            uploading_indicator: "span.uploading".to_string(),
            parse_button: "#parse_button".to_string(),
            results_tab: "#component-38-button".to_string(),
            download_button: "#component-45".to_string(),
            clear_button: "#component-13".to_string(),
            drop_area: "div.wrap.svelte-12ioyct".to_string(),
        }
    }
}

impl OcrSelectors {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 从 TOML 文件加载，未写出的字段保留默认值
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::AppError::file_read_failed(path, e))?;
        let selectors = Self::from_toml_str(&content).map_err(|e| ConfigError::SelectorsFileInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(selectors)
    }
}
