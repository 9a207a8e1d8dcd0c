use crate::error::{AppResult, ConfigError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_LOADING_FOLDER: &str = r#"["1.Chuyen de", "2.De chac diem 8", "3.De chac diem 9", "4.De luyen them", "5.De quan trong", "6.De so"]"#;

/// OCR 驱动各个等待步骤的上限
#[derive(Clone, Debug, PartialEq)]
pub struct DriverTimeouts {
    /// 等待"上传中"标记消失
    pub upload: Duration,
    /// 等待结果标签页可点击
    pub results_tab: Duration,
    /// 等待下载完成
    pub download: Duration,
    /// 下载目录轮询间隔
    pub download_poll: Duration,
    /// 清空按钮及上传控件重新出现
    pub reset: Duration,
    /// 拖放区域重新出现
    pub drop_area: Duration,
    /// 上传结束到点击解析之间的停顿
    pub settle: Duration,
    /// 清空后等待页面稳定
    pub reset_settle: Duration,
}

impl Default for DriverTimeouts {
    fn default() -> Self {
        Self {
            upload: Duration::from_secs(1800),
            results_tab: Duration::from_secs(30),
            download: Duration::from_secs(1800),
            download_poll: Duration::from_millis(500),
            reset: Duration::from_secs(30),
            drop_area: Duration::from_secs(1800),
            settle: Duration::from_secs(2),
            reset_settle: Duration::from_secs(1),
        }
    }
}

/// 课程平台配置（仅发布阶段需要）
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasConfig {
    pub api_url: String,
    pub api_key: String,
    pub part_used: String,
    pub course_id: String,
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 数据根目录
    pub data_dir: PathBuf,
    /// 依次处理的子目录
    pub loading_folders: Vec<String>,
    // --- OCR 页面 ---
    pub ocr_target_url: String,
    /// 设置后连接已有浏览器，否则启动无头浏览器
    pub browser_debug_port: Option<u16>,
    pub chrome_executable: Option<PathBuf>,
    pub selectors_file: Option<PathBuf>,
    pub page_ready_timeout: Duration,
    pub driver_timeouts: DriverTimeouts,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub prompt_file: PathBuf,
    /// 已存在的生成文本是否重新生成
    pub overwrite_generated: bool,
    // --- 题目包 ---
    pub converter: String,
    // --- 发布 ---
    pub publish_enabled: bool,
    pub canvas: Option<CanvasConfig>,
    pub migration_poll_interval: Duration,
    pub migration_max_polls: u32,
    // --- 日志 ---
    pub verbose_logging: bool,
    pub output_log_file: String,
    pub warn_file: String,
}

impl Config {
    /// 从进程环境变量读取（调用前可先加载 `.env`）
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let loading_raw = env
            .get("LOADING_FOLDER")
            .unwrap_or_else(|| DEFAULT_LOADING_FOLDER.to_string());

        let driver_timeouts = DriverTimeouts {
            upload: env.secs("UPLOAD_TIMEOUT_SECS", 1800)?,
            results_tab: env.secs("TAB_TIMEOUT_SECS", 30)?,
            download: env.secs("DOWNLOAD_TIMEOUT_SECS", 1800)?,
            download_poll: Duration::from_millis(env.parse("DOWNLOAD_POLL_MILLIS", 500u64)?),
            reset: env.secs("RESET_TIMEOUT_SECS", 30)?,
            drop_area: env.secs("DROP_AREA_TIMEOUT_SECS", 1800)?,
            ..DriverTimeouts::default()
        };

        let publish_enabled = env.parse("ENABLE_PUBLISH", false)?;
        let canvas = canvas_config(&env, publish_enabled)?;

        Ok(Self {
            data_dir: PathBuf::from(env.get("DATA_DIR").unwrap_or_else(|| "MathTHPT2025".to_string())),
            loading_folders: parse_folder_list(&loading_raw),
            ocr_target_url: env
                .get("OCR_TARGET_URL")
                .unwrap_or_else(|| "https://dotsocr.xiaohongshu.com/".to_string()),
            browser_debug_port: env.parse_opt("BROWSER_DEBUG_PORT")?,
            chrome_executable: env.get("CHROME_EXECUTABLE").map(PathBuf::from),
            selectors_file: env.get("OCR_SELECTORS_FILE").map(PathBuf::from),
            page_ready_timeout: env.secs("PAGE_READY_TIMEOUT_SECS", 60)?,
            driver_timeouts,
            llm_api_key: env.required("OPENAI_API_KEY")?,
            llm_api_base_url: env.required("OPENAI_API_BASE")?,
            llm_model_name: env.required("OPENAI_MODEL_NAME")?,
            llm_temperature: env.parse("OPENAI_TEMPERATURE", 0.69f32)?,
            prompt_file: PathBuf::from(env.get("PROMPT_FILE").unwrap_or_else(|| "prompt.txt".to_string())),
            overwrite_generated: env.parse("OVERWRITE_GENERATED", false)?,
            converter: env.get("QTI_CONVERTER").unwrap_or_else(|| "text2qti".to_string()),
            publish_enabled,
            canvas,
            migration_poll_interval: env.secs("MIGRATION_POLL_SECS", 3)?,
            migration_max_polls: env.parse("MIGRATION_MAX_POLLS", 600u32)?,
            verbose_logging: env.parse("VERBOSE_LOGGING", false)?,
            output_log_file: env.get("OUTPUT_LOG_FILE").unwrap_or_else(|| "output.txt".to_string()),
            warn_file: env.get("WARN_FILE").unwrap_or_else(|| "warn.txt".to_string()),
        })
    }
}

/// 四个课程平台变量齐全时才构建；启用发布却不齐全时报错
fn canvas_config<F>(env: &Env<F>, publish_enabled: bool) -> AppResult<Option<CanvasConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    const KEYS: [&str; 4] = ["API_URL", "API_KEY", "PART_USED", "COURSE_ID"];

    let values: Vec<Option<String>> = KEYS.iter().map(|k| env.get(k)).collect();
    if let Some(missing) = KEYS.iter().zip(&values).find(|(_, v)| v.is_none()) {
        if publish_enabled {
            return Err(ConfigError::MissingPublicationSetting {
                var_name: missing.0.to_string(),
            }
            .into());
        }
        return Ok(None);
    }

    let mut values = values.into_iter().flatten();
    let mut next = || values.next().unwrap_or_default();
    Ok(Some(CanvasConfig {
        api_url: next().trim_end_matches('/').to_string(),
        api_key: next(),
        part_used: next(),
        course_id: next(),
    }))
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// 空字符串视为未设置
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> AppResult<String> {
        self.get(key).ok_or_else(|| {
            ConfigError::EnvVarNotFound {
                var_name: key.to_string(),
            }
            .into()
        })
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> AppResult<T> {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }

    fn parse_opt<T: FromStr>(&self, key: &str) -> AppResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                ConfigError::EnvVarParseFailed {
                    var_name: key.to_string(),
                    value: raw.clone(),
                    expected_type: std::any::type_name::<T>().to_string(),
                }
                .into()
            }),
        }
    }

    fn secs(&self, key: &str, default: u64) -> AppResult<Duration> {
        Ok(Duration::from_secs(self.parse(key, default)?))
    }
}

/// 解析子目录列表
///
/// 依次尝试 JSON 数组、Python 字面量列表、`,`/`;` 分隔的字符串，第一个成功的为准。
pub fn parse_folder_list(raw: &str) -> Vec<String> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
        return list;
    }
    if let Some(list) = parse_python_list(raw) {
        return list;
    }
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 只支持由单/双引号字符串组成的列表或元组，例如 `['a', "b"]`
fn parse_python_list(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')))?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let quote = match chars.next() {
            None => break,
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return None,
        };

        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => match chars.next()? {
                    'n' => item.push('\n'),
                    't' => item.push('\t'),
                    other => item.push(other),
                },
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const LLM: [(&str, &str); 3] = [
        ("OPENAI_API_KEY", "sk-test"),
        ("OPENAI_API_BASE", "http://localhost:8000/v1"),
        ("OPENAI_MODEL_NAME", "gpt-test"),
    ];

    #[test]
    fn test_folder_list_json() {
        assert_eq!(
            parse_folder_list(r#"["1.Chuyen de", "6.De so"]"#),
            vec!["1.Chuyen de", "6.De so"]
        );
    }

    #[test]
    fn test_folder_list_python_literal() {
        assert_eq!(
            parse_folder_list(r#"['1.Chuyen de', "it's", 'a\'b',]"#),
            vec!["1.Chuyen de", "it's", "a'b"]
        );
        assert_eq!(parse_folder_list("('x', 'y')"), vec!["x", "y"]);
    }

    #[test]
    fn test_folder_list_delimited() {
        assert_eq!(
            parse_folder_list(" A ; B,C ,, "),
            vec!["A", "B", "C"]
        );
        // 不完整的列表字面量退回到分隔符解析
        assert_eq!(parse_folder_list("['a', b]"), vec!["['a'", "b]"]);
    }

    #[test]
    fn test_defaults_with_required_llm_settings() {
        let config = Config::from_lookup(lookup(&LLM)).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("MathTHPT2025"));
        assert_eq!(config.loading_folders.len(), 6);
        assert_eq!(config.loading_folders[0], "1.Chuyen de");
        assert_eq!(config.converter, "text2qti");
        assert_eq!(config.driver_timeouts, DriverTimeouts::default());
        assert_eq!(config.migration_max_polls, 600);
        assert!(config.browser_debug_port.is_none());
        assert!(!config.publish_enabled);
        assert!(config.canvas.is_none());
    }

    #[test]
    fn test_missing_llm_setting_is_fatal() {
        let err = Config::from_lookup(lookup(&LLM[..2])).unwrap_err();
        assert!(err.is_environment());
        assert!(err.to_string().contains("OPENAI_MODEL_NAME"));
    }

    #[test]
    fn test_bad_number_is_fatal() {
        let mut pairs = LLM.to_vec();
        pairs.push(("DOWNLOAD_TIMEOUT_SECS", "soon"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("DOWNLOAD_TIMEOUT_SECS"));
    }

    #[test]
    fn test_publication_settings() {
        let mut pairs = LLM.to_vec();
        pairs.push(("ENABLE_PUBLISH", "true"));
        pairs.push(("API_URL", "https://lms.example/"));
        pairs.push(("API_KEY", "token"));
        pairs.push(("PART_USED", "P1"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("COURSE_ID"));

        pairs.push(("COURSE_ID", "42"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        let canvas = config.canvas.unwrap();
        assert_eq!(canvas.api_url, "https://lms.example");
        assert_eq!(canvas.course_id, "42");
    }
}
