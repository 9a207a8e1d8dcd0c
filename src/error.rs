//! 错误类型
//!
//! 按来源分组：浏览器、远程 API、文件、LLM、外部转换器、配置。
//! 单个文档的失败只在所属阶段内处理；只有 `Converter::NotInstalled`
//! 和 `Config` 这类环境错误允许中止整个阶段或整个运行。

use std::path::PathBuf;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 外部转换器错误
    #[error("转换器错误: {0}")]
    Converter(#[from] ConverterError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

impl AppError {
    /// 是否属于环境错误（部署问题而非数据问题）
    pub fn is_environment(&self) -> bool {
        matches!(
            self,
            AppError::Config(_) | AppError::Converter(ConverterError::NotInstalled { .. })
        )
    }
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: BoxError,
    },
    #[error("启动无头浏览器失败: {source}")]
    LaunchFailed {
        #[source]
        source: BoxError,
    },
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("页面元素不存在: {selector}")]
    ElementNotFound { selector: String },
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        #[source]
        source: BoxError,
    },
    #[error("CDP 命令 {command} 失败: {reason}")]
    CommandFailed { command: String, reason: String },
    #[error("页面未就绪: {reason}")]
    PageNotReady { reason: String },
}

/// 远程 API 错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error("API返回错误响应 ({endpoint}): HTTP {status}, body={body}")]
    BadResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("API返回内容缺少字段 {field} ({endpoint})")]
    MissingField { endpoint: String, field: String },
    #[error("JSON解析失败: {source}")]
    JsonParseFailed {
        #[source]
        source: BoxError,
    },
    #[error("迁移任务失败: {progress_url}")]
    MigrationFailed { progress_url: String },
    #[error("迁移任务在 {polls} 次轮询后仍未完成: {progress_url}")]
    MigrationTimedOut { progress_url: String, polls: u32 },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    #[error("文件不存在: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("读取文件失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("写入文件失败 ({}): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解压失败 ({}): {source}", path.display())]
    ArchiveFailed {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: BoxError,
    },
    #[error("构建 LLM 请求失败: {source}")]
    RequestBuildFailed {
        #[source]
        source: BoxError,
    },
}

/// 外部转换器错误
#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("找不到转换器命令 `{program}`，请确认已安装并位于 PATH 中")]
    NotInstalled { program: String },
    #[error("运行转换器 `{program}` 失败: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
    #[error("已启用发布，但缺少环境变量 {var_name}")]
    MissingPublicationSetting { var_name: String },
    #[error("选择器文件 {} 无效: {reason}", path.display())]
    SelectorsFileInvalid { path: PathBuf, reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed {
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err.url().map(|u| u.to_string()).unwrap_or_default();
        AppError::Api(ApiError::RequestFailed {
            endpoint,
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: PathBuf::new(),
            source: err,
        })
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        AppError::File(FileError::ArchiveFailed {
            path: PathBuf::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    pub fn navigation_failed(
        url: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.to_string(),
            source: Box::new(source),
        })
    }

    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }

    pub fn element_not_found(selector: impl Into<String>) -> Self {
        AppError::Browser(BrowserError::ElementNotFound {
            selector: selector.into(),
        })
    }

    pub fn api_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    pub fn file_read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    pub fn file_write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    pub fn archive_failed(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ArchiveFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
