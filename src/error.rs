use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 题库后端错误
    #[error("后端错误: {0}")]
    Backend(#[from] BackendError),
    /// 批改数据错误
    #[error("批改错误: {0}")]
    Grading(#[from] GradingError),
    /// 持久化存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 答案格式无法识别
    #[error("答案格式错误: {0}")]
    AnswerFormat(#[from] AnswerFormatError),
    /// 同一个编排器上已有纠错在运行
    #[error("纠错正在进行中 (作业: {assignment_id})")]
    AlreadyRunning { assignment_id: String },
}

/// 题库后端错误
#[derive(Debug, Error)]
pub enum BackendError {
    /// 网络请求失败（超时、连接失败）
    #[error("请求失败 ({endpoint}): {message}")]
    RequestFailed { endpoint: String, message: String },
    /// 服务端 5xx
    #[error("服务端错误 ({endpoint}): HTTP {status}")]
    ServerError { endpoint: String, status: u16 },
    /// 非预期的响应
    #[error("响应异常 ({endpoint}): code={code:?}, message={message:?}")]
    BadResponse {
        endpoint: String,
        code: Option<i64>,
        message: Option<String>,
    },
    /// 配额耗尽或频率限制（终止性错误）
    #[error("配额已用尽 ({endpoint}): {message}")]
    QuotaExceeded { endpoint: String, message: String },
}

/// 批改数据错误
#[derive(Debug, Error)]
pub enum GradingError {
    /// 拉取批改结果失败
    #[error("拉取批改结果失败 (作业: {assignment_id}): {message}")]
    FetchFailed {
        assignment_id: String,
        message: String,
        transient: bool,
    },
    /// 批改数据格式异常
    #[error("批改数据格式异常: {0}")]
    MalformedPayload(String),
    /// 重试后仍拿不到批改结果
    #[error("批改结果不可用 (作业: {assignment_id})")]
    SnapshotUnavailable { assignment_id: String },
}

/// 持久化存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("读取失败 ({key}): {message}")]
    ReadFailed { key: String, message: String },
    #[error("写入失败 ({key}): {message}")]
    WriteFailed { key: String, message: String },
    #[error("数据损坏 ({key}): {message}")]
    Corrupted { key: String, message: String },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 配额耗尽（终止性错误）
    #[error("LLM配额已用尽 (模型: {model}): {message}")]
    QuotaExceeded { model: String, message: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 配置文件解析失败
    #[error("配置文件解析失败: {0}")]
    ParseFailed(String),
}

/// 答案格式错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerFormatError {
    #[error("答案为空")]
    Empty,
    #[error("无法识别的选项: '{0}'")]
    UnrecognizedOption(String),
    #[error("选项 {index} 超出范围 [0, {option_count})")]
    OptionOutOfRange { index: usize, option_count: usize },
    #[error("无法识别的判断题答案: '{0}'")]
    UnrecognizedBoolean(String),
}

impl AppError {
    /// 是否为配额耗尽（需要中止整个会话）
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(
            self,
            AppError::Backend(BackendError::QuotaExceeded { .. })
                | AppError::Llm(LlmError::QuotaExceeded { .. })
        )
    }

    /// 是否为可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Backend(BackendError::RequestFailed { .. })
            | AppError::Backend(BackendError::ServerError { .. }) => true,
            AppError::Grading(GradingError::FetchFailed { transient, .. }) => *transient,
            AppError::Llm(LlmError::ApiCallFailed { .. }) => true,
            _ => false,
        }
    }
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Grading(GradingError::MalformedPayload(err.to_string()))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(ConfigError::ParseFailed(err.to_string()))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(StorageError::ReadFailed {
            key: String::new(),
            message: err.to_string(),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        match err.status() {
            Some(status) if status.as_u16() == 429 => {
                AppError::Backend(BackendError::QuotaExceeded {
                    endpoint,
                    message: err.to_string(),
                })
            }
            Some(status) if status.is_server_error() => {
                AppError::Backend(BackendError::ServerError {
                    endpoint,
                    status: status.as_u16(),
                })
            }
            Some(status) => AppError::Backend(BackendError::BadResponse {
                endpoint,
                code: Some(status.as_u16() as i64),
                message: Some(err.to_string()),
            }),
            None => AppError::Backend(BackendError::RequestFailed {
                endpoint,
                message: err.to_string(),
            }),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
