use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求校验错误（派发前发现）
    #[error("请求校验失败: {0}")]
    Validation(#[from] ValidationError),
    /// 模型后端错误
    #[error("模型后端错误: {0}")]
    Backend(#[from] BackendError),
    /// 模型响应解析错误
    #[error("响应解析失败: {0}")]
    Parse(#[from] ParseError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 任务执行错误（任务 panic 或被中止）
    #[error("任务执行失败: {0}")]
    Task(String),
    /// IO 错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 请求校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    /// 请求体不是合法的 JSON 对象或字段类型不符
    #[error("请求格式错误: {0}")]
    Malformed(String),
    /// 未知的模式标签
    #[error("未知模式: {0}")]
    UnknownMode(String),
    /// 条目列表为空
    #[error("{mode} 模式至少需要一个条目")]
    EmptyItems { mode: &'static str },
    /// 必填字段缺失或为空
    #[error("缺少必填字段: {0}")]
    MissingField(&'static str),
    /// URL 格式不合法
    #[error("URL 必须以 http:// 或 https:// 开头: {0}")]
    InvalidUrl(String),
    /// 同名任务仍在运行
    #[error("任务 {0} 仍在运行中")]
    DuplicateJob(String),
}

/// 模型后端错误
#[derive(Debug, Error)]
pub enum BackendError {
    /// 调用超时
    #[error("调用超时 ({after_ms}ms)")]
    Timeout { after_ms: u64 },
    /// 网络连接失败
    #[error("连接失败: {0}")]
    Connection(String),
    /// 返回内容为空
    #[error("模型返回内容为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 请求被后端拒绝（鉴权失败、参数错误等）
    #[error("请求被拒绝: status={status:?}, message={message}")]
    Rejected { status: Option<u16>, message: String },
}

impl BackendError {
    /// 是否为可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout { .. }
            | BackendError::Connection(_)
            | BackendError::EmptyResponse { .. } => true,
            // 429 / 5xx 同样视为瞬时错误
            BackendError::Rejected { status, .. } => {
                matches!(status, Some(429) | Some(500..=599))
            }
        }
    }
}

/// 模型响应解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// 无法解码为 JSON
    #[error("无法解码为 JSON: {reason} (响应: {preview})")]
    InvalidJson { reason: String, preview: String },
    /// 缺少必填字段
    #[error("缺少必填字段: {0}")]
    MissingField(&'static str),
    /// 分数不是数字
    #[error("分数不是数字: {0}")]
    NonNumericScore(serde_json::Value),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建请求格式错误
    pub fn malformed(source: impl std::fmt::Display) -> Self {
        AppError::Validation(ValidationError::Malformed(source.to_string()))
    }

    /// 是否为校验错误（用于 HTTP 状态码映射）
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Task(err.to_string())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
