use crate::error::{AppResult, ConfigError};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// 模型后端类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI 兼容的 chat completions 接口
    OpenAi,
    /// Gemini 原生 generateContent 接口
    Gemini,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAi),
            "gemini" => Ok(BackendKind::Gemini),
            other => Err(format!("未知后端: {}", other)),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 服务配置 ---
    pub server_host: String,
    pub server_port: u16,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub backend: BackendKind,
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// Gemini 原生接口地址（backend = gemini 时使用）
    pub gemini_api_base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 单次调用超时（秒）
    pub request_timeout_secs: u64,
    // --- 重试配置 ---
    pub max_attempts: usize,
    pub retry_base_delay_ms: u64,
    // --- freestyle 模式 ---
    /// 每个时间窗口允许的请求数
    pub freestyle_rate_limit: usize,
    pub freestyle_rate_period_ms: u64,
    /// 每批并发处理的行数
    pub freestyle_batch_width: usize,
    // --- contextual-scoring 模式 ---
    pub scoring_rate_limit: usize,
    pub scoring_rate_period_ms: u64,
    pub scoring_batch_width: usize,
    pub score_threshold: i64,
    pub relaxed_score_threshold: i64,
    /// 注册表最多保留的已结束任务数，0 表示不限
    pub max_retained_jobs: usize,
    // --- 测试模式 ---
    pub test_batch_width: usize,
    pub test_item_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            verbose_logging: false,
            backend: BackendKind::OpenAi,
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-2.5-flash".to_string(),
            gemini_api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.3,
            max_tokens: 2048,
            request_timeout_secs: 120,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            freestyle_rate_limit: 100,
            freestyle_rate_period_ms: 1000,
            freestyle_batch_width: 100,
            scoring_rate_limit: 8,
            scoring_rate_period_ms: 1000,
            scoring_batch_width: 5,
            score_threshold: 80,
            relaxed_score_threshold: 50,
            max_retained_jobs: 1000,
            test_batch_width: 10,
            test_item_limit: 3,
        }
    }
}

impl Config {
    /// 只从环境变量加载（以默认值为基础）
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 先读取可选的 TOML 配置文件，再用环境变量覆盖
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str::<Config>(&content).map_err(|source| {
                    ConfigError::TomlParseFailed {
                        path: path.display().to_string(),
                        source,
                    }
                })?
            }
            _ => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(self) -> AppResult<Self> {
        let d = self;
        // GEMINI_API_KEY 作为 LLM_API_KEY 的备选
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .unwrap_or(d.llm_api_key);

        Ok(Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or(d.server_host),
            server_port: env_or("SERVER_PORT", d.server_port, "u16")?,
            verbose_logging: env_or("VERBOSE_LOGGING", d.verbose_logging, "bool")?,
            backend: env_or("LLM_BACKEND", d.backend, "openai|gemini")?,
            llm_api_key: api_key,
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(d.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(d.llm_model_name),
            gemini_api_base_url: std::env::var("GEMINI_API_BASE_URL")
                .unwrap_or(d.gemini_api_base_url),
            temperature: env_or("LLM_TEMPERATURE", d.temperature, "f32")?,
            max_tokens: env_or("LLM_MAX_TOKENS", d.max_tokens, "u32")?,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", d.request_timeout_secs, "u64")?,
            max_attempts: env_or("MAX_ATTEMPTS", d.max_attempts, "usize")?,
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", d.retry_base_delay_ms, "u64")?,
            freestyle_rate_limit: env_or("FREESTYLE_RATE_LIMIT", d.freestyle_rate_limit, "usize")?,
            freestyle_rate_period_ms: env_or(
                "FREESTYLE_RATE_PERIOD_MS",
                d.freestyle_rate_period_ms,
                "u64",
            )?,
            freestyle_batch_width: env_or("FREESTYLE_BATCH_WIDTH", d.freestyle_batch_width, "usize")?,
            scoring_rate_limit: env_or("SCORING_RATE_LIMIT", d.scoring_rate_limit, "usize")?,
            scoring_rate_period_ms: env_or(
                "SCORING_RATE_PERIOD_MS",
                d.scoring_rate_period_ms,
                "u64",
            )?,
            scoring_batch_width: env_or("SCORING_BATCH_WIDTH", d.scoring_batch_width, "usize")?,
            score_threshold: env_or("SCORE_THRESHOLD", d.score_threshold, "i64")?,
            relaxed_score_threshold: env_or(
                "RELAXED_SCORE_THRESHOLD",
                d.relaxed_score_threshold,
                "i64",
            )?,
            max_retained_jobs: env_or("MAX_RETAINED_JOBS", d.max_retained_jobs, "usize")?,
            test_batch_width: env_or("TEST_BATCH_WIDTH", d.test_batch_width, "usize")?,
            test_item_limit: env_or("TEST_ITEM_LIMIT", d.test_item_limit, "usize")?,
        })
    }

    /// 校验配置值
    pub fn validate(&self) -> AppResult<()> {
        let positive = [
            ("max_attempts", self.max_attempts),
            ("freestyle_rate_limit", self.freestyle_rate_limit),
            ("freestyle_batch_width", self.freestyle_batch_width),
            ("scoring_rate_limit", self.scoring_rate_limit),
            ("scoring_batch_width", self.scoring_batch_width),
            ("test_batch_width", self.test_batch_width),
            ("test_item_limit", self.test_item_limit),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "必须大于 0".to_string(),
                }
                .into());
            }
        }
        if self.relaxed_score_threshold > self.score_threshold {
            return Err(ConfigError::InvalidValue {
                field: "relaxed_score_threshold",
                reason: format!("不能高于 score_threshold ({})", self.score_threshold),
            }
            .into());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// 读取环境变量并解析；变量不存在时返回默认值
fn env_or<T: FromStr>(var_name: &str, default: T, expected_type: &'static str) -> AppResult<T> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse().map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type,
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.score_threshold, 80);
        assert_eq!(config.relaxed_score_threshold, 50);
    }

    #[test]
    fn test_toml_partial_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            backend = "gemini"
            scoring_batch_width = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Gemini);
        assert_eq!(config.scoring_batch_width, 7);
        assert_eq!(config.freestyle_rate_limit, 100);
    }

    #[test]
    fn test_zero_width_rejected() {
        let config = Config {
            scoring_batch_width: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("OpenAI".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert_eq!(" gemini ".parse::<BackendKind>().unwrap(), BackendKind::Gemini);
        assert!("claude".parse::<BackendKind>().is_err());
    }
}
