//! 模型后端 - 基础设施层
//!
//! 只暴露"给一段文本，返回一段文本"的能力，不做重试、不做解析
//!
//! ## 技术栈
//! - `OpenAiBackend`: 使用 `async-openai` crate，兼容 OpenAI API 的服务（Gemini、Azure 等）
//! - `GeminiBackend`: 使用 `reqwest` 直接调用 Gemini `generateContent` 接口

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{BackendKind, Config};
use crate::error::BackendError;

/// 模型调用边界
///
/// 实现方只负责一次调用；重试、节流、解析都在上层完成
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// 发送一段提示词，返回模型的原始文本输出
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;

    /// 模型名称（用于日志）
    fn model_name(&self) -> &str;
}

/// 根据配置创建模型后端
pub fn build_backend(config: &Config) -> Result<Arc<dyn ModelBackend>, BackendError> {
    match config.backend {
        BackendKind::OpenAi => Ok(Arc::new(OpenAiBackend::new(config))),
        BackendKind::Gemini => Ok(Arc::new(GeminiBackend::new(config)?)),
    }
}

// ========== OpenAI 兼容接口 ==========

/// OpenAI 兼容的 chat completions 后端
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiBackend {
    /// 创建新的后端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.request_timeout(),
        }
    }

    async fn chat(&self, prompt: &str) -> Result<String, BackendError> {
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| rejected(None, e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| rejected(None, e))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| BackendError::EmptyResponse {
                model: self.model_name.clone(),
            })
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        debug!("调用 LLM API，模型: {}, 提示词长度: {} 字符", self.model_name, prompt.len());

        match tokio::time::timeout(self.timeout, self.chat(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn classify_openai_error(err: OpenAIError) -> BackendError {
    let classified = match err {
        OpenAIError::Reqwest(e) => BackendError::Connection(e.without_url().to_string()),
        OpenAIError::ApiError(api) => rejected(api_error_status(&api), api.message),
        other => rejected(None, other),
    };
    warn!("LLM API 调用失败: {}", classified);
    classified
}

/// 从 API 错误体推断 HTTP 状态码（`code` 优先，其次 `type`）
fn api_error_status(err: &ApiError) -> Option<u16> {
    let from_code = err.code.as_deref().and_then(|code| {
        code.trim()
            .parse::<u16>()
            .ok()
            .filter(|status| (100..600).contains(status))
            .or_else(|| status_of_label(code))
    });
    from_code.or_else(|| err.r#type.as_deref().and_then(status_of_label))
}

fn status_of_label(label: &str) -> Option<u16> {
    match label.trim() {
        "server_error" | "internal_error" | "api_error" => Some(500),
        "overloaded_error" | "service_unavailable" => Some(503),
        "rate_limit_exceeded" | "rate_limit_error" | "insufficient_quota" => Some(429),
        _ => None,
    }
}

fn rejected(status: Option<u16>, err: impl std::fmt::Display) -> BackendError {
    BackendError::Rejected {
        status,
        message: err.to_string(),
    }
}

// ========== Gemini 原生接口 ==========

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// 拼接第一个候选的全部文本片段
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Gemini `generateContent` 后端
pub struct GeminiBackend {
    http: reqwest::Client,
    api_base_url: String,
    api_key: String,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl GeminiBackend {
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        Ok(Self {
            http,
            api_base_url: config.gemini_api_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model_name: config.llm_model_name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.request_timeout(),
        })
    }

    fn endpoint(&self) -> String {
        let model = self.model_name.trim_start_matches("models/");
        format!("{}/models/{}:generateContent", self.api_base_url, model)
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        let err = err.without_url();
        warn!("Gemini API 调用失败: {}", err);
        if err.is_timeout() {
            BackendError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }
        } else if let Some(status) = err.status() {
            rejected(Some(status.as_u16()), err)
        } else if err.is_decode() {
            rejected(None, err)
        } else {
            BackendError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        debug!("调用 Gemini API，模型: {}, 提示词长度: {} 字符", self.model_name, prompt.len());

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(rejected(Some(status.as_u16()), message));
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| self.classify(e))?;

        parsed.text().ok_or_else(|| BackendError::EmptyResponse {
            model: self.model_name.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
