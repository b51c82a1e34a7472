//! 集成测试公共工具：按提示词内容应答的桩后端

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use loop_over_rows::error::BackendError;
use loop_over_rows::{Config, ModelBackend, Pipeline};

type Responder = dyn Fn(&str) -> Result<String, BackendError> + Send + Sync;

/// 桩后端：记录每次收到的提示词，由闭包决定返回内容
pub struct StubBackend {
    respond: Box<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl StubBackend {
    pub fn new(respond: impl Fn(&str) -> Result<String, BackendError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// 对任何提示词都返回同一段文本
    pub fn fixed(text: &str) -> Arc<Self> {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for StubBackend {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.respond)(prompt)
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

/// 测试配置：重试等待缩短到 1ms
pub fn test_config() -> Config {
    Config {
        retry_base_delay_ms: 1,
        ..Config::default()
    }
}

pub fn pipeline(backend: Arc<StubBackend>) -> Pipeline {
    Pipeline::in_memory(test_config(), backend)
}

/// 从评分提示词中取出关键词
pub fn keyword_in(prompt: &str) -> Option<&str> {
    let start = prompt.find("Keyword: \"")? + "Keyword: \"".len();
    let end = prompt[start..].find('"')? + start;
    Some(&prompt[start..end])
}

/// 公司调研提示词的特征
pub fn is_research(prompt: &str) -> bool {
    prompt.contains("Analysiere die Webseite")
}

pub fn scored(keyword: &str, score: i64) -> String {
    format!(
        "```json\n{{\"Keyword\": \"{}\", \"RelevanceScore\": {}, \"Rationale\": \"passt\"}}\n```",
        keyword, score
    )
}

pub const ACME_CONTEXT: &str = r#"{"company_name": "Acme GmbH", "company_description": "Werkzeuge für Profis", "industry": "Werkzeugbau", "target_market": "Handwerk"}"#;
