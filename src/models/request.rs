//! 任务提交请求
//!
//! 请求体按 `mode` 字段区分两种形态：先显式检查模式标签，再按对应结构解码

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::error::ValidationError;

/// 流水线模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobMode {
    /// 单阶段：每行一次模型调用
    Freestyle,
    /// 两阶段：公司调研 + 关键词评分
    ContextualScoring,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Freestyle => "freestyle",
            JobMode::ContextualScoring => "contextual-scoring",
        }
    }

    /// 解析模式标签；`keyword-kombat` 是 `contextual-scoring` 的旧名
    pub fn parse(tag: &str) -> Result<Self, ValidationError> {
        match tag.trim() {
            "" | "freestyle" => Ok(JobMode::Freestyle),
            "contextual-scoring" | "keyword-kombat" => Ok(JobMode::ContextualScoring),
            other => Err(ValidationError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// freestyle 请求：对每一行执行调用方的指令
#[derive(Debug, Clone, Deserialize)]
pub struct FreestyleRequest {
    /// 行 key → 列值（保持提交顺序）
    pub data: Map<String, JsonValue>,
    /// 列名，与每行的列值按位置对应
    pub headers: Vec<String>,
    pub prompt: String,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub enable_google_search: bool,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl FreestyleRequest {
    /// 按提交顺序展开成 (行 key, 行对象)
    pub fn rows(&self) -> Vec<(String, JsonValue)> {
        self.data
            .iter()
            .map(|(key, values)| {
                let values: &[JsonValue] = match values {
                    JsonValue::Array(values) => values,
                    single => std::slice::from_ref(single),
                };
                let row: Map<String, JsonValue> = self
                    .headers
                    .iter()
                    .cloned()
                    .zip(values.iter().cloned())
                    .collect();
                (key.clone(), JsonValue::Object(row))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.data.is_empty() {
            return Err(ValidationError::EmptyItems { mode: "freestyle" });
        }
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::MissingField("prompt"));
        }
        Ok(())
    }
}

fn default_keyword_variable() -> String {
    "keyword".to_string()
}

/// contextual-scoring 请求：调研公司后为每个关键词打分
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringRequest {
    pub keywords: Vec<String>,
    pub company_url: String,
    /// 自定义模板中关键词占位符的名字
    #[serde(default = "default_keyword_variable")]
    pub keyword_variable: String,
    /// 可选的自定义评分模板
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub enable_google_search: bool,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl ScoringRequest {
    /// 去掉空白关键词后的列表
    pub fn keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|kw| kw.trim())
            .filter(|kw| !kw.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.keywords().is_empty() {
            return Err(ValidationError::EmptyItems {
                mode: "contextual-scoring",
            });
        }
        if !(self.company_url.starts_with("http://") || self.company_url.starts_with("https://")) {
            return Err(ValidationError::InvalidUrl(self.company_url.clone()));
        }
        Ok(())
    }
}

/// 任务提交请求
#[derive(Debug, Clone)]
pub enum ProcessRequest {
    Freestyle(FreestyleRequest),
    ContextualScoring(ScoringRequest),
}

impl ProcessRequest {
    /// 从原始请求体解码并校验
    pub fn from_value(body: JsonValue) -> Result<Self, ValidationError> {
        let mode = Self::mode_of(&body)?;
        let request = match mode {
            JobMode::Freestyle => ProcessRequest::Freestyle(
                serde_json::from_value(body)
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?,
            ),
            JobMode::ContextualScoring => ProcessRequest::ContextualScoring(
                serde_json::from_value(body)
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?,
            ),
        };
        request.validate()?;
        Ok(request)
    }

    /// 读取模式标签（缺省为 freestyle）
    pub fn mode_of(body: &JsonValue) -> Result<JobMode, ValidationError> {
        let object = body
            .as_object()
            .ok_or_else(|| ValidationError::Malformed("请求体必须是 JSON 对象".to_string()))?;
        match object.get("mode") {
            None | Some(JsonValue::Null) => Ok(JobMode::Freestyle),
            Some(JsonValue::String(tag)) => JobMode::parse(tag),
            Some(other) => Err(ValidationError::Malformed(format!(
                "mode 必须是字符串: {}",
                other
            ))),
        }
    }

    /// 读取调用方指定的任务 ID（即使请求体其余部分不合法）
    pub fn request_id_of(body: &JsonValue) -> Option<String> {
        body.get("request_id")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    pub fn mode(&self) -> JobMode {
        match self {
            ProcessRequest::Freestyle(_) => JobMode::Freestyle,
            ProcessRequest::ContextualScoring(_) => JobMode::ContextualScoring,
        }
    }

    pub fn test_mode(&self) -> bool {
        match self {
            ProcessRequest::Freestyle(req) => req.test_mode,
            ProcessRequest::ContextualScoring(req) => req.test_mode,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ProcessRequest::Freestyle(req) => req.validate(),
            ProcessRequest::ContextualScoring(req) => req.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_mode_defaults_to_freestyle() {
        let body = json!({
            "data": {"r1": ["Acme", "Berlin"]},
            "headers": ["name", "city"],
            "prompt": "classify"
        });
        let request = ProcessRequest::from_value(body).unwrap();
        assert_eq!(request.mode(), JobMode::Freestyle);
    }

    #[test]
    fn test_keyword_kombat_alias() {
        let body = json!({
            "mode": "keyword-kombat",
            "keywords": ["a"],
            "company_url": "https://example.de"
        });
        let request = ProcessRequest::from_value(body).unwrap();
        assert_eq!(request.mode(), JobMode::ContextualScoring);
        match request {
            ProcessRequest::ContextualScoring(req) => assert_eq!(req.keyword_variable, "keyword"),
            _ => panic!("应为评分请求"),
        }
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = ProcessRequest::from_value(json!({"mode": "crawl"})).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownMode(m) if m == "crawl"));
    }

    #[test]
    fn test_non_object_body_rejected() {
        let err = ProcessRequest::from_value(json!(["a"])).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_empty_data_rejected() {
        let body = json!({"data": {}, "headers": [], "prompt": "x"});
        let err = ProcessRequest::from_value(body).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyItems { mode: "freestyle" }));
    }

    #[test]
    fn test_blank_prompt_rejected() {
        let body = json!({"data": {"r1": [1]}, "headers": ["a"], "prompt": "  "});
        let err = ProcessRequest::from_value(body).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField("prompt")));
    }

    #[test]
    fn test_blank_keywords_and_bad_url_rejected() {
        let body = json!({"mode": "contextual-scoring", "keywords": [" ", ""], "company_url": "https://a.de"});
        assert!(matches!(
            ProcessRequest::from_value(body).unwrap_err(),
            ValidationError::EmptyItems { .. }
        ));

        let body = json!({"mode": "contextual-scoring", "keywords": ["a"], "company_url": "a.de"});
        assert!(matches!(
            ProcessRequest::from_value(body).unwrap_err(),
            ValidationError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_rows_preserve_order_and_zip_headers() {
        let body = json!({
            "data": {"z": ["1", "2", "extra"], "a": ["3", "4"], "m": "solo"},
            "headers": ["c1", "c2"],
            "prompt": "p"
        });
        let request: FreestyleRequest = serde_json::from_value(body).unwrap();
        let rows = request.rows();
        let keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(rows[0].1, json!({"c1": "1", "c2": "2"}));
        assert_eq!(rows[2].1, json!({"c1": "solo"}));
    }

    #[test]
    fn test_request_id_of() {
        assert_eq!(
            ProcessRequest::request_id_of(&json!({"request_id": " job-1 "})),
            Some("job-1".to_string())
        );
        assert_eq!(ProcessRequest::request_id_of(&json!({"request_id": ""})), None);
        assert_eq!(ProcessRequest::request_id_of(&json!({"request_id": 5})), None);
    }
}
