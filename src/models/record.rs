//! 条目与输出记录

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::utils::truncate_text;

/// 一个待处理的条目（一行数据或一个关键词）
///
/// 派发时创建，结果汇总后即丢弃
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// 条目标识（行 key 或关键词文本）
    pub key: String,
    /// 输入数据（行的列值对象，或关键词字符串）
    pub payload: JsonValue,
    /// 渲染好的提示词
    pub prompt: String,
}

impl WorkItem {
    pub fn new(key: impl Into<String>, payload: JsonValue, prompt: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload,
            prompt: prompt.into(),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&truncate_text(&self.key, 40))
    }
}

/// freestyle 模式的输出记录
///
/// 字段由调用方的提示词决定，序列化时总是带上 `row_key`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    #[serde(rename = "row_key")]
    pub key: String,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl OutputRecord {
    /// 用条目 key 标记一条解析结果（模型输出中的同名字段会被覆盖）
    pub fn tagged(key: impl Into<String>, mut fields: Map<String, JsonValue>) -> Self {
        fields.remove("row_key");
        Self {
            key: key.into(),
            fields,
        }
    }

    /// 转成 JSON 对象，`row_key` 在最前
    pub fn into_value(self) -> JsonValue {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert("row_key".to_string(), JsonValue::String(self.key));
        object.extend(self.fields);
        JsonValue::Object(object)
    }
}

/// contextual-scoring 模式的输出记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredKeyword {
    #[serde(rename = "Keyword")]
    pub keyword: String,
    /// 10 – 100 之间的整数
    #[serde(rename = "RelevanceScore")]
    pub relevance_score: i64,
    #[serde(rename = "Rationale")]
    pub rationale: String,
}

/// 公司调研结果
///
/// 每个评分任务只生成一次，之后所有评分调用只读共享
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyContext {
    pub company_name: String,
    pub company_description: String,
    pub industry: String,
    pub target_market: String,
}

impl CompanyContext {
    /// 调研失败时的兜底上下文，只依赖目标 URL
    pub fn fallback_for(company_url: &str) -> Self {
        Self {
            company_name: host_of(company_url).to_string(),
            company_description: format!("Unternehmen unter {}", company_url),
            industry: "Unbekannt".to_string(),
            target_market: "B2B/B2C".to_string(),
        }
    }
}

/// 去掉协议头，取第一个 `/` 之前的部分
pub fn host_of(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}
