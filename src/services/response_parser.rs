//! 响应解析 - 业务能力层
//!
//! 把模型返回的自由文本解析成结构化记录。模型输出可能包在 ``` 代码块里，
//! 也可能前后带有说明文字，这里统一容错处理。

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::OnceLock;

use crate::error::ParseError;
use crate::models::{CompanyContext, ScoredKeyword};
use crate::utils::truncate_text;

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").ok())
        .as_ref()
}

fn label_regex() -> Option<&'static Regex> {
    static LABEL: OnceLock<Option<Regex>> = OnceLock::new();
    LABEL
        .get_or_init(|| Regex::new(r"^(?:json|JSON|response|Response)\s*:\s*").ok())
        .as_ref()
}

/// 取出待解码的文本：第一个代码块的内容，没有代码块则取全文
pub fn extract_payload(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = fence_regex()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    match label_regex().and_then(|re| re.find(inner)) {
        Some(label) => inner[label.end()..].trim(),
        None => inner,
    }
}

/// 解码 JSON；整体失败时再尝试最外层的 `{...}` 或 `[...]`
fn decode(text: &str) -> Result<JsonValue, ParseError> {
    let payload = extract_payload(text);

    let first_err = match serde_json::from_str::<JsonValue>(payload) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (payload.find(open), payload.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<JsonValue>(&payload[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    Err(ParseError::InvalidJson {
        reason: first_err.to_string(),
        preview: truncate_text(text.trim(), 120),
    })
}

/// 解析为 JSON 对象；非对象的值包装成 `{"output": value}`
pub fn parse_record(text: &str) -> Result<Map<String, JsonValue>, ParseError> {
    match decode(text)? {
        JsonValue::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert("output".to_string(), other);
            Ok(map)
        }
    }
}

/// 把分数截成整数并限制在 [10, 100]
pub fn clamp_score(score: f64) -> i64 {
    (score.trunc() as i64).clamp(10, 100)
}

fn text_field(
    record: &Map<String, JsonValue>,
    field: &'static str,
) -> Result<String, ParseError> {
    match record.get(field) {
        None | Some(JsonValue::Null) => Err(ParseError::MissingField(field)),
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
    }
}

/// 解析关键词评分记录
///
/// 必须包含 `Keyword`、`RelevanceScore`、`Rationale`；分数必须是数字
pub fn parse_scored_keyword(text: &str) -> Result<ScoredKeyword, ParseError> {
    let record = parse_record(text)?;

    let keyword = text_field(&record, "Keyword")?;
    let rationale = text_field(&record, "Rationale")?;
    let score = match record.get("RelevanceScore") {
        None | Some(JsonValue::Null) => return Err(ParseError::MissingField("RelevanceScore")),
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .map(|i| i.clamp(10, 100))
            .or_else(|| n.as_f64().map(clamp_score))
            .ok_or_else(|| ParseError::NonNumericScore(JsonValue::Number(n.clone())))?,
        Some(other) => return Err(ParseError::NonNumericScore(other.clone())),
    };

    Ok(ScoredKeyword {
        keyword,
        relevance_score: score,
        rationale,
    })
}

/// 解析公司调研结果，缺失的字段逐个用兜底值补齐
///
/// 四个字段一个都没有时视为解析失败
pub fn parse_company_context(
    text: &str,
    fallback: &CompanyContext,
) -> Result<CompanyContext, ParseError> {
    let record = parse_record(text)?;

    let pick = |field: &str| -> Option<String> {
        record
            .get(field)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let name = pick("company_name");
    let description = pick("company_description");
    let industry = pick("industry");
    let target_market = pick("target_market");

    if name.is_none() && description.is_none() && industry.is_none() && target_market.is_none() {
        return Err(ParseError::MissingField("company_name"));
    }

    Ok(CompanyContext {
        company_name: name.unwrap_or_else(|| fallback.company_name.clone()),
        company_description: description
            .unwrap_or_else(|| fallback.company_description.clone()),
        industry: industry.unwrap_or_else(|| fallback.industry.clone()),
        target_market: target_market.unwrap_or_else(|| fallback.target_market.clone()),
    })
}
