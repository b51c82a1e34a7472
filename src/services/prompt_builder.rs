//! 提示词构建 - 业务能力层
//!
//! 只负责把模板和数据拼成提示词，不调用模型

use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

use crate::models::CompanyContext;

const SEARCH_HINT: &str =
    "\nIf helpful and allowed, enrich using public web search; still return strict JSON only.";

/// freestyle 模式：单行提示词
pub fn freestyle_prompt(row: &JsonValue, instruction: &str, enable_search: bool) -> String {
    let hint = if enable_search { SEARCH_HINT } else { "" };
    format!(
        "Row: {}\n\nInstructions: {}{}\n\nReturn strict JSON only.",
        row, instruction, hint
    )
}

/// contextual-scoring 第一阶段：公司调研提示词
pub fn company_research_prompt(company_url: &str, enable_search: bool) -> String {
    let prompt = format!(
        r#"
Analysiere die Webseite {url} und erstelle eine prägnante Unternehmensbeschreibung auf Deutsch.

Gib mir folgende Informationen in diesem exakten JSON-Format zurück:

{{
  "company_name": "<Firmenname>",
  "company_description": "<Detaillierte Beschreibung der Produkte, Dienstleistungen, Zielgruppe und Branche in 2-3 Sätzen>",
  "industry": "<Hauptbranche>",
  "target_market": "<Zielgruppe/Markt>"
}}

Wichtig: Antworte NUR mit dem JSON-Objekt, ohne zusätzlichen Text.
"#,
        url = company_url
    );

    if enable_search {
        format!(
            "Recherchiere online Informationen über die Firma unter {}. {}",
            company_url, prompt
        )
    } else {
        prompt
    }
}

/// 默认的关键词评分模板（德语 SEO 评分细则）
///
/// 占位符: `{{ keyword }}`、`{{ company_name }}`、`{{ company_description }}`、
/// `{{ industry }}`、`{{ target_market }}`
pub const DEFAULT_SCORING_TEMPLATE: &str = r#"INPUT:
Keyword: "{{ keyword }}"

SYSTEM:
Du agierst als deutschsprachiger SEO-Analyst und Keyword-Bewertungsexperte für **{{ company_name }}** – {{ company_description }}.

UNTERNEHMENS-KONTEXT (BITTE BEI JEDEM SCORE BERÜCKSICHTIGEN)
• Unternehmen: {{ company_name }}
• Beschreibung: {{ company_description }}
• Branche: {{ industry }}
• Zielmarkt: {{ target_market }}

AUFGABE
Du erhältst ein Keyword. Bewerte es für die Relevanz zum Unternehmen:
1. Vergib einen **RelevanceScore** (10 – 100, ganze Zahl).
2. Füge eine **Rationale** (≤ 2 Sätze) hinzu, warum der Score vergeben wurde.

SCORING-RUBRIK (PLUS-PUNKTE → MINUS-ABZÜGE)
DIREKTE PRODUKT-/MARKEN-ÜBEREINSTIMMUNG (max = 50)
+50 Enthält Firmennamen oder exakte Produktnamen
+45 Sehr spezifische Produkt-/Dienstleistungsbegriffe des Unternehmens
+40 Branchenspezifische Fachbegriffe mit direktem Bezug
+30 Allgemeine Branchenbegriffe

ZIELGRUPPEN- UND MARKT-FIT (max = 25)
+15 Begriffe, die die exakte Zielgruppe des Unternehmens ansprechen
+10 Allgemeine Zielgruppenbegriffe der Branche
+5  Keywords sind auf Deutsch (bevorzugt) oder Englisch

KOMMERZIELLER INTENT (max = 15)
+10 Kaufabsicht erkennbar ("kaufen", "Anbieter", "Lösung", "Service")
+5  Informationsabsicht mit kommerziellem Potenzial

WETTBEWERBSPOSITION (max = 10)
+10 Keyword mit geringer Konkurrenz aber hoher Relevanz
+5  Standard-Branchenkeyword

PENALTIES (nach Addition anwenden; Mindestscore = 10)
–50 Keyword hat keinen Bezug zur Branche oder den Produkten des Unternehmens
–30 Sehr allgemeine Begriffe ohne spezifischen Unternehmensbezug
–20 Keywords sprechen eine völlig andere Zielgruppe an
–30 "Problem", "funktioniert nicht", "Beschwerden" ohne Lösungsbezug

FORMEL
Final RelevanceScore = (DIREKT + ZIELGRUPPE + KOMMERZIELL + WETTBEWERB) – PENALTIES
• Obergrenze = 100, Untergrenze = 10 (alles < 10 ⇒ 10).

OUTPUT-FORMAT (STRICT)
Gib **ausschließlich** diese JSON-Struktur zurück – keinerlei Text davor oder danach:

{
  "Keyword": "<keyword text>",
  "RelevanceScore": <integer>,
  "Rationale": "<1–2 sentences>"
}

REGELN:
• Bewerte das Keyword objektiv basierend auf der Unternehmensrelevanz
• Score zwischen 10-100
• Rationale auf Deutsch, maximal 2 Sätze
• Kein Kommentar außerhalb des JSON-Objekts
• JSON muss syntaktisch valide sein
"#;

fn placeholder_regex() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").ok())
        .as_ref()
}

/// 一次性替换全部 `{{ name }}` 占位符，未知占位符原样保留
///
/// 替换进去的值不会被再次展开
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let Some(re) = placeholder_regex() else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// 评分模板：公司上下文和关键词在派发时一次性替换
#[derive(Debug, Clone)]
pub struct ScoringTemplate {
    template: String,
    keyword_variable: String,
    context: CompanyContext,
}

impl ScoringTemplate {
    /// 绑定公司上下文
    ///
    /// `custom` 为空时使用默认模板（占位符名固定为 `keyword`）
    pub fn new(custom: Option<&str>, keyword_variable: &str, context: &CompanyContext) -> Self {
        let (template, keyword_variable) = match custom.map(str::trim).filter(|t| !t.is_empty()) {
            Some(custom) => (custom.to_string(), keyword_variable.trim().to_string()),
            None => (DEFAULT_SCORING_TEMPLATE.to_string(), "keyword".to_string()),
        };

        Self {
            template,
            keyword_variable,
            context: context.clone(),
        }
    }

    /// 为单个关键词生成提示词
    pub fn render(&self, keyword: &str) -> String {
        fill(
            &self.template,
            &[
                (self.keyword_variable.as_str(), keyword),
                ("company_name", &self.context.company_name),
                ("company_description", &self.context.company_description),
                ("industry", &self.context.industry),
                ("target_market", &self.context.target_market),
            ],
        )
    }
}
