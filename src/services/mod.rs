//! 业务能力层（Services）
//!
//! 描述"我能做什么"：拼提示词、调用模型、解析响应。只处理单个条目。

pub mod invoker;
pub mod prompt_builder;
pub mod response_parser;

pub use invoker::{CallOutcome, RetryPolicy, RetryingInvoker};
pub use prompt_builder::{company_research_prompt, freestyle_prompt, ScoringTemplate};
