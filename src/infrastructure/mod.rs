//! 基础设施层
//!
//! 持有稀缺资源（模型后端连接、调用配额），只暴露能力

pub mod llm_backend;
pub mod throttle;

pub use llm_backend::{build_backend, GeminiBackend, ModelBackend, OpenAiBackend};
pub use throttle::Throttle;
