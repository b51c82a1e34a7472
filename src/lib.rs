//! # Loop Over Rows
//!
//! 限流、容忍部分失败的批量行标注服务：对表格的每一行（或每个关键词）
//! 调用大模型，把解析出的结构化结果按提交顺序汇总。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（模型连接、调用配额），只暴露能力
//! - `Throttle` - 滑动窗口限流
//! - `ModelBackend` - 模型调用边界（OpenAI 兼容接口 / Gemini 原生接口）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个条目
//! - `prompt_builder` - 提示词模板
//! - `RetryingInvoker` - 节流 + 重试 + 解析
//! - `response_parser` - 容错的 JSON 提取
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的完整处理流程
//! - `ItemCtx` - 上下文封装（job_id + 条目索引）
//! - `FreestyleFlow` - 每行一次调用
//! - `ScoringFlow` - 公司调研 → 关键词评分 → 阈值筛选
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_executor` - 分批执行，批内并发、失败隔离
//! - `orchestrator/job_registry` - 任务状态注册表
//!
//! ### ⑤ 接口层
//! - `app::Pipeline` - 提交 / 后台执行 / 查询
//! - `api` - axum 路由
//!
//! ## 模块结构

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::{JobOutcome, Pipeline};
pub use config::{BackendKind, Config};
pub use error::{AppError, AppResult};
pub use infrastructure::{build_backend, ModelBackend, Throttle};
pub use models::{JobMode, JobSnapshot, JobStatus, ProcessRequest};
pub use orchestrator::{InMemoryJobRegistry, JobRegistry};
pub use workflow::{FreestyleFlow, ItemCtx, ScoringFlow};
