//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 负责批量调度和任务状态，不做具体业务判断。
//!
//! ### `batch_executor` - 批量执行器
//! - 固定宽度分批，批次串行、批内并发
//! - 单条失败只计为丢弃
//! - 每批结束后上报进度
//!
//! ### `job_registry` - 任务注册表
//! - 任务 ID → 状态快照
//! - `JobHandle` 是唯一写入方
//!
//! ## 层次关系
//!
//! ```text
//! app::Pipeline (提交 / 查询)
//!     ↓
//! workflow (freestyle / contextual-scoring)
//!     ↓
//! orchestrator (batch_executor + job_registry)
//!     ↓
//! services (prompt / invoker / parser)
//!     ↓
//! infrastructure (throttle / model backend)
//! ```

pub mod batch_executor;
pub mod job_registry;

pub use batch_executor::{BatchExecutor, BatchOutcome, BatchProgress, NoProgress, ProgressSink};
pub use job_registry::{InMemoryJobRegistry, JobHandle, JobRegistry};
