//! 流程层（Workflow）
//!
//! 定义两种模式下"一个任务"的完整处理流程：
//!
//! - `FreestyleFlow`：每行一次模型调用
//! - `ScoringFlow`：公司调研 → 关键词评分 → 阈值筛选

pub mod freestyle_flow;
pub mod item_ctx;
pub mod scoring_flow;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::config::Config;
use crate::models::JobTally;
use crate::orchestrator::{BatchProgress, JobHandle, ProgressSink};
use crate::services::RetryPolicy;

pub use freestyle_flow::FreestyleFlow;
pub use item_ctx::ItemCtx;
pub use scoring_flow::{select_by_threshold, ScoringFlow};

/// 一个任务的最终产出
#[derive(Debug, Clone)]
pub struct FlowOutput {
    /// 最终结果（提交顺序）
    pub results: Vec<JsonValue>,
    pub tally: JobTally,
    /// 实际处理的条目数（测试模式下可能少于提交数）
    pub total_items: usize,
    /// 评分模式最终采用的阈值
    pub threshold: Option<i64>,
}

/// 把批次进度写入任务注册表
pub(crate) struct JobProgress<'a> {
    handle: &'a JobHandle,
    /// 是否同时发布阶段性结果
    publish_results: bool,
}

impl<'a> JobProgress<'a> {
    pub(crate) fn new(handle: &'a JobHandle, publish_results: bool) -> Self {
        Self {
            handle,
            publish_results,
        }
    }
}

#[async_trait]
impl<'a, T: Serialize + Send + 'static> ProgressSink<T> for JobProgress<'a> {
    async fn on_batch(&self, progress: BatchProgress<T>) {
        let results = self.publish_results.then(|| {
            progress
                .results
                .iter()
                .filter_map(|record| serde_json::to_value(record).ok())
                .collect()
        });
        self.handle
            .report_progress(progress.percent, progress.tally, results)
            .await;
    }
}

pub(crate) fn retry_policy(config: &Config) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.max_attempts,
        base_delay: config.retry_base_delay(),
    }
}

pub(crate) fn period(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
