//! freestyle 处理流程 - 流程层
//!
//! 每一行：拼提示词 → 调用模型 → 解析 → 打上 `row_key`
//!
//! 解析失败或重试用尽的行被丢弃，不影响其他行

use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::{ModelBackend, Throttle};
use crate::models::{FreestyleRequest, JobMode, OutputRecord, WorkItem};
use crate::orchestrator::{BatchExecutor, JobHandle};
use crate::services::{freestyle_prompt, response_parser, RetryingInvoker};
use crate::utils::logging;
use crate::workflow::item_ctx::ItemCtx;
use crate::workflow::{period, retry_policy, FlowOutput, JobProgress};

/// freestyle 处理流程
///
/// - 每个任务一个节流器，所有行共享
/// - 阶段性结果在每批结束后发布
pub struct FreestyleFlow {
    backend: Arc<dyn ModelBackend>,
    config: Config,
}

impl FreestyleFlow {
    pub fn new(config: &Config, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            config: config.clone(),
        }
    }

    /// 本次请求的批宽度：请求指定优先，测试模式有上限
    pub fn batch_width(&self, request: &FreestyleRequest) -> usize {
        let width = request
            .batch_size
            .filter(|size| *size > 0)
            .unwrap_or(self.config.freestyle_batch_width);
        if request.test_mode {
            width.min(self.config.test_batch_width)
        } else {
            width
        }
    }

    /// 展开成待处理条目（测试模式只取前几行）
    pub fn work_items(&self, request: &FreestyleRequest) -> Vec<WorkItem> {
        let mut rows = request.rows();
        if request.test_mode {
            rows.truncate(self.config.test_item_limit);
        }
        rows.into_iter()
            .map(|(key, row)| {
                let prompt = freestyle_prompt(&row, &request.prompt, request.enable_google_search);
                WorkItem::new(key, row, prompt)
            })
            .collect()
    }

    pub async fn run(&self, handle: &JobHandle, request: &FreestyleRequest) -> FlowOutput {
        let started = Instant::now();
        let items = self.work_items(request);
        let total = items.len();
        let width = self.batch_width(request);

        logging::log_job_start(JobMode::Freestyle.as_str(), handle.id(), total, width);
        handle.start(JobMode::Freestyle, total).await;

        let throttle = Arc::new(Throttle::new(
            self.config.freestyle_rate_limit,
            period(self.config.freestyle_rate_period_ms),
        ));
        let invoker = RetryingInvoker::new(self.backend.clone(), throttle, retry_policy(&self.config));
        let job_id = handle.id().to_string();
        let verbose = self.config.verbose_logging;

        let process = move |position: usize, item: WorkItem| {
            let invoker = invoker.clone();
            let ctx = ItemCtx::new(&job_id, position, &item.key);
            async move {
                if verbose {
                    debug!("{} 📝 行数据: {}", ctx, logging::truncate_text(&item.payload.to_string(), 80));
                }
                let fields = invoker
                    .invoke(&ctx.to_string(), &item.prompt, response_parser::parse_record)
                    .await?;
                debug!("{} ✓ 解析成功，字段数 {}", ctx, fields.len());
                Ok::<JsonValue, AppError>(OutputRecord::tagged(item.key, fields).into_value())
            }
        };

        let sink = JobProgress::new(handle, true);
        let outcome = BatchExecutor::new(width)
            .run(handle.id(), items, process, &sink)
            .await;

        logging::log_job_complete(
            handle.id(),
            outcome.tally.succeeded,
            outcome.tally.dropped,
            total,
            started.elapsed().as_millis(),
        );
        info!("[任务 {}] ✅ freestyle 完成，保留 {} 行", handle.id(), outcome.results.len());

        FlowOutput {
            results: outcome.results,
            tally: outcome.tally,
            total_items: total,
            threshold: None,
        }
    }
}
