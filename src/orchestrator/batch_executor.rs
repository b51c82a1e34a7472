//! 批量执行器 - 编排层
//!
//! ## 职责
//!
//! 把一个任务的全部条目切成固定宽度的批次：
//!
//! 1. **分批**：批次严格串行，上一批全部结束才开始下一批
//! 2. **批内并发**：同一批的条目各自 `tokio::spawn`，完全并发
//! 3. **失败隔离**：单个条目出错（含 panic）只记为丢弃，不影响同批其他条目
//! 4. **保序**：按提交顺序等待句柄，幸存结果保持提交顺序
//! 5. **进度**：每批结束后通过 [`ProgressSink`] 上报
//!
//! 执行器不关心条目的具体含义，也不依赖任务注册表。

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use tracing::error;

use crate::error::AppResult;
use crate::models::JobTally;
use crate::utils::logging;

/// 一批结束后的进度
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress<T> {
    /// 百分比：⌊已处理 / 总数 · 100⌋
    pub percent: u8,
    pub tally: JobTally,
    pub total: usize,
    /// 截至当前的全部幸存结果（提交顺序）
    pub results: Vec<T>,
}

/// 进度接收方
#[async_trait]
pub trait ProgressSink<T>: Send + Sync {
    async fn on_batch(&self, progress: BatchProgress<T>);
}

/// 不关心进度时使用
pub struct NoProgress;

#[async_trait]
impl<T: Send + 'static> ProgressSink<T> for NoProgress {
    async fn on_batch(&self, _progress: BatchProgress<T>) {}
}

/// 执行结果
#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    /// 幸存结果（提交顺序）
    pub results: Vec<T>,
    pub tally: JobTally,
}

/// 进度百分比
pub fn percent_of(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed.min(total) * 100) / total) as u8
}

/// 批量执行器
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    width: usize,
}

impl BatchExecutor {
    /// 宽度为 0 时按 1 处理
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// 处理全部条目
    ///
    /// # 参数
    /// - `label`: 日志前缀
    /// - `items`: 待处理条目（提交顺序）
    /// - `process`: 单个条目的处理函数，返回 `Err` 即丢弃
    /// - `sink`: 每批结束后接收进度
    pub async fn run<I, T, F, Fut>(
        &self,
        label: &str,
        items: Vec<I>,
        process: F,
        sink: &dyn ProgressSink<T>,
    ) -> BatchOutcome<T>
    where
        I: Display + Send + 'static,
        T: Clone + Send + 'static,
        F: Fn(usize, I) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let total = items.len();
        let total_batches = total.div_ceil(self.width);
        let mut results = Vec::with_capacity(total);
        let mut tally = JobTally::default();

        let mut remaining = items.into_iter().enumerate().peekable();
        let mut batch_num = 0;

        while remaining.peek().is_some() {
            batch_num += 1;
            let batch: Vec<(usize, I)> = remaining.by_ref().take(self.width).collect();
            let batch_size = batch.len();
            let start = batch.first().map(|(idx, _)| idx + 1).unwrap_or(0);
            logging::log_batch_start(batch_num, total_batches, start, start + batch_size - 1, total);

            // 为本批创建并发任务
            let mut handles = Vec::with_capacity(batch_size);
            for (idx, item) in batch {
                let item_label = item.to_string();
                let process = process.clone();
                let handle = tokio::spawn(async move { process(idx, item).await });
                handles.push((item_label, handle));
            }

            // 按提交顺序等待本批所有任务
            let mut success = 0;
            for (item_label, handle) in handles {
                match handle.await {
                    Ok(Ok(value)) => {
                        results.push(value);
                        tally.succeeded += 1;
                        success += 1;
                    }
                    Ok(Err(e)) => {
                        error!("[{}] ❌ 条目 {} 已丢弃: {}", label, item_label, e);
                        tally.dropped += 1;
                    }
                    Err(e) => {
                        error!("[{}] ❌ 条目 {} 任务执行失败: {}", label, item_label, e);
                        tally.dropped += 1;
                    }
                }
            }

            let percent = percent_of(tally.processed(), total);
            logging::log_batch_complete(batch_num, success, batch_size, percent);

            sink.on_batch(BatchProgress {
                percent,
                tally,
                total,
                results: results.clone(),
            })
            .await;
        }

        BatchOutcome { results, tally }
    }
}
