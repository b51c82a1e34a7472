//! 任务注册表 - 编排层
//!
//! 任务 ID → 任务状态。外层映射的锁只覆盖插入和查找，
//! 每个任务有自己的锁；写入方只有持有 [`JobHandle`] 的那一个流程。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{AppResult, ValidationError};
use crate::models::{Job, JobMode, JobSnapshot, JobStatus, JobTally, JobUpdate};

/// 任务注册表
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// 登记一个新任务（状态 pending）
    ///
    /// 同 ID 的任务仍在进行中时拒绝；已结束的任务被替换
    async fn create(&self, id: &str) -> AppResult<()>;

    /// 更新任务状态，任务不存在时返回 `false`
    async fn update(&self, id: &str, update: JobUpdate) -> bool;

    /// 查询任务快照，不存在时返回 `unknown`
    async fn get(&self, id: &str) -> JobSnapshot;
}

/// 进程内注册表
///
/// 进行中的任务永远保留；已结束的任务超过 `max_retained` 时，
/// 在登记新任务前按结束时间淘汰最早的那些
#[derive(Default)]
pub struct InMemoryJobRegistry {
    jobs: RwLock<HashMap<String, Arc<RwLock<Job>>>>,
    /// 0 表示不限
    max_retained: usize,
}

impl InMemoryJobRegistry {
    /// 不淘汰任何任务
    pub fn new() -> Self {
        Self::default()
    }

    /// 最多保留 `max_retained` 个已结束任务
    pub fn with_retention(max_retained: usize) -> Self {
        Self {
            jobs: RwLock::default(),
            max_retained,
        }
    }

    /// 淘汰多余的已结束任务，为即将登记的任务腾出位置
    async fn evict_finished(&self, jobs: &mut HashMap<String, Arc<RwLock<Job>>>) {
        if self.max_retained == 0 {
            return;
        }

        let mut finished = Vec::new();
        for (id, job) in jobs.iter() {
            let job = job.read().await;
            if job.status.is_terminal() {
                finished.push((job.completed_at.unwrap_or(job.created_at), id.clone()));
            }
        }
        // 新任务结束后也要算进保留数
        if finished.len() < self.max_retained {
            return;
        }

        finished.sort();
        let excess = finished.len() + 1 - self.max_retained;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
        debug!("淘汰 {} 个已结束任务", excess);
    }

    async fn entry(&self, id: &str) -> Option<Arc<RwLock<Job>>> {
        self.jobs.read().await.get(id).cloned()
    }
}

#[async_trait]
impl JobRegistry for InMemoryJobRegistry {
    async fn create(&self, id: &str) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs.get(id) {
            if !existing.read().await.status.is_terminal() {
                return Err(ValidationError::DuplicateJob(id.to_string()).into());
            }
            debug!("任务 {} 已结束，替换为新任务", id);
            jobs.remove(id);
        }
        self.evict_finished(&mut jobs).await;
        jobs.insert(id.to_string(), Arc::new(RwLock::new(Job::new(id))));
        Ok(())
    }

    async fn update(&self, id: &str, update: JobUpdate) -> bool {
        match self.entry(id).await {
            Some(job) => {
                job.write().await.apply(update);
                true
            }
            None => false,
        }
    }

    async fn get(&self, id: &str) -> JobSnapshot {
        match self.entry(id).await {
            Some(job) => JobSnapshot::Known(job.read().await.clone()),
            None => JobSnapshot::unknown(),
        }
    }
}

/// 任务的唯一写入方
#[derive(Clone)]
pub struct JobHandle {
    id: String,
    registry: Arc<dyn JobRegistry>,
}

impl JobHandle {
    /// 在注册表中登记任务并取得写入权
    pub async fn create(registry: Arc<dyn JobRegistry>, id: impl Into<String>) -> AppResult<Self> {
        let id = id.into();
        registry.create(&id).await?;
        Ok(Self { id, registry })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, update: JobUpdate) {
        if !self.registry.update(&self.id, update).await {
            debug!("任务 {} 不在注册表中，忽略更新", self.id);
        }
    }

    /// pending → running
    pub async fn start(&self, mode: JobMode, total_items: usize) {
        self.send(JobUpdate {
            status: Some(JobStatus::Running),
            mode: Some(mode),
            total_items: Some(total_items),
            progress: Some(0),
            ..Default::default()
        })
        .await;
    }

    /// 上报进度；`results` 为 `None` 时保留已有结果
    pub async fn report_progress(
        &self,
        progress: u8,
        tally: JobTally,
        results: Option<Vec<JsonValue>>,
    ) {
        self.send(JobUpdate {
            progress: Some(progress),
            tally: Some(tally),
            results,
            ..Default::default()
        })
        .await;
    }

    /// running → completed
    pub async fn complete(&self, results: Vec<JsonValue>, tally: JobTally, threshold: Option<i64>) {
        self.send(JobUpdate {
            status: Some(JobStatus::Completed),
            results: Some(results),
            tally: Some(tally),
            threshold,
            ..Default::default()
        })
        .await;
    }

    /// → failed（仅用于派发前的校验失败）
    pub async fn fail(&self, error: impl Into<String>) {
        self.send(JobUpdate {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        })
        .await;
    }
}
