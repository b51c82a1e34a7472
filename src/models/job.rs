//! 任务状态

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::models::request::JobMode;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// 仅用于查询不存在的任务
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// 成功 / 丢弃计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobTally {
    pub succeeded: usize,
    pub dropped: usize,
}

impl JobTally {
    pub fn processed(&self) -> usize {
        self.succeeded + self.dropped
    }
}

/// 一个任务的完整状态
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub request_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<JobMode>,
    /// 百分比，运行期间单调不减
    pub progress: u8,
    pub total_items: usize,
    /// 有条目完成后才会出现
    pub results: Option<Vec<JsonValue>>,
    #[serde(flatten)]
    pub tally: JobTally,
    /// 评分模式最终采用的阈值
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: JobStatus::Pending,
            mode: None,
            progress: 0,
            total_items: 0,
            results: None,
            tally: JobTally::default(),
            threshold: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// 应用一次更新
    ///
    /// 终态之后的更新被忽略；进度只增不减；完成时进度置为 100
    pub fn apply(&mut self, update: JobUpdate) {
        if self.status.is_terminal() {
            return;
        }

        if let Some(mode) = update.mode {
            self.mode = Some(mode);
        }
        if let Some(total) = update.total_items {
            self.total_items = total;
        }
        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(results) = update.results {
            self.results = Some(results);
        }
        if let Some(tally) = update.tally {
            self.tally = tally;
        }
        if let Some(threshold) = update.threshold {
            self.threshold = Some(threshold);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }

        if let Some(status) = update.status {
            let now = Utc::now();
            match status {
                JobStatus::Running => {
                    self.started_at.get_or_insert(now);
                }
                JobStatus::Completed => {
                    self.progress = 100;
                    self.started_at.get_or_insert(now);
                    self.completed_at = Some(now);
                    self.results.get_or_insert_with(Vec::new);
                }
                JobStatus::Failed => {
                    self.completed_at = Some(now);
                }
                JobStatus::Pending | JobStatus::Unknown => {}
            }
            if status != JobStatus::Unknown {
                self.status = status;
            }
        }
    }
}

/// 一次状态更新，`None` 字段保持不变
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub mode: Option<JobMode>,
    pub total_items: Option<usize>,
    pub progress: Option<u8>,
    pub results: Option<Vec<JsonValue>>,
    pub tally: Option<JobTally>,
    pub threshold: Option<i64>,
    pub error: Option<String>,
}

/// 对外查询结果
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobSnapshot {
    Known(Job),
    Unknown { status: JobStatus },
}

impl JobSnapshot {
    pub fn unknown() -> Self {
        JobSnapshot::Unknown {
            status: JobStatus::Unknown,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobSnapshot::Known(job) => job.status,
            JobSnapshot::Unknown { status } => *status,
        }
    }

    pub fn job(&self) -> Option<&Job> {
        match self {
            JobSnapshot::Known(job) => Some(job),
            JobSnapshot::Unknown { .. } => None,
        }
    }
}
