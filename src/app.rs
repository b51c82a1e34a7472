//! 应用入口 - 提交与查询
//!
//! `Pipeline` 持有配置、模型后端和任务注册表：
//!
//! 1. **登记**：请求 ID 取调用方给定值，否则生成 UUID
//! 2. **校验**：派发前完成，失败则任务记为 failed
//! 3. **派发**：按模式交给对应的流程
//! 4. **收尾**：派发之后任务总是 completed

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::ModelBackend;
use crate::models::{JobMode, JobSnapshot, ProcessRequest};
use crate::orchestrator::{InMemoryJobRegistry, JobHandle, JobRegistry};
use crate::workflow::{FlowOutput, FreestyleFlow, ScoringFlow};

/// 同步处理的返回结果
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub success: bool,
    pub request_id: String,
    pub mode: JobMode,
    pub results: Vec<JsonValue>,
    /// 最终保留的结果数
    pub processed_count: usize,
    /// 被丢弃的条目数
    pub failed_count: usize,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
    /// 耗时（秒）
    pub processing_time: f64,
}

/// 处理流水线
#[derive(Clone)]
pub struct Pipeline {
    config: Config,
    backend: Arc<dyn ModelBackend>,
    registry: Arc<dyn JobRegistry>,
}

impl Pipeline {
    pub fn new(config: Config, backend: Arc<dyn ModelBackend>, registry: Arc<dyn JobRegistry>) -> Self {
        Self {
            config,
            backend,
            registry,
        }
    }

    /// 使用进程内注册表
    pub fn in_memory(config: Config, backend: Arc<dyn ModelBackend>) -> Self {
        let registry = InMemoryJobRegistry::with_retention(config.max_retained_jobs);
        Self::new(config, backend, Arc::new(registry))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 登记并校验；校验失败时任务记为 failed 并返回错误
    async fn admit(&self, body: JsonValue) -> AppResult<(JobHandle, ProcessRequest)> {
        let id = ProcessRequest::request_id_of(&body).unwrap_or_else(|| Uuid::new_v4().to_string());
        let handle = JobHandle::create(self.registry.clone(), id).await?;

        match ProcessRequest::from_value(body) {
            Ok(request) => {
                info!(
                    "[任务 {}] 📥 收到 {} 请求{}",
                    handle.id(),
                    request.mode(),
                    if request.test_mode() { " (测试模式)" } else { "" }
                );
                Ok((handle, request))
            }
            Err(e) => {
                warn!("[任务 {}] ⚠️ 请求校验失败: {}", handle.id(), e);
                handle.fail(e.to_string()).await;
                Err(e.into())
            }
        }
    }

    /// 按模式执行并把结果写回注册表
    async fn execute(&self, handle: &JobHandle, request: &ProcessRequest) -> FlowOutput {
        let output = match request {
            ProcessRequest::Freestyle(req) => {
                FreestyleFlow::new(&self.config, self.backend.clone())
                    .run(handle, req)
                    .await
            }
            ProcessRequest::ContextualScoring(req) => {
                ScoringFlow::new(&self.config, self.backend.clone())
                    .run(handle, req)
                    .await
            }
        };

        handle
            .complete(output.results.clone(), output.tally, output.threshold)
            .await;
        output
    }

    /// 同步处理：等任务结束后返回全部结果
    pub async fn submit(&self, body: JsonValue) -> AppResult<JobOutcome> {
        let started = Instant::now();
        let (handle, request) = self.admit(body).await?;
        let output = self.execute(&handle, &request).await;

        Ok(JobOutcome {
            success: true,
            request_id: handle.id().to_string(),
            mode: request.mode(),
            processed_count: output.results.len(),
            failed_count: output.tally.dropped,
            total_count: output.total_items,
            threshold: output.threshold,
            results: output.results,
            processing_time: started.elapsed().as_secs_f64(),
        })
    }

    /// 后台处理：校验通过后立即返回任务 ID
    pub async fn spawn(&self, body: JsonValue) -> AppResult<String> {
        let (handle, request) = self.admit(body).await?;
        let id = handle.id().to_string();

        let pipeline = self.clone();
        tokio::spawn(async move {
            let output = pipeline.execute(&handle, &request).await;
            info!(
                "[任务 {}] 🏁 后台任务结束: 保留 {} / 丢弃 {}",
                handle.id(),
                output.results.len(),
                output.tally.dropped
            );
        });

        Ok(id)
    }

    /// 查询任务快照
    pub async fn status(&self, id: &str) -> JobSnapshot {
        let snapshot = self.registry.get(id).await;
        if snapshot.job().is_none() {
            debug!("[任务 {}] 查询了不存在的任务", id);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, BackendError, ValidationError};
    use crate::models::JobStatus;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ModelBackend for Echo {
        async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
            Ok(r#"{"ok": true}"#.to_string())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::in_memory(Config::default(), Arc::new(Echo))
    }

    #[tokio::test]
    async fn test_validation_failure_marks_job_failed() {
        let pipeline = pipeline();
        let err = pipeline
            .submit(json!({"request_id": "bad-1", "mode": "crawl"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::UnknownMode(_))));

        let snapshot = pipeline.status("bad-1").await;
        let job = snapshot.job().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap_or_default().contains("crawl"));
    }

    #[tokio::test]
    async fn test_generated_id_when_absent() {
        let outcome = pipeline()
            .submit(json!({"data": {"r1": ["a"]}, "headers": ["h"], "prompt": "p"}))
            .await
            .unwrap();
        assert!(Uuid::parse_str(&outcome.request_id).is_ok());
        assert_eq!(outcome.results, vec![json!({"row_key": "r1", "ok": true})]);
    }

    #[tokio::test]
    async fn test_spawn_reaches_completed() {
        let pipeline = pipeline();
        let id = pipeline
            .spawn(json!({"request_id": "bg", "data": {"r1": ["a"]}, "headers": ["h"], "prompt": "p"}))
            .await
            .unwrap();
        assert_eq!(id, "bg");

        for _ in 0..100 {
            if pipeline.status("bg").await.status() == JobStatus::Completed {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("后台任务没有完成");
    }

    #[tokio::test]
    async fn test_unknown_status() {
        assert_eq!(pipeline().status("missing").await.status(), JobStatus::Unknown);
    }
}
