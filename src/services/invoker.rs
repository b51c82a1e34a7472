//! 带重试的模型调用 - 业务能力层
//!
//! 每次尝试：节流放行 → 调用模型 → 解析。
//! 每次尝试的结果归为三类（成功 / 瞬时失败 / 终止失败），
//! 是否重试只由这个分类和已尝试次数决定。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AppError, BackendError, ParseError};
use crate::infrastructure::{ModelBackend, Throttle};

/// 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub max_attempts: usize,
    /// 第一次重试前的等待时间，之后每次翻倍
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次（从 1 开始）失败后的等待时间
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(2u32.saturating_pow(exp))
    }
}

/// 单次尝试的结果
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// 调用成功且解析成功
    Success(T),
    /// 可重试：网络、超时、空响应
    Transient(BackendError),
    /// 不可重试：解析失败，或后端明确拒绝
    Terminal(AppError),
}

impl<T> CallOutcome<T> {
    fn from_attempt(result: Result<String, BackendError>, parse: impl Fn(&str) -> Result<T, ParseError>) -> Self {
        match result {
            Ok(text) => match parse(&text) {
                Ok(value) => CallOutcome::Success(value),
                Err(e) => CallOutcome::Terminal(e.into()),
            },
            Err(e) if e.is_transient() => CallOutcome::Transient(e),
            Err(e) => CallOutcome::Terminal(e.into()),
        }
    }
}

/// 下一步动作
#[derive(Debug, PartialEq, Eq)]
enum NextStep {
    Retry(Duration),
    GiveUp,
}

fn next_step(is_transient: bool, attempt: usize, policy: &RetryPolicy) -> NextStep {
    match (is_transient, attempt < policy.max_attempts) {
        (true, true) => NextStep::Retry(policy.backoff(attempt)),
        (true, false) | (false, _) => NextStep::GiveUp,
    }
}

/// 带节流和重试的模型调用器
///
/// 每个任务一个实例，所有子任务共享同一个节流器
#[derive(Clone)]
pub struct RetryingInvoker {
    backend: Arc<dyn ModelBackend>,
    throttle: Arc<Throttle>,
    policy: RetryPolicy,
}

impl RetryingInvoker {
    pub fn new(backend: Arc<dyn ModelBackend>, throttle: Arc<Throttle>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            throttle,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 调用模型并解析结果
    ///
    /// # 参数
    /// - `label`: 日志前缀（任务 / 条目信息）
    /// - `prompt`: 提示词
    /// - `parse`: 解析函数，失败时不重试
    pub async fn invoke<T>(
        &self,
        label: &str,
        prompt: &str,
        parse: impl Fn(&str) -> Result<T, ParseError>,
    ) -> Result<T, AppError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.throttle.acquire().await;

            let result = self.backend.generate(prompt).await;
            match CallOutcome::from_attempt(result, &parse) {
                CallOutcome::Success(value) => {
                    if attempt > 1 {
                        debug!("{} 第 {} 次尝试成功", label, attempt);
                    }
                    return Ok(value);
                }
                CallOutcome::Transient(err) => match next_step(true, attempt, &self.policy) {
                    NextStep::Retry(delay) => {
                        warn!(
                            "{} 第 {}/{} 次尝试失败: {}，{:?} 后重试",
                            label, attempt, self.policy.max_attempts, err, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    NextStep::GiveUp => {
                        warn!("{} 已重试 {} 次，放弃: {}", label, attempt, err);
                        return Err(err.into());
                    }
                },
                CallOutcome::Terminal(err) => {
                    warn!("{} 不可重试的失败: {}", label, err);
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// 按脚本依次返回结果的后端
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, BackendError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Connection("脚本已用完".into())))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn invoker(backend: Arc<ScriptedBackend>) -> RetryingInvoker {
        RetryingInvoker::new(
            backend,
            Arc::new(Throttle::new(100, Duration::from_secs(1))),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(100),
            },
        )
    }

    fn as_text(text: &str) -> Result<String, ParseError> {
        crate::services::response_parser::parse_record(text).map(|r| r["v"].to_string())
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_next_step_table() {
        let policy = RetryPolicy::default();
        assert!(matches!(next_step(true, 1, &policy), NextStep::Retry(_)));
        assert!(matches!(next_step(true, 2, &policy), NextStep::Retry(_)));
        assert_eq!(next_step(true, 3, &policy), NextStep::GiveUp);
        assert_eq!(next_step(false, 1, &policy), NextStep::GiveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_with_backoff() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::Timeout { after_ms: 5 }),
            Err(BackendError::EmptyResponse { model: "m".into() }),
            Ok(r#"{"v": 1}"#.to_string()),
        ]);
        let result = invoker(backend.clone()).invoke("[t]", "p", as_text).await;
        assert_eq!(result.unwrap(), "1");

        let times = backend.call_times();
        assert_eq!(times.len(), 3);
        assert!(times[1] - times[0] >= Duration::from_millis(100));
        assert!(times[2] - times[1] >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::Connection("a".into())),
            Err(BackendError::Connection("b".into())),
            Err(BackendError::Connection("c".into())),
            Ok(r#"{"v": 1}"#.to_string()),
        ]);
        let result = invoker(backend.clone()).invoke("[t]", "p", as_text).await;
        assert!(matches!(result, Err(AppError::Backend(BackendError::Connection(_)))));
        assert_eq!(backend.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_failure_is_not_retried() {
        let backend = ScriptedBackend::new(vec![
            Ok("not json at all".to_string()),
            Ok(r#"{"v": 1}"#.to_string()),
        ]);
        let result = invoker(backend.clone()).invoke("[t]", "p", as_text).await;
        assert!(matches!(result, Err(AppError::Parse(_))));
        assert_eq!(backend.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(BackendError::Rejected {
            status: Some(401),
            message: "bad key".into(),
        })]);
        let result = invoker(backend.clone()).invoke("[t]", "p", as_text).await;
        assert!(matches!(result, Err(AppError::Backend(BackendError::Rejected { .. }))));
        assert_eq!(backend.call_times().len(), 1);
    }
}
