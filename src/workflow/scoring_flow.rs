//! contextual-scoring 处理流程 - 流程层
//!
//! 流程顺序：
//! 1. 公司调研（一次调用，失败时用 URL 推导的兜底上下文）
//! 2. 按批为每个关键词打分
//! 3. 阈值筛选（严格阈值为空时放宽一次）

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::{ModelBackend, Throttle};
use crate::models::{CompanyContext, JobMode, ScoredKeyword, ScoringRequest, WorkItem};
use crate::orchestrator::{BatchExecutor, JobHandle};
use crate::services::{company_research_prompt, response_parser, RetryingInvoker, ScoringTemplate};
use crate::utils::logging;
use crate::workflow::item_ctx::ItemCtx;
use crate::workflow::{period, retry_policy, FlowOutput, JobProgress};

/// 测试模式下合成结果的说明文字
pub const TEST_MODE_RATIONALE: &str = "Testmodus: Beispielausgabe für die UI";

/// 阈值筛选
///
/// 先按 `threshold` 筛选；结果为空且给了 `relaxed` 时，
/// 在已算出的分数上按 `relaxed` 再筛一次（不重新调用模型）。
/// 返回筛选结果和实际采用的阈值。
pub fn select_by_threshold(
    scored: &[ScoredKeyword],
    threshold: i64,
    relaxed: Option<i64>,
) -> (Vec<ScoredKeyword>, i64) {
    let keep = |min: i64| -> Vec<ScoredKeyword> {
        scored
            .iter()
            .filter(|record| record.relevance_score >= min)
            .cloned()
            .collect()
    };

    let strict = keep(threshold);
    match relaxed {
        Some(relaxed) if strict.is_empty() => (keep(relaxed), relaxed),
        _ => (strict, threshold),
    }
}

/// 测试模式的示例输出
fn synthetic_results(keywords: &[String]) -> Vec<ScoredKeyword> {
    keywords
        .iter()
        .map(|keyword| ScoredKeyword {
            keyword: keyword.clone(),
            relevance_score: 90,
            rationale: TEST_MODE_RATIONALE.to_string(),
        })
        .collect()
}

/// contextual-scoring 处理流程
pub struct ScoringFlow {
    backend: Arc<dyn ModelBackend>,
    config: Config,
}

impl ScoringFlow {
    pub fn new(config: &Config, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            config: config.clone(),
        }
    }

    /// 待评分的关键词（测试模式只取前几个）
    pub fn keywords(&self, request: &ScoringRequest) -> Vec<String> {
        let mut keywords = request.keywords();
        if request.test_mode {
            keywords.truncate(self.config.test_item_limit);
        }
        keywords
    }

    pub async fn run(&self, handle: &JobHandle, request: &ScoringRequest) -> FlowOutput {
        let started = Instant::now();
        let keywords = self.keywords(request);
        let total = keywords.len();
        let width = self.config.scoring_batch_width;

        logging::log_job_start(JobMode::ContextualScoring.as_str(), handle.id(), total, width);
        handle.start(JobMode::ContextualScoring, total).await;

        // 调研和评分共用同一个节流器
        let throttle = Arc::new(Throttle::new(
            self.config.scoring_rate_limit,
            period(self.config.scoring_rate_period_ms),
        ));
        let invoker = RetryingInvoker::new(self.backend.clone(), throttle, retry_policy(&self.config));

        // ========== 阶段 1: 公司调研 ==========
        let context = self.research(handle.id(), &invoker, request).await;

        // ========== 阶段 2: 关键词评分 ==========
        let template = ScoringTemplate::new(
            request.prompt_template.as_deref(),
            &request.keyword_variable,
            &context,
        );
        let items: Vec<WorkItem> = keywords
            .iter()
            .map(|keyword| {
                WorkItem::new(
                    keyword.as_str(),
                    serde_json::Value::String(keyword.clone()),
                    template.render(keyword),
                )
            })
            .collect();

        let job_id = handle.id().to_string();
        let process = move |position: usize, item: WorkItem| {
            let invoker = invoker.clone();
            let ctx = ItemCtx::new(&job_id, position, &item.key);
            async move {
                let mut record = invoker
                    .invoke(&ctx.to_string(), &item.prompt, response_parser::parse_scored_keyword)
                    .await?;
                info!("{} 📊 得分 {}", ctx, record.relevance_score);
                record.keyword = item.key;
                Ok::<ScoredKeyword, AppError>(record)
            }
        };

        let sink = JobProgress::new(handle, false);
        let outcome = BatchExecutor::new(width)
            .run(handle.id(), items, process, &sink)
            .await;

        // ========== 阶段 3: 阈值筛选 ==========
        let relaxed = (!request.test_mode).then_some(self.config.relaxed_score_threshold);
        let (mut selected, mut applied) =
            select_by_threshold(&outcome.results, self.config.score_threshold, relaxed);

        if applied != self.config.score_threshold {
            warn!(
                "[任务 {}] ⚠️ 没有关键词达到 {} 分，放宽到 {} 分，保留 {} 个",
                handle.id(),
                self.config.score_threshold,
                applied,
                selected.len()
            );
        }

        if selected.is_empty() && request.test_mode {
            info!("[任务 {}] 🧪 测试模式没有达标结果，输出示例数据", handle.id());
            selected = synthetic_results(&keywords);
            applied = self.config.score_threshold;
        }

        logging::log_job_complete(
            handle.id(),
            outcome.tally.succeeded,
            outcome.tally.dropped,
            total,
            started.elapsed().as_millis(),
        );
        info!(
            "[任务 {}] ✅ 评分完成，{} 个关键词达到 {} 分",
            handle.id(),
            selected.len(),
            applied
        );

        FlowOutput {
            results: selected
                .iter()
                .filter_map(|record| serde_json::to_value(record).ok())
                .collect(),
            tally: outcome.tally,
            total_items: total,
            threshold: Some(applied),
        }
    }

    /// 调研公司；任何失败都退回兜底上下文
    async fn research(
        &self,
        job_id: &str,
        invoker: &RetryingInvoker,
        request: &ScoringRequest,
    ) -> CompanyContext {
        let fallback = CompanyContext::fallback_for(&request.company_url);
        let prompt = company_research_prompt(&request.company_url, request.enable_google_search);
        let label = format!("[任务 {} 公司调研]", job_id);

        info!("{} 🔍 正在调研 {}", label, request.company_url);
        match invoker
            .invoke(&label, &prompt, |text| {
                response_parser::parse_company_context(text, &fallback)
            })
            .await
        {
            Ok(context) => {
                info!("{} ✓ 公司: {} ({})", label, context.company_name, context.industry);
                context
            }
            Err(e) => {
                warn!("{} ⚠️ 调研失败，使用兜底上下文: {}", label, e);
                fallback
            }
        }
    }
}
