//! HTTP 处理函数

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value as JsonValue};
use tracing::error;

use crate::app::{JobOutcome, Pipeline};
use crate::error::{AppError, ValidationError};
use crate::models::{JobMode, JobSnapshot, JobStatus};

/// 错误响应：`{"success": false, "error": ...}`
#[derive(Debug)]
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::Validation(ValidationError::DuplicateJob(_)) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("❌ 请求处理失败: {}", self.0);
        }
        let body = Json(json!({"success": false, "error": self.0.to_string()}));
        (status, body).into_response()
    }
}

/// 请求体必须是合法 JSON，否则按校验失败处理
fn body_of(payload: Result<Json<JsonValue>, JsonRejection>) -> Result<JsonValue, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError(AppError::malformed(rejection.body_text())))
}

/// 健康检查
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "app": "loop-over-rows",
        "version": env!("CARGO_PKG_VERSION"),
        "modes": [JobMode::Freestyle.as_str(), JobMode::ContextualScoring.as_str()],
    }))
}

/// 同步处理
pub async fn process(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<JobOutcome>, ApiError> {
    let body = body_of(payload)?;
    let outcome = pipeline.submit(body).await?;
    Ok(Json(outcome))
}

/// 后台处理，立即返回任务 ID
pub async fn create_job(
    State(pipeline): State<Pipeline>,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<(StatusCode, Json<JsonValue>), ApiError> {
    let body = body_of(payload)?;
    let request_id = pipeline.spawn(body).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"request_id": request_id, "status": JobStatus::Running})),
    ))
}

/// 查询任务状态
pub async fn job_status(
    State(pipeline): State<Pipeline>,
    Path(request_id): Path<String>,
) -> Json<JobSnapshot> {
    Json(pipeline.status(&request_id).await)
}
