//! API 模块
//!
//! 对外的 HTTP 接口：
//!
//! - `GET  /`              健康检查
//! - `POST /process`       同步处理，返回全部结果
//! - `POST /jobs`          后台处理，返回任务 ID
//! - `GET  /status/:id`    查询任务状态

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tracing::info;

use crate::app::Pipeline;
use crate::error::{AppResult, ConfigError};

pub use handlers::ApiError;

/// 构建路由
pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/process", post(handlers::process))
        .route("/jobs", post(handlers::create_job))
        .route("/status/:request_id", get(handlers::job_status))
        .with_state(pipeline)
}

/// 启动 HTTP 服务器
pub async fn serve(pipeline: Pipeline) -> AppResult<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        pipeline.config().server_host,
        pipeline.config().server_port
    )
    .parse()
    .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
        field: "server_host",
        reason: e.to_string(),
    })?;

    let app = router(pipeline);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 HTTP 服务器启动在: {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
