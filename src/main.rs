use anyhow::{Context, Result};
use std::path::PathBuf;

use loop_over_rows::{api, build_backend, utils::logging, Config, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置（CONFIG_PATH 指定的文件不存在时使用默认值 + 环境变量）
    let config_path = std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let config = Config::load(Some(config_path.as_path())).context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    if config.llm_api_key.is_empty() {
        tracing::warn!("⚠️ 未设置 LLM_API_KEY / GEMINI_API_KEY，模型调用将会失败");
    }

    let backend = build_backend(&config).context("创建模型后端失败")?;
    let pipeline = Pipeline::in_memory(config, backend);

    api::serve(pipeline).await.context("HTTP 服务异常退出")?;

    Ok(())
}
