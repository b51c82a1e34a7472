/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use crate::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// `RUST_LOG` 优先；否则默认 info，详细模式下为 debug
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 测试中可能重复初始化，忽略错误
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录服务启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 服务启动 - loop-over-rows");
    info!("🤖 模型后端: {:?} / {}", config.backend, config.llm_model_name);
    info!(
        "📊 freestyle: {} 次/{}ms, 每批 {} 行",
        config.freestyle_rate_limit, config.freestyle_rate_period_ms, config.freestyle_batch_width
    );
    info!(
        "📊 contextual-scoring: {} 次/{}ms, 每批 {} 个关键词",
        config.scoring_rate_limit, config.scoring_rate_period_ms, config.scoring_batch_width
    );
    info!("{}", "=".repeat(60));
}

/// 记录任务开始信息
pub fn log_job_start(mode: &str, job_id: &str, total: usize, batch_width: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📋 [{}] 任务 {} 开始", mode, job_id);
    info!("📄 共 {} 个条目, 每批 {} 个", total, batch_width);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号（从 1 开始）
/// - `total_batches`: 批次总数
/// - `start`: 起始条目编号
/// - `end`: 结束条目编号
/// - `total`: 条目总数
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("📦 开始处理第 {}/{} 批 (条目 {}-{} / 共 {} 个)", batch_num, total_batches, start, end, total);
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_num: usize, success: usize, batch_size: usize, progress: u8) {
    info!(
        "✓ 第 {} 批完成: 成功 {}/{}, 总进度 {}%",
        batch_num, success, batch_size, progress
    );
}

/// 打印任务最终统计
pub fn log_job_complete(job_id: &str, succeeded: usize, dropped: usize, total: usize, elapsed_ms: u128) {
    info!("\n{}", "=".repeat(60));
    info!("📊 任务 {} 处理完成", job_id);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("✅ 成功: {}/{}", succeeded, total);
    info!("❌ 丢弃: {}", dropped);
    info!("⏱️ 耗时: {}ms", elapsed_ms);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        // 多字节字符按字符截断
        assert_eq!(truncate_text("关键词评分", 2), "关键...");
    }
}
