/// 日志工具模块
///
/// 提供日志初始化以及运行级别的日志输出辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::Progress;

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`，否则默认 `info`，详细模式下为 `debug`。
/// 重复调用是安全的（测试中多次初始化只有第一次生效）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录一次运行的开始
///
/// # 参数
/// - `term_count`: 术语数量
/// - `batch_count`: 批次数量
/// - `batch_size`: 第一批之后的批次大小
pub fn log_run_start(term_count: usize, batch_count: usize, batch_size: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始生成术语解释");
    info!(
        "📋 术语 {} 个，共 {} 批，批次大小 {}",
        term_count, batch_count, batch_size
    );
    info!("{}", "=".repeat(60));
}

/// 记录批次完成进度
pub fn log_progress(progress: &Progress, ready: usize, term_count: usize) {
    info!(
        "📦 批次进度 {}/{} ({}%)，已就绪解释 {}/{}",
        progress.completed, progress.total, progress.percentage, ready, term_count
    );
}

/// 打印最终统计信息
///
/// # 参数
/// - `resolved`: 已解决的术语数
/// - `term_count`: 术语总数
/// - `elapsed_ms`: 总耗时
pub fn print_final_stats(resolved: usize, term_count: usize, elapsed_ms: u128) {
    info!("\n{}", "=".repeat(60));
    info!("📊 术语解释生成完成");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已解释: {}/{}", resolved, term_count);
    if resolved < term_count {
        info!("⚠️ 未解释: {}", term_count - resolved);
    }
    info!("⏱️ 耗时: {}ms", elapsed_ms);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
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
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("术语解释", 2), "术语...");
        assert_eq!(truncate_text("栈", 5), "栈");
    }
}
