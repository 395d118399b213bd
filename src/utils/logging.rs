/// 日志工具模块
///
/// 提供日志初始化和纠错流程中常用的格式化输出
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::{CorrectionSummary, GradingStats, Outcome};

/// 初始化全局日志
///
/// 读取 `RUST_LOG`，未设置时默认 `info`。重复调用不会报错（测试中常见）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录纠错会话开始
///
/// # 参数
/// - `assignment_id`: 作业 ID
/// - `max_rounds`: 最大轮次
/// - `max_attempts`: 每题最大尝试次数
pub fn log_session_start(assignment_id: &str, max_rounds: u32, max_attempts: u32) {
    info!("{}", "=".repeat(60));
    info!("🚀 [作业 {}] 开始自动纠错", assignment_id);
    info!("📊 最多 {} 轮，每题最多尝试 {} 次", max_rounds, max_attempts);
    info!("{}", "=".repeat(60));
}

/// 记录批改统计
pub fn log_grading_stats(assignment_id: &str, label: &str, stats: &GradingStats) {
    info!(
        "📋 [作业 {}] {}: 共 {} 题，正确 {}，错误 {}，未批改 {}，正确率 {}%",
        assignment_id,
        label,
        stats.total,
        stats.correct,
        stats.wrong,
        stats.unknown,
        stats.accuracy_percent
    );
}

/// 记录轮次开始
///
/// # 参数
/// - `round`: 当前轮次（从 1 开始）
/// - `max_rounds`: 最大轮次
/// - `pending`: 待纠错题目数
pub fn log_round_start(round: u32, max_rounds: u32, pending: usize) {
    info!("\n{}", "─".repeat(60));
    info!("🔄 第 {}/{} 轮纠错，待处理 {} 题", round, max_rounds, pending);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn log_summary(summary: &CorrectionSummary) {
    info!("\n{}", "=".repeat(60));
    info!("📊 [作业 {}] 纠错完成统计", summary.assignment_id);
    info!(
        "完成时间: {}",
        summary.finished_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("结果: {:?}，共 {} 轮", summary.outcome, summary.rounds);
    info!("✅ 已纠正: {}", summary.count(Outcome::Success));
    info!("❌ 已穷尽: {}", summary.count(Outcome::Exhausted));
    info!("⏸️ 未完成: {}", summary.count(Outcome::Pending));
    if !summary.unknown.is_empty() {
        info!("❓ 未批改跳过: {}", summary.unknown.len());
    }
    if let Some(reason) = &summary.abort_reason {
        info!("⛔ 中止原因: {:?}", reason);
    }
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
