/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::SweepReport;

/// 初始化日志
///
/// `RUST_LOG` 优先；未设置时 `verbose` 决定 debug 还是 info 级别。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("upload_relay={},warn", default_level)));

    // 测试中可能被重复初始化，忽略错误
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 上传协调服务");
    info!("🌐 发起方页面: {}", config.initiator_url);
    info!("🪟 上传页面: {}", config.surface_base_url);
    info!("💾 存储文件: {}", config.store_path.display());
    info!("{}", "=".repeat(60));
}

/// 记录启动清理结果
pub fn log_sweep_report(report: &SweepReport) {
    info!("\n{}", "─".repeat(60));
    info!(
        "🧹 启动清理完成: 检查 {} 条，删除 {} 条过期记录",
        report.scanned, report.removed
    );
    if report.skipped > 0 {
        warn!("⚠️ {} 条记录无法识别，已跳过", report.skipped);
    }
    info!("{}", "─".repeat(60));
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
        assert_eq!(truncate_text("上传协调服务", 4), "上传协调...");
        assert_eq!(truncate_text("Acme", 10), "Acme");
    }
}
