//! 日志工具模块
//!
//! 提供日志初始化、日志文件和运行横幅的辅助函数

use std::fs;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::{AppError, AppResult};

/// 初始化 tracing 订阅者
///
/// 默认级别为 `info`，`verbose` 时提升到 `debug`；设置了 `RUST_LOG` 时以它为准。
/// 重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n作业评分日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).map_err(|e| AppError::file(log_file_path, e))
}

/// 记录程序启动信息
///
/// # 参数
/// - `assignment_id`: 作业ID
/// - `batch_size`: 每批请求数
pub fn log_startup(assignment_id: &str, batch_size: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 作业 {} 评分", assignment_id);
    info!("📊 每批请求数: {}", batch_size);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号
/// - `total_batches`: 批次总数
/// - `start`: 起始请求编号
/// - `end`: 结束请求编号
/// - `total`: 请求总数
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("{}", "─".repeat(60));
    info!("📦 开始发送第 {}/{} 批", batch_num, total_batches);
    info!("📄 本批请求: {}-{} / 共 {} 个", start, end, total);
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_num: usize, received: usize, total: usize) {
    info!("✓ 第 {} 批完成: 收到响应 {}/{}", batch_num, received, total);
}

/// 打印最终统计信息
///
/// # 参数
/// - `assessed`: 完成评分的回答数
/// - `failed`: 评分失败的回答数
/// - `students`: 学生人数
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(assessed: usize, failed: usize, students: usize, log_file_path: &str) {
    info!("{}", "=".repeat(60));
    info!("📊 评分完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("👥 学生: {}", students);
    info!("✅ 已评分: {}", assessed);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("日志已保存至: {}", log_file_path);
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
        assert_eq!(truncate_text("答案是四十二", 3), "答案是...");
        assert_eq!(truncate_text("42", 10), "42");
    }

    #[test]
    fn test_init_log_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        init_log_file(path.to_str().unwrap()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("作业评分日志"));
    }
}
