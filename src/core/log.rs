//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//! 各后端使用自己的 target（`vid_ctx::wgl`、`vid_ctx::vulkan`、`vid_ctx::gdi`、
//! `vid_ctx::registry`），可以通过 `RUST_LOG` 单独调整。
//!
//! # 使用示例
//!
//! ```no_run
//! use vid_ctx::core::log::{self, LogLevel};
//!
//! // 仅控制台输出
//! log::init_logger(LogLevel::Info, false, None);
//!
//! tracing::info!(width = 800, height = 600, "Window created");
//! ```

use std::path::Path;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use super::config::LogLevel;

/// 日志文件的默认名称
const DEFAULT_LOG_FILE: &str = "vid_ctx.log";

/// 构造过滤器：`RUST_LOG` 优先，否则使用配置的级别
fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()))
}

/// 拆分日志路径为目录和文件名
fn split_log_path(log_file_path: Option<&str>) -> (&Path, &str) {
    let path = Path::new(log_file_path.unwrap_or(DEFAULT_LOG_FILE));
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (directory, filename)
}

/// 初始化日志系统
///
/// 必须在程序开始时调用一次，重复调用会被忽略。
///
/// # 参数
///
/// * `level` - 日志级别（`RUST_LOG` 存在时以它为准）
/// * `file_output` - 是否同时输出到按天滚动的文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "vid_ctx.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) {
    let filter = build_filter(level);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(true);

    let file_layer = file_output.then(|| {
        let (directory, filename) = split_log_path(log_file_path);
        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, filename);

        fmt::layer()
            .with_target(true)
            .with_ansi(false) // 文件不需要 ANSI 颜色
            .with_writer(file_appender)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// 日志级别转换
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}
