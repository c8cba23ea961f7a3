//! 核心功能模块
//!
//! 与具体图形 API 无关的基础设施：配置、日志和错误处理。
//!
//! - `config`：配置管理，支持从 TOML 文件加载并用命令行覆盖
//! - `log`：日志系统，基于 tracing 的结构化日志
//! - `error`：错误处理，定义统一的错误类型

pub mod config;
pub mod error;
pub mod log;

// 重新导出常用类型，方便使用
pub use config::Config;
pub use error::{Result, VidCtxError};
