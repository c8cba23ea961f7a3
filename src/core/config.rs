//! 配置管理模块
//!
//! 提供上下文驱动配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "vid_ctx"
//! resizable = true
//!
//! [video]
//! driver = "wgl"          # wgl, vulkan, gdi
//! platform = "headless"   # headless, winit
//! api = "opengl"
//! major = 3
//! minor = 3
//! swap_interval = 1       # 0 = 不同步, N = 每 N 次刷新, -1 = 自适应
//! fullscreen = false
//! frames = 120            # 省略时一直运行到窗口关闭
//!
//! [logging]
//! level = "info"          # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};
use crate::gfx::api::ContextApi;
use crate::gfx::platform::{PlatformKind, WindowDesc};
use crate::gfx::registry;
use crate::gfx::state::ContextSettings;

/// 程序配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 视频上下文配置
    #[serde(default)]
    pub video: VideoConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 是否可调整大小
    #[serde(default = "default_resizable")]
    pub resizable: bool,
}

/// 视频上下文配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// 上下文驱动标识
    #[serde(default = "default_driver")]
    pub driver: String,

    /// 运行平台
    #[serde(default)]
    pub platform: PlatformKind,

    /// 请求的渲染 API
    #[serde(default = "default_api")]
    pub api: ContextApi,

    #[serde(default = "default_major")]
    pub major: u32,

    #[serde(default = "default_minor")]
    pub minor: u32,

    /// 交换间隔
    #[serde(default = "default_swap_interval")]
    pub swap_interval: i32,

    #[serde(default)]
    pub fullscreen: bool,

    /// 请求调试上下文
    #[serde(default)]
    pub debug_context: bool,

    /// 请求共享的硬件渲染上下文
    #[serde(default)]
    pub shared_context: bool,

    /// destroy 时保留上下文
    #[serde(default)]
    pub cache_context: bool,

    /// 视频驱动运行在独立线程上
    #[serde(default)]
    pub threaded: bool,

    /// 上层视频驱动标识（gl, glcore, gl1）
    #[serde(default = "default_video_driver")]
    pub video_driver: String,

    /// 渲染的帧数上限
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `EnvFilter` 使用的指令
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// 默认值函数
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "vid_ctx".to_string() }
fn default_resizable() -> bool { true }
fn default_driver() -> String { "wgl".to_string() }
fn default_api() -> ContextApi { ContextApi::OpenGl }
fn default_major() -> u32 { 3 }
fn default_minor() -> u32 { 3 }
fn default_swap_interval() -> i32 { 1 }
fn default_video_driver() -> String { "gl".to_string() }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "vid_ctx.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            resizable: default_resizable(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            platform: PlatformKind::default(),
            api: default_api(),
            major: default_major(),
            minor: default_minor(),
            swap_interval: default_swap_interval(),
            fullscreen: false,
            debug_context: false,
            shared_context: false,
            cache_context: false,
            threaded: false,
            video_driver: default_video_driver(),
            frames: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

fn parse_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

impl Config {
    /// 从配置文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--driver <ident>`：上下文驱动（wgl, vulkan, gdi），同时切换到该驱动的 API
    /// - `--platform <headless|winit>`
    /// - `--width <value>` / `--height <value>`
    /// - `--fullscreen`
    /// - `--swap-interval <n>`
    /// - `--frames <n>`
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if let Some(driver) = parse_value::<String>(&args, "--driver") {
            if let Some(entry) = registry::find(&driver) {
                self.video.api = entry.descriptor.api;
            }
            self.video.driver = driver;
        }

        match parse_value::<String>(&args, "--platform").as_deref() {
            Some("headless") => self.video.platform = PlatformKind::Headless,
            Some("winit") => self.video.platform = PlatformKind::Winit,
            _ => (),
        }

        if let Some(width) = parse_value(&args, "--width") {
            self.window.width = width;
        }
        if let Some(height) = parse_value(&args, "--height") {
            self.window.height = height;
        }

        if args.iter().any(|a| a == "--fullscreen") {
            self.video.fullscreen = true;
        }

        if let Some(interval) = parse_value(&args, "--swap-interval") {
            self.video.swap_interval = interval;
        }
        if let Some(frames) = parse_value(&args, "--frames") {
            self.video.frames = Some(frames);
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }
            .into());
        }

        let entry = registry::find(&self.video.driver)
            .ok_or_else(|| ConfigError::UnknownDriver(self.video.driver.clone()))?;

        if entry.descriptor.api != self.video.api {
            return Err(ConfigError::UnsupportedApi {
                driver: entry.descriptor.ident,
                api: self.video.api,
            }
            .into());
        }

        let nonsensical_version = match self.video.api {
            ContextApi::OpenGl | ContextApi::OpenGlEs | ContextApi::Vulkan => self.video.major == 0,
            ContextApi::OpenVg | ContextApi::None => false,
        };
        if nonsensical_version {
            return Err(ConfigError::InvalidValue {
                field: "video.major".to_string(),
                reason: format!("{} requires a major version of at least 1", self.video.api.name()),
            }
            .into());
        }

        Ok(())
    }

    /// 转换为驱动的上下文设置
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            window: WindowDesc {
                title: self.window.title.clone(),
                width: self.window.width,
                height: self.window.height,
                resizable: self.window.resizable,
            },
            video_driver: self.video.video_driver.clone(),
            threaded: self.video.threaded,
            cache_context: self.video.cache_context,
            debug_context: self.video.debug_context,
            shared_context: self.video.shared_context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.video.driver, "wgl");
        assert_eq!(config.video.platform, PlatformKind::Headless);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            [video]
            driver = "vulkan"
            api = "vulkan"
            major = 1
            minor = 1
            swap_interval = -1
            frames = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.video.api, ContextApi::Vulkan);
        assert_eq!(config.video.swap_interval, -1);
        assert_eq!(config.video.frames, Some(10));
        assert_eq!(config.window.title, "vid_ctx");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args([
            "vid_ctx", "--driver", "gdi", "--width", "320", "--height", "240", "--fullscreen",
            "--swap-interval", "0", "--frames", "3",
        ]);

        assert_eq!(config.video.driver, "gdi");
        assert_eq!(config.video.api, ContextApi::None);
        assert_eq!((config.window.width, config.window.height), (320, 240));
        assert!(config.video.fullscreen);
        assert_eq!(config.video.swap_interval, 0);
        assert_eq!(config.video.frames, Some(3));

        // 非法数值保持原值
        config.apply_args(["--width", "wide"]);
        assert_eq!(config.window.width, 320);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.video.driver = "d3d9".to_string();
        assert!(config.validate().unwrap_err().is_config());

        let mut config = Config::default();
        config.video.api = ContextApi::Vulkan;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.video.major = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_context_settings() {
        let mut config = Config::default();
        config.video.shared_context = true;
        config.video.video_driver = "glcore".to_string();

        let settings = config.context_settings();
        assert!(settings.shared_context);
        assert_eq!(settings.video_driver, "glcore");
        assert_eq!(settings.window.width, 1280);
    }
}
