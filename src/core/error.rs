//! 错误处理模块
//!
//! 定义了上下文驱动层中使用的统一错误类型。
//!
//! # 错误分类
//!
//! - 配置错误：请求了未编译或不支持的 API/版本，调用方需选择其他后端
//! - 资源创建错误：窗口、上下文、表面或交换链创建失败，已在内部回滚
//! - 交换链重建错误：`set_resize` 失败，调用方应跳过当前帧的呈现
//! - 状态错误：在生命周期的错误阶段调用了操作
//!
//! 能力降级（例如缺少自适应垂直同步扩展）不属于错误，只记录警告日志。

use std::fmt;

use crate::gfx::api::ContextApi;
use crate::gfx::state::ContextState;

/// 上下文驱动层统一的 Result 类型
pub type Result<T> = std::result::Result<T, VidCtxError>;

/// vid_ctx 的错误类型
#[derive(Debug)]
pub enum VidCtxError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误
    Graphics(GraphicsError),

    /// IO 错误
    Io(std::io::Error),

    /// 在当前生命周期状态下不允许的操作
    InvalidState {
        operation: &'static str,
        state: ContextState,
    },
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },

    /// 未注册的上下文驱动
    UnknownDriver(String),

    /// 后端不支持所请求的 API
    UnsupportedApi { driver: &'static str, api: ContextApi },

    /// 后端无法在所选平台上运行
    UnsupportedPlatform { driver: &'static str, platform: String },
}

/// 图形 API 相关的错误
#[derive(Debug)]
pub enum GraphicsError {
    /// 窗口已经初始化（单窗口进程）
    AlreadyInitialized,

    /// 窗口创建失败
    WindowCreation(String),

    /// 显示模式切换失败
    DisplayMode(String),

    /// 上下文创建失败
    ContextCreation(String),

    /// 无法将上下文设为当前
    MakeCurrent(String),

    /// 表面创建失败
    SurfaceCreation(String),

    /// 交换链错误
    SwapchainError(String),

    /// 呈现失败
    Present(String),
}

impl fmt::Display for VidCtxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VidCtxError::Config(e) => write!(f, "Configuration error: {}", e),
            VidCtxError::Graphics(e) => write!(f, "Graphics error: {}", e),
            VidCtxError::Io(e) => write!(f, "IO error: {}", e),
            VidCtxError::InvalidState { operation, state } => {
                write!(f, "Operation '{}' is not allowed in state {:?}", operation, state)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::UnknownDriver(ident) => write!(f, "Unknown context driver: {}", ident),
            ConfigError::UnsupportedApi { driver, api } => {
                write!(f, "Context driver '{}' does not support {} API", driver, api.name())
            }
            ConfigError::UnsupportedPlatform { driver, platform } => {
                write!(f, "Context driver '{}' cannot run on the '{}' platform", driver, platform)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::AlreadyInitialized => write!(f, "A window is already initialized"),
            GraphicsError::WindowCreation(msg) => write!(f, "Window creation failed: {}", msg),
            GraphicsError::DisplayMode(msg) => write!(f, "Display mode change failed: {}", msg),
            GraphicsError::ContextCreation(msg) => write!(f, "Context creation failed: {}", msg),
            GraphicsError::MakeCurrent(msg) => write!(f, "Failed to make context current: {}", msg),
            GraphicsError::SurfaceCreation(msg) => write!(f, "Surface creation failed: {}", msg),
            GraphicsError::SwapchainError(msg) => write!(f, "Swapchain error: {}", msg),
            GraphicsError::Present(msg) => write!(f, "Present failed: {}", msg),
        }
    }
}

impl std::error::Error for VidCtxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VidCtxError::Config(e) => Some(e),
            VidCtxError::Graphics(e) => Some(e),
            VidCtxError::Io(e) => Some(e),
            VidCtxError::InvalidState { .. } => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}

impl From<std::io::Error> for VidCtxError {
    fn from(err: std::io::Error) -> Self {
        VidCtxError::Io(err)
    }
}

impl From<ConfigError> for VidCtxError {
    fn from(err: ConfigError) -> Self {
        VidCtxError::Config(err)
    }
}

impl From<GraphicsError> for VidCtxError {
    fn from(err: GraphicsError) -> Self {
        VidCtxError::Graphics(err)
    }
}

impl VidCtxError {
    /// 是否为配置类错误（调用方应换用其他 API 或后端，而不是重试）
    pub fn is_config(&self) -> bool {
        matches!(self, VidCtxError::Config(_))
    }
}
