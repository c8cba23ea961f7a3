//! 图形上下文驱动模块
//!
//! 本模块把"拿到一个可以渲染和呈现的窗口"抽象成统一的驱动接口：
//! - `wgl`：传统 OpenGL 上下文，两阶段创建（基础上下文 → 扩展上下文）
//! - `vulkan`：显式交换链，交换间隔和尺寸变化都通过重建交换链生效
//! - `gdi`：软件立即呈现，无渲染上下文
//!
//! 所有后端都实现 [`GfxContext`]，并通过 [`registry`] 按标识选择。

pub mod api;
pub mod backend;
pub mod flags;
pub mod gdi;
pub mod gl;
pub mod platform;
pub mod present;
pub mod registry;
pub mod state;
pub mod surface;
pub mod vulkan;

pub use api::{ApiVersion, BackendDescriptor, ContextApi, ContextRequest};
pub use backend::{ContextData, GfxContext, VideoModeOutcome};
pub use flags::FeatureFlags;
pub use platform::{HeadlessOptions, PlatformKind};
pub use registry::{ContextDriver, PlatformSelection};
pub use state::{ContextSettings, ContextState};
pub use surface::{DisplayMetric, WindowEvents};
