//! 上下文生命周期状态机
//!
//! ```text
//! UNINITIALIZED ─bind_api→ API_BOUND ─init→ SURFACE_READY ─set_video_mode→ CONTEXT_CREATED ─introspect→ READY
//!                                                  │                                                   ▲
//!                                                  └──────────────── reuse cached context ─────────────┘
//! 任意状态 ─destroy→ DESTROYED        任意失败的迁移 ─(destroy 回滚)→ ERROR
//! ```
//!
//! 每个后端持有一个 [`DriverState`]，请求的 API、版本和能力标志都保存在其中，
//! 没有进程级的静态变量。

use tracing::trace;

use crate::core::error::{Result, VidCtxError};
use crate::gfx::api::{ApiVersion, ContextApi, ContextRequest};
use crate::gfx::flags::{Capabilities, FeatureFlags};
use crate::gfx::platform::WindowDesc;

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContextState {
    #[default]
    Uninitialized,
    ApiBound,
    SurfaceReady,
    ContextCreated,
    Ready,
    Destroyed,
    Error,
}

/// 命名的状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `bind_api` 记录请求
    BindApi,
    /// `init` 创建窗口和像素格式/实例
    CreateSurface,
    /// `set_video_mode` 创建主上下文或交换链
    CreateContext,
    /// `set_video_mode` 命中上下文缓存，跳过重建
    ReuseCachedContext,
    /// 能力自省完成
    Introspect,
    /// `destroy`
    Destroy,
    /// 迁移失败（回滚之后）
    Fail,
}

impl Transition {
    fn operation(&self) -> &'static str {
        match self {
            Transition::BindApi => "bind_api",
            Transition::CreateSurface => "init",
            Transition::CreateContext => "set_video_mode",
            Transition::ReuseCachedContext => "set_video_mode",
            Transition::Introspect => "introspect",
            Transition::Destroy => "destroy",
            Transition::Fail => "fail",
        }
    }
}

impl ContextState {
    /// 计算迁移后的状态，非法迁移返回 `None`
    pub fn next(self, transition: Transition) -> Option<ContextState> {
        use ContextState::*;

        match (self, transition) {
            (Uninitialized | ApiBound | Destroyed | Error, Transition::BindApi) => Some(ApiBound),
            (ApiBound, Transition::CreateSurface) => Some(SurfaceReady),
            (SurfaceReady, Transition::CreateContext) => Some(ContextCreated),
            (SurfaceReady | Ready, Transition::ReuseCachedContext) => Some(Ready),
            (ContextCreated, Transition::Introspect) => Some(Ready),
            // 对未初始化或已销毁的驱动调用 destroy 是空操作
            (Uninitialized, Transition::Destroy) => Some(Uninitialized),
            (_, Transition::Destroy) => Some(Destroyed),
            (Uninitialized, Transition::Fail) => None,
            (_, Transition::Fail) => Some(Error),
            _ => None,
        }
    }

    /// 交换/呈现控制器只能在 READY 状态访问上下文和表面
    pub fn is_ready(&self) -> bool {
        matches!(self, ContextState::Ready)
    }

    /// 是否持有需要 destroy 释放的资源
    pub fn holds_resources(&self) -> bool {
        matches!(
            self,
            ContextState::SurfaceReady | ContextState::ContextCreated | ContextState::Ready
        )
    }
}

/// 状态机实例
#[derive(Debug, Clone, Copy, Default)]
pub struct Lifecycle {
    state: ContextState,
}

impl Lifecycle {
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// 执行迁移，非法迁移返回 `InvalidState` 且状态不变
    pub fn apply(&mut self, transition: Transition) -> Result<ContextState> {
        match self.state.next(transition) {
            Some(next) => {
                trace!(from = ?self.state, to = ?next, ?transition, "Context state transition");
                self.state = next;
                Ok(next)
            }
            None => Err(VidCtxError::InvalidState {
                operation: transition.operation(),
                state: self.state,
            }),
        }
    }

    /// 检查某个迁移当前是否合法，不改变状态
    pub fn check(&self, transition: Transition) -> Result<()> {
        self.state
            .next(transition)
            .map(|_| ())
            .ok_or(VidCtxError::InvalidState {
                operation: transition.operation(),
                state: self.state,
            })
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }
}

/// 上层视频驱动在创建上下文前下发的设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSettings {
    pub window: WindowDesc,
    pub video_driver: String,
    pub threaded: bool,
    pub cache_context: bool,
    pub debug_context: bool,
    pub shared_context: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            window: WindowDesc::default(),
            video_driver: "gl".to_string(),
            threaded: false,
            cache_context: false,
            debug_context: false,
            shared_context: false,
        }
    }
}

/// 每个后端独占的驱动状态
///
/// 请求的 API/版本、能力标志、线程化标志和上下文缓存开关都在这里，
/// 由后端在每次调用中读写。
#[derive(Debug, Clone)]
pub struct DriverState {
    pub lifecycle: Lifecycle,
    pub request: ContextRequest,
    pub caps: Capabilities,
    /// 视频驱动是否运行在独立线程上，见 `GfxContext::defers_uploads`
    pub threaded: bool,
    /// 是否在 destroy 时保留上下文以便下次复用
    pub cache_context: bool,
    /// 上层视频驱动标识（如 "gl"、"glcore"、"gl1"），决定着色器标志
    pub video_driver: String,
    /// `init` 创建窗口时使用的参数
    pub window: WindowDesc,
}

impl DriverState {
    pub fn new(overridable: FeatureFlags) -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            request: ContextRequest::default(),
            caps: Capabilities::new(overridable),
            threaded: false,
            cache_context: false,
            video_driver: "gl".to_string(),
            window: WindowDesc::default(),
        }
    }

    /// 应用上层设置，不影响生命周期状态
    pub fn configure(&mut self, settings: &ContextSettings) {
        self.window = settings.window.clone();
        self.video_driver = settings.video_driver.clone();
        self.threaded = settings.threaded;
        self.cache_context = settings.cache_context;
        self.request.debug_context = settings.debug_context;
        self.request.shared_context = settings.shared_context;
    }

    pub fn state(&self) -> ContextState {
        self.lifecycle.state()
    }

    /// 记录 API 请求，并迁移到 API_BOUND
    pub fn bind(&mut self, api: ContextApi, major: u32, minor: u32) -> Result<()> {
        self.lifecycle.apply(Transition::BindApi)?;
        self.request.api = api;
        self.request.version = ApiVersion::new(major, minor);
        Ok(())
    }

    /// 回到 `bind_api` 之前的基线：api = none，版本 0.0，标志清零
    ///
    /// 硬件渲染请求（调试/共享上下文）属于帧前端配置，保留。
    pub fn reset_request(&mut self) {
        self.request.api = ContextApi::None;
        self.request.version = ApiVersion::default();
        self.caps.reset();
    }
}
