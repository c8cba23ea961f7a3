//! WGL/OpenGL 上下文驱动
//!
//! `init` 加载 GL 库并创建带 GL 像素格式的窗口，`set_video_mode` 创建上下文
//! 或复用缓存的上下文，随后查询扩展并下发交换间隔。开启上下文缓存时
//! `destroy` 保留上下文，驱动被丢弃时才真正删除。

use tracing::{debug, error, info, trace, warn};

use crate::core::error::{ConfigError, GraphicsError, Result, VidCtxError};
use crate::gfx::api::{BackendDescriptor, ContextApi};
use crate::gfx::backend::{choose_input_driver, GfxContext, VideoModeOutcome};
use crate::gfx::flags::{has_extension, FeatureFlags};
use crate::gfx::platform::{GlPlatform, NativeDrawable, PixelFormat, ProcAddress};
use crate::gfx::present::{resolve_interval, PresentState};
use crate::gfx::state::{DriverState, Transition};
use crate::gfx::surface::{video_size, DisplayMetric, SurfaceBinding, WindowEvents};

use super::context::{create_contexts, GlContexts};
use super::{DESCRIPTOR, LOG_TARGET};

/// WGL/OpenGL 上下文驱动
pub struct GlDriver {
    platform: Box<dyn GlPlatform>,
    state: DriverState,
    present: PresentState,
    surface: Option<SurfaceBinding>,
    /// 启用上下文缓存时，destroy 之后仍然保留
    contexts: Option<GlContexts>,
    /// `set_video_mode` 末尾解析到的交换间隔入口
    swap_interval_proc: Option<ProcAddress>,
    library_open: bool,
    use_hw_ctx: bool,
}

impl GlDriver {
    pub fn new(platform: Box<dyn GlPlatform>) -> Self {
        Self {
            platform,
            state: DriverState::new(FeatureFlags::ADAPTIVE_VSYNC | FeatureFlags::GL_CORE_CONTEXT),
            present: PresentState::default(),
            surface: None,
            contexts: None,
            swap_interval_proc: None,
            library_open: false,
            use_hw_ctx: false,
        }
    }

    /// 最近一次真正下发的交换间隔
    pub fn effective_interval(&self) -> Option<i32> {
        self.present.effective_interval
    }

    /// 是否拿到了共享的硬件渲染上下文
    pub fn has_shared_context(&self) -> bool {
        self.contexts.map_or(false, |c| c.shared.is_some())
    }

    /// 上次 `bind_hw_render` 请求的是否是共享上下文
    pub fn hw_render_bound(&self) -> bool {
        self.use_hw_ctx
    }

    fn drawable(&self) -> Result<NativeDrawable> {
        self.surface
            .and_then(|s| s.drawable)
            .ok_or(VidCtxError::InvalidState {
                operation: "set_video_mode",
                state: self.state.state(),
            })
    }

    /// 回滚已创建的资源并进入 ERROR
    fn fail(&mut self) {
        self.destroy();
        if let Err(e) = self.state.lifecycle.apply(Transition::Fail) {
            debug!(target: LOG_TARGET, "Failure transition rejected: {}", e);
        }
    }

    /// 查询扩展字符串并刷新检测到的标志
    fn introspect(&mut self, drawable: NativeDrawable, core_profile: bool) {
        let extensions = self
            .platform
            .get_proc_address("wglGetExtensionsStringARB")
            .and_then(|_| self.platform.extensions_string(drawable));
        info!(target: LOG_TARGET, "WGL extensions: {}", extensions.as_deref().unwrap_or(""));

        let mut detected = FeatureFlags::empty();
        if has_extension("WGL_EXT_swap_control_tear", extensions.as_deref()) {
            info!(target: LOG_TARGET, "Adaptive VSync supported");
            detected |= FeatureFlags::ADAPTIVE_VSYNC;
        }
        if core_profile {
            detected |= FeatureFlags::GL_CORE_CONTEXT;
        }
        self.state.caps.set_detected(detected);
    }

    /// 把请求的间隔交给 `wglSwapIntervalEXT`，上下文不存在时延后
    fn apply_swap_interval(&mut self) {
        if !self.state.lifecycle.is_ready() || self.contexts.is_none() {
            trace!(target: LOG_TARGET, "Swap interval deferred until context exists");
            return;
        }
        if self.swap_interval_proc.is_none() {
            return;
        }

        let adaptive = self.state.caps.contains(FeatureFlags::ADAPTIVE_VSYNC);
        let interval = resolve_interval(self.present.swap_interval, adaptive);
        info!(target: LOG_TARGET, "wglSwapInterval({})", interval);
        if !self.platform.set_swap_interval(interval) {
            warn!(target: LOG_TARGET, "wglSwapInterval() failed");
        }
        self.present.effective_interval = Some(interval);
    }

    fn create_or_reuse_context(&mut self) -> Result<VideoModeOutcome> {
        let drawable = self.drawable()?;

        if let Some(contexts) = self.contexts {
            info!(target: LOG_TARGET, "Using cached GL context");
            if !self.platform.make_current(Some((drawable, contexts.primary))) {
                return Err(GraphicsError::MakeCurrent("cached context rejected".into()).into());
            }
            self.state.lifecycle.apply(Transition::ReuseCachedContext)?;
            self.introspect(drawable, contexts.core_profile);
            return Ok(VideoModeOutcome::ReusedCachedContext);
        }

        let contexts = create_contexts(&mut *self.platform, drawable, &self.state.request)?;
        self.contexts = Some(contexts);
        self.state.lifecycle.apply(Transition::CreateContext)?;

        self.introspect(drawable, contexts.core_profile);
        self.state.lifecycle.apply(Transition::Introspect)?;
        Ok(VideoModeOutcome::Created)
    }
}

impl GfxContext for GlDriver {
    fn descriptor(&self) -> &'static BackendDescriptor {
        &DESCRIPTOR
    }

    fn driver_state(&self) -> &DriverState {
        &self.state
    }

    fn driver_state_mut(&mut self) -> &mut DriverState {
        &mut self.state
    }

    fn init(&mut self) -> Result<()> {
        self.state.lifecycle.check(Transition::CreateSurface)?;

        self.library_open = self.platform.open_library();
        if !self.library_open {
            warn!(target: LOG_TARGET, "Failed to load the GL library, only extension entry points resolve");
        }

        let desc = self.state.window.clone();
        match SurfaceBinding::create(&mut *self.platform, &desc, Some(&PixelFormat::opengl())) {
            Ok(surface) => self.surface = Some(surface),
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to create window: {}", e);
                self.fail();
                return Err(e);
            }
        }

        self.state.lifecycle.apply(Transition::CreateSurface)?;
        info!(
            target: LOG_TARGET,
            platform = self.platform.name(),
            "Window created ({}x{})", desc.width, desc.height
        );
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(contexts) = self.contexts {
            if self.surface.is_some() {
                self.platform.finish();
                self.platform.make_current(None);
            }

            if !self.state.cache_context {
                if let Some(shared) = contexts.shared {
                    self.platform.delete_context(shared);
                }
                self.platform.delete_context(contexts.primary);
                self.contexts = None;
            } else {
                debug!(target: LOG_TARGET, "Keeping GL context for reuse");
            }
        }

        // 绘制句柄先于窗口释放
        if let Some(surface) = self.surface.take() {
            surface.release(&mut *self.platform);
        }

        if self.library_open {
            self.platform.close_library();
            self.library_open = false;
        }

        let previous = self.state.state();
        self.state.reset_request();
        self.swap_interval_proc = None;
        self.use_hw_ctx = false;
        self.present.effective_interval = None;

        if let Ok(next) = self.state.lifecycle.apply(Transition::Destroy) {
            if previous != next {
                info!(target: LOG_TARGET, "GL context destroyed");
            }
        }
    }

    fn bind_api(&mut self, api: ContextApi, major: u32, minor: u32) -> Result<()> {
        if api != ContextApi::OpenGl {
            return Err(ConfigError::UnsupportedApi {
                driver: DESCRIPTOR.ident,
                api,
            }
            .into());
        }

        self.state.bind(api, major, minor)?;
        debug!(target: LOG_TARGET, "Bound {} {}.{}", api.name(), major, minor);
        Ok(())
    }

    fn swap_interval(&mut self, interval: i32) {
        self.present.request_interval(interval);
        self.apply_swap_interval();
    }

    fn set_video_mode(&mut self, width: u32, height: u32, fullscreen: bool) -> Result<VideoModeOutcome> {
        let transition = if self.contexts.is_some() {
            Transition::ReuseCachedContext
        } else {
            Transition::CreateContext
        };
        self.state.lifecycle.check(transition)?;

        let Some(mut surface) = self.surface else {
            return Err(VidCtxError::InvalidState {
                operation: "set_video_mode",
                state: self.state.state(),
            });
        };

        if let Err(e) = surface.apply_video_mode(&mut *self.platform, width, height, fullscreen) {
            error!(target: LOG_TARGET, "Failed to set video mode: {}", e);
            self.fail();
            return Err(e);
        }
        self.surface = Some(surface);

        let outcome = match self.create_or_reuse_context() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to create GL context: {}", e);
                self.fail();
                return Err(e);
            }
        };

        self.swap_interval_proc = self.platform.get_proc_address("wglSwapIntervalEXT");
        self.apply_swap_interval();

        info!(
            target: LOG_TARGET,
            ?outcome,
            flags = ?self.get_flags(),
            "Video mode set to {}x{} (fullscreen: {})", width, height, fullscreen
        );
        Ok(outcome)
    }

    fn get_video_size(&self) -> (u32, u32) {
        video_size(self.surface.as_ref(), &*self.platform)
    }

    fn get_refresh_rate(&self) -> Option<f32> {
        self.platform.refresh_rate()
    }

    fn get_video_output_size(&self) -> Option<(u32, u32)> {
        Some(self.platform.monitor_resolution())
    }

    fn get_metrics(&self, metric: DisplayMetric) -> Option<f32> {
        self.platform.metric(metric)
    }

    fn update_window_title(&mut self, title: &str) {
        if title.is_empty() {
            return;
        }
        if let Some(surface) = &self.surface {
            self.platform.set_title(surface.window, title);
        }
    }

    fn check_window(&mut self) -> WindowEvents {
        match self.surface.as_mut() {
            Some(surface) => surface.poll(&mut *self.platform),
            None => WindowEvents::default(),
        }
    }

    // 立即呈现后端由窗口系统直接处理尺寸变化，set_resize 使用默认的空操作

    fn has_focus(&self) -> bool {
        self.surface
            .map_or(false, |s| self.platform.has_focus(s.window))
    }

    fn suppress_screensaver(&mut self, enable: bool) -> bool {
        self.platform.suppress_screensaver(enable)
    }

    fn swap_buffers(&mut self) {
        if !self.state.lifecycle.is_ready() {
            trace!(target: LOG_TARGET, state = ?self.state.state(), "swap_buffers ignored, context not ready");
            return;
        }
        if let Some(drawable) = self.surface.and_then(|s| s.drawable) {
            self.platform.swap_buffers(drawable);
        }
    }

    fn input_driver(&self, requested: &str) -> Option<&'static str> {
        choose_input_driver(requested, self.platform.input_drivers())
    }

    fn get_proc_address(&self, symbol: &str) -> Option<ProcAddress> {
        self.platform.get_proc_address(symbol)
    }

    fn show_mouse(&mut self, visible: bool) {
        if let Some(surface) = &self.surface {
            self.platform.show_cursor(surface.window, visible);
        }
    }

    fn get_flags(&self) -> FeatureFlags {
        if !self.state.lifecycle.is_ready() {
            return FeatureFlags::empty();
        }

        let mut flags = self.state.caps.flags();
        let core = flags.contains(FeatureFlags::GL_CORE_CONTEXT);
        match self.state.video_driver.as_str() {
            "gl1" => {}
            "glcore" => flags |= FeatureFlags::SHADERS_SLANG,
            _ => {
                if !core {
                    flags |= FeatureFlags::SHADERS_CG;
                }
                flags |= FeatureFlags::SHADERS_GLSL;
            }
        }
        flags
    }

    fn bind_hw_render(&mut self, enable: bool) {
        self.use_hw_ctx = enable;

        let (Some(contexts), Some(drawable)) = (self.contexts, self.surface.and_then(|s| s.drawable)) else {
            return;
        };

        let target = if enable { contexts.shared } else { Some(contexts.primary) };
        match target {
            Some(context) => {
                if !self.platform.make_current(Some((drawable, context))) {
                    warn!(target: LOG_TARGET, "Failed to switch current context");
                }
            }
            None => debug!(target: LOG_TARGET, "No shared context, primary stays current"),
        }
    }
}

impl Drop for GlDriver {
    fn drop(&mut self) {
        if self.state.state().holds_resources() {
            self.destroy();
        }
        if let Some(contexts) = self.contexts.take() {
            self.platform.make_current(None);
            if let Some(shared) = contexts.shared {
                self.platform.delete_context(shared);
            }
            self.platform.delete_context(contexts.primary);
            debug!(target: LOG_TARGET, "Released cached GL context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::api::ApiVersion;
    use crate::gfx::platform::{HeadlessOptions, HeadlessPlatform, HeadlessProbe, PlatformCall};
    use crate::gfx::state::{ContextSettings, ContextState};

    fn new_driver(opts: HeadlessOptions) -> (GlDriver, HeadlessProbe) {
        let platform = HeadlessPlatform::new(opts);
        let probe = platform.probe();
        (GlDriver::new(Box::new(platform)), probe)
    }

    fn ready(driver: &mut GlDriver, major: u32, minor: u32) {
        driver.bind_api(ContextApi::OpenGl, major, minor).unwrap();
        driver.init().unwrap();
        driver.set_video_mode(1280, 720, false).unwrap();
    }

    #[test]
    fn test_legacy_bring_up() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        driver.bind_api(ContextApi::OpenGl, 3, 3).unwrap();
        assert_eq!(driver.state(), ContextState::ApiBound);
        driver.init().unwrap();
        assert_eq!(driver.state(), ContextState::SurfaceReady);

        let outcome = driver.set_video_mode(1280, 720, false).unwrap();
        assert_eq!(outcome, VideoModeOutcome::Created);
        assert_eq!(driver.state(), ContextState::Ready);
        assert_eq!(driver.get_video_size(), (1280, 720));

        let flags = driver.get_flags();
        assert!(flags.contains(FeatureFlags::GL_CORE_CONTEXT));
        assert!(flags.contains(FeatureFlags::SHADERS_GLSL));
        assert!(!flags.contains(FeatureFlags::SHADERS_CG));
        assert!(probe.current_context().is_some());
    }

    #[test]
    fn test_missing_attribs_entry_point_falls_back() {
        let (mut driver, probe) = new_driver(HeadlessOptions {
            has_create_context_attribs: false,
            ..Default::default()
        });
        ready(&mut driver, 4, 5);

        assert_eq!(driver.state(), ContextState::Ready);
        let flags = driver.get_flags();
        assert!(!flags.contains(FeatureFlags::GL_CORE_CONTEXT));
        assert!(flags.contains(FeatureFlags::SHADERS_CG));
        assert_eq!(
            probe.count(|c| matches!(c, PlatformCall::CreateContextAttribs { .. })),
            0
        );
    }

    #[test]
    fn test_failed_extended_creation_never_sets_core_flag() {
        let (mut driver, _probe) = new_driver(HeadlessOptions {
            fail_attribs_context: true,
            ..Default::default()
        });
        ready(&mut driver, 3, 2);
        assert_eq!(driver.state(), ContextState::Ready);
        assert!(!driver.get_flags().contains(FeatureFlags::GL_CORE_CONTEXT));
    }

    #[test]
    fn test_version_3_1_is_versioned_but_not_core() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver, 3, 1);
        assert!(!driver.get_flags().contains(FeatureFlags::GL_CORE_CONTEXT));
        let attribs = probe.calls().iter().find_map(|c| match c {
            PlatformCall::CreateContextAttribs { attribs, .. } => Some(*attribs),
            _ => None,
        });
        let attribs = attribs.unwrap();
        assert_eq!(attribs.version, Some(ApiVersion::new(3, 1)));
        assert!(!attribs.core_profile);
    }

    #[test]
    fn test_adaptive_request_without_tear_extension() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver, 2, 1);

        driver.swap_interval(-1);
        assert_eq!(probe.last_swap_interval(), Some(1));
        assert_eq!(driver.effective_interval(), Some(1));
        assert!(!driver.get_flags().contains(FeatureFlags::ADAPTIVE_VSYNC));
    }

    #[test]
    fn test_adaptive_request_with_tear_extension() {
        let (mut driver, probe) = new_driver(HeadlessOptions {
            extensions: "WGL_ARB_extensions_string WGL_EXT_swap_control WGL_EXT_swap_control_tear"
                .to_string(),
            ..Default::default()
        });
        ready(&mut driver, 2, 1);

        assert!(driver.get_flags().contains(FeatureFlags::ADAPTIVE_VSYNC));
        driver.swap_interval(-1);
        assert_eq!(probe.last_swap_interval(), Some(-1));
    }

    #[test]
    fn test_forced_adaptive_flag() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver, 2, 1);

        driver.set_flags(FeatureFlags::ADAPTIVE_VSYNC | FeatureFlags::SHADERS_SLANG);
        let flags = driver.get_flags();
        assert!(flags.contains(FeatureFlags::ADAPTIVE_VSYNC));
        assert!(!flags.contains(FeatureFlags::SHADERS_SLANG));

        driver.swap_interval(-1);
        assert_eq!(probe.last_swap_interval(), Some(-1));
    }

    #[test]
    fn test_swap_interval_deferred_until_video_mode() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        driver.bind_api(ContextApi::OpenGl, 2, 1).unwrap();
        driver.init().unwrap();

        driver.swap_interval(2);
        assert_eq!(probe.count(|c| matches!(c, PlatformCall::SetSwapInterval(_))), 0);

        driver.set_video_mode(640, 480, false).unwrap();
        assert_eq!(probe.last_swap_interval(), Some(2));
    }

    #[test]
    fn test_missing_swap_interval_entry_point() {
        let (mut driver, probe) = new_driver(HeadlessOptions {
            has_swap_interval: false,
            ..Default::default()
        });
        ready(&mut driver, 2, 1);
        driver.swap_interval(0);
        assert_eq!(probe.last_swap_interval(), None);
        assert_eq!(driver.effective_interval(), None);
    }

    #[test]
    fn test_resize_is_ignored_and_size_tracks_window() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver, 2, 1);

        assert!(!driver.set_resize(800, 600).unwrap());
        assert_eq!(driver.get_video_size(), (1280, 720));

        probe.push_resize(1024, 768);
        let events = driver.check_window();
        assert!(events.resize);
        assert_eq!((events.width, events.height), (1024, 768));
        assert_eq!(driver.get_video_size(), (1024, 768));
    }

    #[test]
    fn test_video_size_before_init_uses_monitor() {
        let (driver, _probe) = new_driver(HeadlessOptions {
            monitor: (3840, 2160),
            ..Default::default()
        });
        assert_eq!(driver.get_video_size(), (3840, 2160));
        assert_eq!(driver.get_flags(), FeatureFlags::empty());
    }

    #[test]
    fn test_cached_context_is_reused() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        driver.configure(&ContextSettings {
            cache_context: true,
            ..Default::default()
        });
        ready(&mut driver, 2, 1);
        driver.destroy();
        assert_eq!(probe.live_contexts(), 1);
        assert_eq!(probe.live_windows(), 0);

        driver.bind_api(ContextApi::OpenGl, 2, 1).unwrap();
        driver.init().unwrap();
        let outcome = driver.set_video_mode(1280, 720, false).unwrap();
        assert_eq!(outcome, VideoModeOutcome::ReusedCachedContext);
        assert_eq!(driver.state(), ContextState::Ready);
        assert_eq!(probe.count(|c| matches!(c, PlatformCall::CreateContext(_))), 1);
        assert!(probe.current_context().is_some());
    }

    #[test]
    fn test_drop_releases_cached_contexts() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        driver.configure(&ContextSettings {
            cache_context: true,
            shared_context: true,
            ..Default::default()
        });
        ready(&mut driver, 2, 1);
        assert!(probe.library_open());
        let primary = probe.calls().iter().find_map(|c| match c {
            PlatformCall::CreateContext(id) => Some(*id),
            _ => None,
        });

        driver.destroy();
        assert!(!probe.library_open());
        assert_eq!(probe.live_contexts(), 2);

        probe.clear_calls();
        drop(driver);
        assert_eq!(probe.live_contexts(), 0);
        let deleted: Vec<_> = probe
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                PlatformCall::DeleteContext(id) => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(deleted.len(), 2);
        // 共享上下文先于主上下文删除
        assert_ne!(deleted.first().copied(), primary);
        assert_eq!(deleted.last().copied(), primary);
    }

    #[test]
    fn test_drop_while_ready_releases_everything() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver, 3, 3);
        drop(driver);
        assert_eq!(probe.live_contexts(), 0);
        assert_eq!(probe.live_windows(), 0);
        assert!(!probe.library_open());
    }

    #[test]
    fn test_without_cache_context_is_recreated() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver, 2, 1);
        driver.destroy();
        assert_eq!(probe.live_contexts(), 0);

        ready(&mut driver, 2, 1);
        assert_eq!(probe.count(|c| matches!(c, PlatformCall::CreateContext(_))), 2);
    }

    #[test]
    fn test_destroy_ordering() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        driver.configure(&ContextSettings {
            shared_context: true,
            ..Default::default()
        });
        driver.bind_api(ContextApi::OpenGl, 2, 1).unwrap();
        driver.init().unwrap();
        driver.set_video_mode(1920, 1080, true).unwrap();
        assert!(driver.has_shared_context());

        probe.clear_calls();
        driver.destroy();

        let calls = probe.calls();
        let pos = |pred: &dyn Fn(&PlatformCall) -> bool| calls.iter().position(|c| pred(c)).unwrap();
        let finish = pos(&|c| matches!(c, PlatformCall::Finish));
        let unbind = pos(&|c| matches!(c, PlatformCall::MakeCurrent(None)));
        let delete = pos(&|c| matches!(c, PlatformCall::DeleteContext(_)));
        let release = pos(&|c| matches!(c, PlatformCall::ReleaseDrawable(_)));
        let window = pos(&|c| matches!(c, PlatformCall::DestroyWindow(_)));
        let restore = pos(&|c| matches!(c, PlatformCall::RestoreDisplayMode));
        let close = pos(&|c| matches!(c, PlatformCall::CloseLibrary));

        assert!(finish < unbind && unbind < delete);
        assert!(delete < release && release < window && window < restore && restore < close);
        assert_eq!(probe.count(|c| matches!(c, PlatformCall::DeleteContext(_))), 2);
        assert!(!probe.display_mode_changed());
    }

    #[test]
    fn test_destroy_is_idempotent_and_resets_request() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver, 3, 3);

        driver.destroy();
        driver.destroy();
        assert_eq!(driver.state(), ContextState::Destroyed);
        assert_eq!(driver.get_api(), ContextApi::None);
        assert_eq!(driver.driver_state().request.version, ApiVersion::new(0, 0));
        assert_eq!(driver.get_flags(), FeatureFlags::empty());
        assert_eq!(probe.live_windows(), 0);
        assert_eq!(probe.count(|c| matches!(c, PlatformCall::DestroyWindow(_))), 1);
    }

    #[test]
    fn test_destroy_before_init() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        driver.destroy();
        assert_eq!(driver.state(), ContextState::Uninitialized);
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn test_shared_context_failure_is_not_fatal() {
        let (mut driver, probe) = new_driver(HeadlessOptions {
            fail_shared_context: true,
            ..Default::default()
        });
        driver.configure(&ContextSettings {
            shared_context: true,
            ..Default::default()
        });
        ready(&mut driver, 2, 1);
        assert_eq!(driver.state(), ContextState::Ready);
        assert!(!driver.has_shared_context());

        let primary = probe.current_context();
        driver.bind_hw_render(true);
        assert_eq!(probe.current_context(), primary);
    }

    #[test]
    fn test_bind_hw_render_switches_context() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        driver.configure(&ContextSettings {
            shared_context: true,
            ..Default::default()
        });
        ready(&mut driver, 3, 3);

        let primary = probe.current_context();
        driver.bind_hw_render(true);
        assert!(driver.hw_render_bound());
        let shared = probe.current_context();
        assert_ne!(shared, primary);
        driver.bind_hw_render(false);
        assert_eq!(probe.current_context(), primary);
    }

    #[test]
    fn test_make_current_failure_rolls_back_to_error() {
        let (mut driver, probe) = new_driver(HeadlessOptions {
            fail_make_current: true,
            ..Default::default()
        });
        driver.bind_api(ContextApi::OpenGl, 2, 1).unwrap();
        driver.init().unwrap();

        let err = driver.set_video_mode(1280, 720, true).unwrap_err();
        assert!(matches!(err, VidCtxError::Graphics(GraphicsError::MakeCurrent(_))));
        assert_eq!(driver.state(), ContextState::Error);
        assert_eq!(probe.live_contexts(), 0);
        assert_eq!(probe.live_windows(), 0);
        assert!(!probe.display_mode_changed());

        // 重新 bind 之后可以再次尝试
        driver.bind_api(ContextApi::OpenGl, 2, 1).unwrap();
        assert_eq!(driver.state(), ContextState::ApiBound);
    }

    #[test]
    fn test_bind_rejects_other_apis() {
        let (mut driver, _probe) = new_driver(HeadlessOptions::default());
        let err = driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap_err();
        assert!(err.is_config());
        assert_eq!(driver.state(), ContextState::Uninitialized);
    }

    #[test]
    fn test_second_init_is_rejected() {
        let (mut driver, _probe) = new_driver(HeadlessOptions::default());
        driver.bind_api(ContextApi::OpenGl, 2, 1).unwrap();
        driver.init().unwrap();
        assert!(matches!(driver.init(), Err(VidCtxError::InvalidState { .. })));
        assert_eq!(driver.state(), ContextState::SurfaceReady);
    }

    #[test]
    fn test_shader_flags_follow_video_driver() {
        let (mut driver, _probe) = new_driver(HeadlessOptions::default());
        driver.configure(&ContextSettings {
            video_driver: "glcore".to_string(),
            ..Default::default()
        });
        ready(&mut driver, 3, 3);
        let flags = driver.get_flags();
        assert!(flags.contains(FeatureFlags::SHADERS_SLANG));
        assert!(!flags.contains(FeatureFlags::SHADERS_GLSL));

        let (mut driver, _probe) = new_driver(HeadlessOptions::default());
        driver.configure(&ContextSettings {
            video_driver: "gl1".to_string(),
            ..Default::default()
        });
        ready(&mut driver, 1, 1);
        let shaders = FeatureFlags::SHADERS_CG | FeatureFlags::SHADERS_GLSL | FeatureFlags::SHADERS_SLANG;
        assert!(!driver.get_flags().intersects(shaders));
    }

    #[test]
    fn test_window_queries() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver, 2, 1);

        driver.update_window_title("");
        driver.update_window_title("vid_ctx || FPS: 60");
        assert_eq!(probe.title(), "vid_ctx || FPS: 60");
        assert_eq!(probe.count(|c| matches!(c, PlatformCall::SetTitle(_))), 1);

        assert!(driver.has_focus());
        probe.push_focus(false);
        driver.check_window();
        assert!(!driver.has_focus());

        driver.show_mouse(false);
        assert!(!probe.cursor_visible());
        assert_eq!(driver.input_driver("raw"), Some("headless"));
        assert_eq!(driver.get_refresh_rate(), Some(60.0));
        assert!(driver.get_proc_address("glClear").is_some());
        assert_eq!(driver.get_metrics(DisplayMetric::Dpi), Some(96.0));
    }
}
