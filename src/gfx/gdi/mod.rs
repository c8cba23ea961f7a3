//! GDI 上下文驱动（软件立即呈现）
//!
//! 只有窗口和设备上下文，没有渲染上下文和交换间隔，所有能力标志都为零。

use tracing::{debug, error, info, trace};

use crate::core::error::{ConfigError, Result, VidCtxError};
use crate::gfx::api::{BackendDescriptor, ContextApi};
use crate::gfx::backend::{choose_input_driver, GfxContext, VideoModeOutcome};
use crate::gfx::flags::FeatureFlags;
use crate::gfx::platform::{PixelFormat, WindowSystem};
use crate::gfx::state::{DriverState, Transition};
use crate::gfx::surface::{video_size, DisplayMetric, SurfaceBinding, WindowEvents};

const LOG_TARGET: &str = "vid_ctx::gdi";

pub static DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    ident: "gdi",
    api: ContextApi::None,
    name: "GDI",
};

/// GDI 上下文驱动
pub struct GdiDriver {
    platform: Box<dyn WindowSystem>,
    state: DriverState,
    surface: Option<SurfaceBinding>,
}

impl GdiDriver {
    pub fn new(platform: Box<dyn WindowSystem>) -> Self {
        Self {
            platform,
            state: DriverState::new(FeatureFlags::empty()),
            surface: None,
        }
    }

    fn fail(&mut self) {
        self.destroy();
        if let Err(e) = self.state.lifecycle.apply(Transition::Fail) {
            debug!(target: LOG_TARGET, "Failure transition rejected: {}", e);
        }
    }
}

impl GfxContext for GdiDriver {
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

        let desc = self.state.window.clone();
        match SurfaceBinding::create(&mut *self.platform, &desc, Some(&PixelFormat::gdi())) {
            Ok(surface) => self.surface = Some(surface),
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to create window: {}", e);
                self.fail();
                return Err(e);
            }
        }

        self.state.lifecycle.apply(Transition::CreateSurface)?;
        info!(target: LOG_TARGET, "Window created ({}x{})", desc.width, desc.height);
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(surface) = self.surface.take() {
            surface.release(&mut *self.platform);
        }

        self.state.reset_request();
        if let Ok(next) = self.state.lifecycle.apply(Transition::Destroy) {
            trace!(target: LOG_TARGET, state = ?next, "GDI context destroyed");
        }
    }

    fn bind_api(&mut self, api: ContextApi, major: u32, minor: u32) -> Result<()> {
        if api != ContextApi::None {
            return Err(ConfigError::UnsupportedApi {
                driver: DESCRIPTOR.ident,
                api,
            }
            .into());
        }
        self.state.bind(api, major, minor)
    }

    fn swap_interval(&mut self, interval: i32) {
        // GDI 的呈现不与垂直同步对齐
        trace!(target: LOG_TARGET, interval, "Swap interval ignored");
    }

    fn set_video_mode(&mut self, width: u32, height: u32, fullscreen: bool) -> Result<VideoModeOutcome> {
        self.state.lifecycle.check(Transition::CreateContext)?;

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

        self.state.lifecycle.apply(Transition::CreateContext)?;
        self.state.caps.set_detected(FeatureFlags::empty());
        self.state.lifecycle.apply(Transition::Introspect)?;

        info!(target: LOG_TARGET, "Video mode set to {}x{} (fullscreen: {})", width, height, fullscreen);
        Ok(VideoModeOutcome::Created)
    }

    fn get_video_size(&self) -> (u32, u32) {
        video_size(self.surface.as_ref(), &*self.platform)
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

    fn has_focus(&self) -> bool {
        self.surface
            .map_or(false, |s| self.platform.has_focus(s.window))
    }

    fn suppress_screensaver(&mut self, enable: bool) -> bool {
        self.platform.suppress_screensaver(enable)
    }

    fn swap_buffers(&mut self) {
        if !self.state.lifecycle.is_ready() {
            return;
        }
        if let Some(drawable) = self.surface.and_then(|s| s.drawable) {
            self.platform.swap_buffers(drawable);
        }
    }

    fn input_driver(&self, requested: &str) -> Option<&'static str> {
        choose_input_driver(requested, self.platform.input_drivers())
    }

    fn show_mouse(&mut self, visible: bool) {
        if let Some(surface) = &self.surface {
            self.platform.show_cursor(surface.window, visible);
        }
    }
}
