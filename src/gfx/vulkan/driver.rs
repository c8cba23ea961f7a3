//! Vulkan 风格的上下文驱动
//!
//! 窗口之后创建实例，`set_video_mode` 创建表面和交换链并立即获取第一张图像。
//! 呈现模式由交换间隔决定，改变间隔或交换链过期时只做标记，
//! 由调用方在下一次 `check_window` 看到 resize 后通过 `set_resize` 重建。

use tracing::{debug, error, info, trace};

use crate::core::error::{ConfigError, Result, VidCtxError};
use crate::gfx::api::{BackendDescriptor, ContextApi};
use crate::gfx::backend::{choose_input_driver, ContextData, GfxContext, VideoModeOutcome};
use crate::gfx::flags::FeatureFlags;
use crate::gfx::platform::SwapchainPlatform;
use crate::gfx::present::{resolve_interval, PresentMode, PresentState};
use crate::gfx::state::{DriverState, Transition};
use crate::gfx::surface::{video_size, DisplayMetric, SurfaceBinding, WindowEvents};

use super::swapchain::Swapchain;
use super::{DESCRIPTOR, LOG_TARGET};

/// Vulkan 上下文驱动
pub struct VulkanDriver {
    platform: Box<dyn SwapchainPlatform>,
    state: DriverState,
    present: PresentState,
    surface: Option<SurfaceBinding>,
    instance: bool,
    vk_surface: bool,
    swapchain: Option<Swapchain>,
}

impl VulkanDriver {
    pub fn new(platform: Box<dyn SwapchainPlatform>) -> Self {
        Self {
            platform,
            state: DriverState::new(FeatureFlags::empty()),
            present: PresentState::default(),
            surface: None,
            instance: false,
            vk_surface: false,
            swapchain: None,
        }
    }

    /// 交换链是否等待重建
    pub fn needs_swapchain_rebuild(&self) -> bool {
        self.present.needs_swapchain_rebuild
    }

    pub fn present_mode(&self) -> Option<PresentMode> {
        self.swapchain.map(|s| s.info.present_mode)
    }

    pub fn effective_interval(&self) -> Option<i32> {
        self.present.effective_interval
    }

    fn adaptive_supported(&self) -> bool {
        self.platform
            .supported_present_modes()
            .contains(&PresentMode::FifoRelaxed)
    }

    fn fail(&mut self) {
        self.destroy();
        if let Err(e) = self.state.lifecycle.apply(Transition::Fail) {
            debug!(target: LOG_TARGET, "Failure transition rejected: {}", e);
        }
    }

    /// 创建表面和交换链
    fn create_swapchain(&mut self, surface: &SurfaceBinding) -> Result<()> {
        self.platform.create_surface(surface.window)?;
        self.vk_surface = true;

        let interval = self.present.swap_interval;
        let (swapchain, out_of_date) =
            Swapchain::create(&mut *self.platform, surface.width, surface.height, interval)?;
        self.swapchain = Some(swapchain);
        self.present.needs_swapchain_rebuild = out_of_date;
        self.present.effective_interval = Some(resolve_interval(interval, self.adaptive_supported()));
        Ok(())
    }

    fn introspect(&mut self) {
        let mut detected = FeatureFlags::SHADERS_SLANG;
        if self.adaptive_supported() {
            detected |= FeatureFlags::ADAPTIVE_VSYNC;
        }
        self.state.caps.set_detected(detected);
    }
}

impl GfxContext for VulkanDriver {
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
        match SurfaceBinding::create(&mut *self.platform, &desc, None) {
            Ok(surface) => self.surface = Some(surface),
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to create window: {}", e);
                self.fail();
                return Err(e);
            }
        }

        if let Err(e) = self.platform.create_instance() {
            error!(target: LOG_TARGET, "Failed to initialize Vulkan context: {}", e);
            self.fail();
            return Err(e);
        }
        self.instance = true;

        self.state.lifecycle.apply(Transition::CreateSurface)?;
        info!(
            target: LOG_TARGET,
            platform = self.platform.name(),
            "Window created ({}x{})", desc.width, desc.height
        );
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(&mut *self.platform);
        }
        if self.vk_surface {
            self.platform.destroy_surface();
            self.vk_surface = false;
        }
        if self.instance {
            self.platform.destroy_instance();
            self.instance = false;
        }

        if let Some(surface) = self.surface.take() {
            surface.release(&mut *self.platform);
        }

        let previous = self.state.state();
        self.state.reset_request();
        self.present.needs_swapchain_rebuild = false;
        self.present.effective_interval = None;

        if let Ok(next) = self.state.lifecycle.apply(Transition::Destroy) {
            if previous != next {
                info!(target: LOG_TARGET, "Vulkan context destroyed");
            }
        }
    }

    fn bind_api(&mut self, api: ContextApi, major: u32, minor: u32) -> Result<()> {
        if api != ContextApi::Vulkan {
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
        // 呈现模式属于交换链本身，只能通过重建生效
        if self.present.request_interval(interval) && self.swapchain.is_some() {
            debug!(target: LOG_TARGET, interval, "Swap interval changed, swapchain rebuild pending");
            self.present.needs_swapchain_rebuild = true;
        }
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

        if let Err(e) = self.create_swapchain(&surface) {
            error!(target: LOG_TARGET, "Failed to create swapchain: {}", e);
            self.fail();
            return Err(e);
        }
        self.state.lifecycle.apply(Transition::CreateContext)?;

        self.introspect();
        self.state.lifecycle.apply(Transition::Introspect)?;

        info!(
            target: LOG_TARGET,
            mode = ?self.present_mode(),
            flags = ?self.get_flags(),
            "Video mode set to {}x{} (fullscreen: {})", width, height, fullscreen
        );
        Ok(VideoModeOutcome::Created)
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
        let mut events = match self.surface.as_mut() {
            Some(surface) => surface.poll(&mut *self.platform),
            None => WindowEvents::default(),
        };
        if self.present.needs_swapchain_rebuild {
            events.resize = true;
        }
        events
    }

    fn set_resize(&mut self, width: u32, height: u32) -> Result<bool> {
        let Some(swapchain) = self.swapchain.as_mut() else {
            trace!(target: LOG_TARGET, state = ?self.state.state(), "set_resize ignored, no swapchain");
            return Ok(false);
        };
        if !self.state.lifecycle.is_ready() {
            return Ok(false);
        }

        let interval = self.present.swap_interval;
        let recreate = self.present.needs_swapchain_rebuild;
        let out_of_date = match swapchain.rebuild(&mut *self.platform, width, height, interval, recreate) {
            Ok(out_of_date) => out_of_date,
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to update swapchain: {}", e);
                return Err(e);
            }
        };
        let replaced = swapchain.info.created_new;

        if let Some(surface) = self.surface.as_mut() {
            surface.width = width;
            surface.height = height;
        }
        // 最小化时无法替换过期的交换链，标记保留到窗口恢复
        self.present.needs_swapchain_rebuild = out_of_date || (recreate && !replaced);
        self.present.effective_interval = Some(resolve_interval(interval, self.adaptive_supported()));
        Ok(true)
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
            trace!(target: LOG_TARGET, state = ?self.state.state(), "swap_buffers ignored, context not ready");
            return;
        }
        let Some(swapchain) = self.swapchain.as_mut() else {
            return;
        };

        if !swapchain.present_and_acquire(&mut *self.platform) {
            self.present.needs_swapchain_rebuild = true;
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

    fn get_context_data(&self) -> Option<ContextData> {
        if !self.state.lifecycle.is_ready() {
            return None;
        }

        self.swapchain.map(|s| ContextData {
            swapchain_width: s.info.width,
            swapchain_height: s.info.height,
            image_count: s.info.image_count,
            current_image: s.current_image,
            present_mode: s.info.present_mode,
            invalid_swapchain: s.invalid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::platform::{HeadlessOptions, HeadlessPlatform, HeadlessProbe, PlatformCall};
    use crate::gfx::state::ContextState;

    fn new_driver(opts: HeadlessOptions) -> (VulkanDriver, HeadlessProbe) {
        let platform = HeadlessPlatform::new(opts);
        let probe = platform.probe();
        (VulkanDriver::new(Box::new(platform)), probe)
    }

    fn ready(driver: &mut VulkanDriver) {
        driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap();
        driver.init().unwrap();
        driver.set_video_mode(1920, 1080, true).unwrap();
    }

    #[test]
    fn test_swapchain_resize_round_trip() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);
        assert_eq!(driver.state(), ContextState::Ready);
        assert_eq!(driver.get_video_size(), (1920, 1080));

        assert!(driver.set_resize(1280, 720).unwrap());
        assert!(!driver.needs_swapchain_rebuild());
        assert_eq!(driver.get_video_size(), (1280, 720));

        let swapchain = probe.swapchain().unwrap();
        assert_eq!((swapchain.width, swapchain.height), (1280, 720));
        // 新交换链立即获取了第一张图像
        assert_eq!(probe.acquired_image(), Some(0));
        let data = driver.get_context_data().unwrap();
        assert!(data.invalid_swapchain);
        assert_eq!(data.current_image, Some(0));
    }

    #[test]
    fn test_interval_change_marks_rebuild() {
        let (mut driver, _probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);
        assert_eq!(driver.present_mode(), Some(PresentMode::Fifo));

        driver.swap_interval(1);
        assert!(!driver.needs_swapchain_rebuild());

        driver.swap_interval(0);
        assert!(driver.needs_swapchain_rebuild());
        assert!(driver.check_window().resize);

        let (w, h) = driver.get_video_size();
        driver.set_resize(w, h).unwrap();
        assert!(!driver.needs_swapchain_rebuild());
        assert!(!driver.check_window().resize);
        assert_eq!(driver.present_mode(), Some(PresentMode::Immediate));
    }

    #[test]
    fn test_interval_before_swapchain_does_not_mark_rebuild() {
        let (mut driver, _probe) = new_driver(HeadlessOptions::default());
        driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap();
        driver.init().unwrap();
        driver.swap_interval(0);
        assert!(!driver.needs_swapchain_rebuild());

        driver.set_video_mode(800, 600, false).unwrap();
        assert_eq!(driver.present_mode(), Some(PresentMode::Immediate));
    }

    #[test]
    fn test_adaptive_without_relaxed_fifo() {
        let (mut driver, _probe) = new_driver(HeadlessOptions::default());
        driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap();
        driver.init().unwrap();
        driver.swap_interval(-1);
        driver.set_video_mode(800, 600, false).unwrap();

        assert_eq!(driver.present_mode(), Some(PresentMode::Fifo));
        assert_eq!(driver.effective_interval(), Some(1));
        assert!(!driver.get_flags().contains(FeatureFlags::ADAPTIVE_VSYNC));
    }

    #[test]
    fn test_adaptive_with_relaxed_fifo() {
        let (mut driver, _probe) = new_driver(HeadlessOptions {
            present_modes: vec![PresentMode::Fifo, PresentMode::FifoRelaxed],
            ..Default::default()
        });
        driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap();
        driver.init().unwrap();
        driver.swap_interval(-1);
        driver.set_video_mode(800, 600, false).unwrap();

        assert_eq!(driver.present_mode(), Some(PresentMode::FifoRelaxed));
        assert_eq!(driver.effective_interval(), Some(-1));
        let flags = driver.get_flags();
        assert!(flags.contains(FeatureFlags::ADAPTIVE_VSYNC | FeatureFlags::SHADERS_SLANG));
    }

    #[test]
    fn test_swap_buffers_presents_then_acquires() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);
        probe.clear_calls();

        driver.swap_buffers();
        assert_eq!(
            probe.calls(),
            vec![PlatformCall::Present(0), PlatformCall::AcquireImage(1)]
        );
        assert!(!driver.get_context_data().unwrap().invalid_swapchain);
    }

    #[test]
    fn test_out_of_date_marks_rebuild() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);

        probe.mark_out_of_date();
        driver.swap_buffers();
        assert!(driver.needs_swapchain_rebuild());
        assert!(driver.check_window().resize);

        driver.set_resize(1600, 900).unwrap();
        assert!(!driver.needs_swapchain_rebuild());
        assert!(driver.get_context_data().unwrap().current_image.is_some());
    }

    #[test]
    fn test_out_of_date_rebuild_at_same_size() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);

        probe.mark_out_of_date();
        driver.swap_buffers();
        // 过期一直持续到交换链被替换
        driver.swap_buffers();
        assert!(driver.needs_swapchain_rebuild());
        assert!(driver.get_context_data().unwrap().current_image.is_none());

        let events = driver.check_window();
        assert!(events.resize);
        probe.clear_calls();
        assert!(driver.set_resize(events.width, events.height).unwrap());
        assert_eq!(
            probe.calls(),
            vec![
                PlatformCall::CreateSwapchain {
                    width: 1920,
                    height: 1080,
                    mode: PresentMode::Fifo,
                    recreate: true,
                },
                PlatformCall::AcquireImage(0),
            ]
        );
        assert!(!driver.needs_swapchain_rebuild());
        assert_eq!(driver.get_context_data().unwrap().current_image, Some(0));

        probe.clear_calls();
        driver.swap_buffers();
        assert_eq!(
            probe.calls(),
            vec![PlatformCall::Present(0), PlatformCall::AcquireImage(1)]
        );
        assert!(!driver.check_window().resize);
    }

    #[test]
    fn test_suboptimal_image_is_presented_then_rebuilt() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);
        probe.mark_suboptimal();
        probe.clear_calls();

        driver.swap_buffers();
        assert_eq!(
            probe.calls(),
            vec![PlatformCall::Present(0), PlatformCall::AcquireImage(1)]
        );
        assert!(driver.needs_swapchain_rebuild());
        assert_eq!(driver.get_context_data().unwrap().current_image, Some(1));

        assert!(driver.set_resize(1920, 1080).unwrap());
        assert!(!driver.needs_swapchain_rebuild());
        assert_eq!(driver.get_context_data().unwrap().current_image, Some(0));

        probe.clear_calls();
        driver.swap_buffers();
        assert_eq!(
            probe.calls(),
            vec![PlatformCall::Present(0), PlatformCall::AcquireImage(1)]
        );
        assert!(!driver.needs_swapchain_rebuild());
    }

    #[test]
    fn test_zero_size_resize_keeps_swapchain() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);
        probe.clear_calls();

        assert!(driver.set_resize(0, 0).unwrap());
        assert_eq!(probe.count(|c| matches!(c, PlatformCall::AcquireImage(_))), 0);
        assert_eq!(driver.get_video_size(), (0, 0));
        assert!(!driver.needs_swapchain_rebuild());

        let data = driver.get_context_data().unwrap();
        assert_eq!((data.swapchain_width, data.swapchain_height), (1920, 1080));
        assert_eq!(data.current_image, Some(0));

        // 已获取的图像仍然可以呈现
        probe.clear_calls();
        driver.swap_buffers();
        assert_eq!(
            probe.calls(),
            vec![PlatformCall::Present(0), PlatformCall::AcquireImage(1)]
        );
    }

    #[test]
    fn test_out_of_date_while_minimized_stays_pending() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);

        probe.mark_out_of_date();
        driver.swap_buffers();
        assert!(driver.set_resize(0, 0).unwrap());
        assert!(driver.needs_swapchain_rebuild());

        assert!(driver.set_resize(800, 600).unwrap());
        assert!(!driver.needs_swapchain_rebuild());
        assert_eq!(probe.swapchain().map(|s| (s.width, s.height)), Some((800, 600)));
        assert_eq!(probe.acquired_image(), Some(0));
    }

    #[test]
    fn test_swapchain_failure_rolls_back() {
        let (mut driver, probe) = new_driver(HeadlessOptions {
            fail_swapchain: true,
            ..Default::default()
        });
        driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap();
        driver.init().unwrap();

        assert!(driver.set_video_mode(1920, 1080, true).is_err());
        assert_eq!(driver.state(), ContextState::Error);
        assert!(!probe.has_surface());
        assert!(!probe.has_instance());
        assert_eq!(probe.live_windows(), 0);
        assert!(!probe.display_mode_changed());
    }

    #[test]
    fn test_resize_failure_is_reported() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);

        probe.set_fail_swapchain(true);
        assert!(driver.set_resize(1280, 720).is_err());
        assert_eq!(driver.state(), ContextState::Ready);
        assert_eq!(driver.get_video_size(), (1920, 1080));
    }

    #[test]
    fn test_present_before_ready_is_noop() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap();
        driver.init().unwrap();
        probe.clear_calls();

        driver.swap_buffers();
        assert!(!driver.set_resize(640, 480).unwrap());
        assert!(probe.calls().is_empty());
        assert!(driver.get_context_data().is_none());
        assert_eq!(driver.get_flags(), FeatureFlags::empty());
    }

    #[test]
    fn test_flags_cannot_be_forced() {
        let (mut driver, _probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);
        driver.set_flags(FeatureFlags::ADAPTIVE_VSYNC | FeatureFlags::GL_CORE_CONTEXT);
        assert_eq!(driver.get_flags(), FeatureFlags::SHADERS_SLANG);
    }

    #[test]
    fn test_destroy_order_and_reset() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        ready(&mut driver);
        probe.clear_calls();

        driver.destroy();
        let calls = probe.calls();
        let pos = |pred: &dyn Fn(&PlatformCall) -> bool| calls.iter().position(|c| pred(c)).unwrap();
        let idle = pos(&|c| matches!(c, PlatformCall::WaitIdle));
        let swapchain = pos(&|c| matches!(c, PlatformCall::DestroySwapchain));
        let surface = pos(&|c| matches!(c, PlatformCall::DestroySurface));
        let instance = pos(&|c| matches!(c, PlatformCall::DestroyInstance));
        let window = pos(&|c| matches!(c, PlatformCall::DestroyWindow(_)));
        assert!(idle < swapchain && swapchain < surface && surface < instance && instance < window);

        driver.destroy();
        assert_eq!(driver.state(), ContextState::Destroyed);
        assert_eq!(driver.get_api(), ContextApi::None);
        assert_eq!(probe.count(|c| matches!(c, PlatformCall::DestroyWindow(_))), 1);
    }

    #[test]
    fn test_destroy_before_init() {
        let (mut driver, probe) = new_driver(HeadlessOptions::default());
        driver.destroy();
        assert_eq!(driver.state(), ContextState::Uninitialized);
        assert!(probe.calls().is_empty());

        ready(&mut driver);
        assert_eq!(driver.state(), ContextState::Ready);
    }

    #[test]
    fn test_bind_rejects_other_apis() {
        let (mut driver, _probe) = new_driver(HeadlessOptions::default());
        assert!(driver.bind_api(ContextApi::OpenGl, 3, 3).unwrap_err().is_config());
        assert_eq!(driver.state(), ContextState::Uninitialized);
    }

    #[test]
    fn test_instance_failure() {
        let (mut driver, probe) = new_driver(HeadlessOptions {
            fail_instance: true,
            ..Default::default()
        });
        driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap();
        assert!(driver.init().is_err());
        assert_eq!(driver.state(), ContextState::Error);
        assert_eq!(probe.live_windows(), 0);
    }
}
