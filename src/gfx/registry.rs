//! 驱动注册表
//!
//! 固定的表把后端标识映射到描述和工厂函数。前端在启动时按标识选择后端，
//! 得到一个 [`ContextDriver`]，之后所有调用都通过它分发到具体后端。

use tracing::{debug, info, warn};

use crate::core::error::{ConfigError, GraphicsError, Result};
use crate::gfx::api::{BackendDescriptor, ContextApi};
use crate::gfx::backend::{ContextData, GfxContext, VideoModeOutcome};
use crate::gfx::flags::FeatureFlags;
use crate::gfx::gdi::{self, GdiDriver};
use crate::gfx::gl::{self, GlDriver};
use crate::gfx::platform::{HeadlessOptions, HeadlessPlatform, PlatformKind, ProcAddress};
use crate::gfx::state::{ContextSettings, ContextState, DriverState};
use crate::gfx::surface::{DisplayMetric, WindowEvents};
use crate::gfx::vulkan::{self, VulkanDriver};

const LOG_TARGET: &str = "vid_ctx::registry";

/// 后端运行在哪个平台上
#[derive(Debug, Clone)]
pub enum PlatformSelection {
    Headless(HeadlessOptions),
    Winit,
}

impl PlatformSelection {
    pub fn kind(&self) -> PlatformKind {
        match self {
            PlatformSelection::Headless(_) => PlatformKind::Headless,
            PlatformSelection::Winit => PlatformKind::Winit,
        }
    }
}

impl From<PlatformKind> for PlatformSelection {
    fn from(kind: PlatformKind) -> Self {
        match kind {
            PlatformKind::Headless => PlatformSelection::Headless(HeadlessOptions::default()),
            PlatformKind::Winit => PlatformSelection::Winit,
        }
    }
}

/// 后端工厂
pub type DriverFactory = fn(PlatformSelection) -> Result<ContextDriver>;

/// 注册表中的一行
pub struct DriverEntry {
    pub descriptor: &'static BackendDescriptor,
    factory: DriverFactory,
}

impl DriverEntry {
    pub fn create(&self, platform: PlatformSelection) -> Result<ContextDriver> {
        (self.factory)(platform)
    }
}

/// 按优先级排列的已编译后端
pub static DRIVERS: &[DriverEntry] = &[
    DriverEntry {
        descriptor: &gl::DESCRIPTOR,
        factory: create_gl,
    },
    DriverEntry {
        descriptor: &vulkan::DESCRIPTOR,
        factory: create_vulkan,
    },
    DriverEntry {
        descriptor: &gdi::DESCRIPTOR,
        factory: create_gdi,
    },
];

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn unsupported_platform(ident: &'static str, platform: PlatformKind) -> ConfigError {
    ConfigError::UnsupportedPlatform {
        driver: ident,
        platform: platform.name().to_string(),
    }
}

fn create_gl(platform: PlatformSelection) -> Result<ContextDriver> {
    match platform {
        PlatformSelection::Headless(opts) => {
            Ok(ContextDriver::Gl(GlDriver::new(Box::new(HeadlessPlatform::new(opts)))))
        }
        #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
        PlatformSelection::Winit => {
            let platform = crate::gfx::platform::winit::WinitPlatform::new()?;
            Ok(ContextDriver::Gl(GlDriver::new(Box::new(platform))))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        PlatformSelection::Winit => Err(unsupported_platform(gl::DESCRIPTOR.ident, PlatformKind::Winit).into()),
    }
}

fn create_vulkan(platform: PlatformSelection) -> Result<ContextDriver> {
    match platform {
        PlatformSelection::Headless(opts) => {
            Ok(ContextDriver::Vulkan(VulkanDriver::new(Box::new(HeadlessPlatform::new(opts)))))
        }
        #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
        PlatformSelection::Winit => {
            let platform = crate::gfx::platform::winit::WinitPlatform::new()?;
            Ok(ContextDriver::Vulkan(VulkanDriver::new(Box::new(platform))))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        PlatformSelection::Winit => {
            Err(unsupported_platform(vulkan::DESCRIPTOR.ident, PlatformKind::Winit).into())
        }
    }
}

fn create_gdi(platform: PlatformSelection) -> Result<ContextDriver> {
    match platform {
        PlatformSelection::Headless(opts) => {
            Ok(ContextDriver::Gdi(GdiDriver::new(Box::new(HeadlessPlatform::new(opts)))))
        }
        #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
        PlatformSelection::Winit => {
            let platform = crate::gfx::platform::winit::WinitPlatform::new()?;
            Ok(ContextDriver::Gdi(GdiDriver::new(Box::new(platform))))
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        PlatformSelection::Winit => {
            Err(unsupported_platform(gdi::DESCRIPTOR.ident, PlatformKind::Winit).into())
        }
    }
}

/// 按标识查找
pub fn find(ident: &str) -> Option<&'static DriverEntry> {
    DRIVERS.iter().find(|entry| entry.descriptor.ident == ident)
}

/// 所有已编译后端的描述
pub fn list() -> impl Iterator<Item = &'static BackendDescriptor> {
    DRIVERS.iter().map(|entry| entry.descriptor)
}

/// 按标识创建后端
pub fn create(ident: &str, platform: impl Into<PlatformSelection>) -> Result<ContextDriver> {
    let entry = find(ident).ok_or_else(|| ConfigError::UnknownDriver(ident.to_string()))?;
    let platform = platform.into();
    info!(target: LOG_TARGET, platform = platform.kind().name(), "Creating context driver: {}", entry.descriptor.name);
    entry.create(platform)
}

/// 依次尝试每个后端，返回第一个能绑定 API 并完成 `init` 的
pub fn init_first(
    platform: impl Into<PlatformSelection>,
    settings: &ContextSettings,
    api: ContextApi,
    major: u32,
    minor: u32,
) -> Result<ContextDriver> {
    let platform = platform.into();

    for entry in DRIVERS {
        // API 不匹配的后端不会构造，避免无谓地创建平台资源
        if entry.descriptor.api != api {
            continue;
        }

        let mut driver = match entry.create(platform.clone()) {
            Ok(driver) => driver,
            Err(e) => {
                debug!(target: LOG_TARGET, "Skipping {}: {}", entry.descriptor.ident, e);
                continue;
            }
        };

        driver.configure(settings);
        if let Err(e) = driver.bind_api(api, major, minor) {
            debug!(target: LOG_TARGET, "{} rejected {} {}.{}: {}", entry.descriptor.ident, api.name(), major, minor, e);
            continue;
        }

        match driver.init() {
            Ok(()) => {
                info!(target: LOG_TARGET, "Found context driver: {}", entry.descriptor.ident);
                return Ok(driver);
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to initialize {}: {}", entry.descriptor.ident, e);
                driver.destroy();
            }
        }
    }

    Err(GraphicsError::ContextCreation(format!(
        "no context driver could be initialized for {} {}.{}",
        api.name(),
        major,
        minor
    ))
    .into())
}

/// 选中的后端
pub enum ContextDriver {
    Gl(GlDriver),
    Vulkan(VulkanDriver),
    Gdi(GdiDriver),
}

impl GfxContext for ContextDriver {
    fn descriptor(&self) -> &'static BackendDescriptor {
        match self {
            ContextDriver::Gl(d) => d.descriptor(),
            ContextDriver::Vulkan(d) => d.descriptor(),
            ContextDriver::Gdi(d) => d.descriptor(),
        }
    }

    fn driver_state(&self) -> &DriverState {
        match self {
            ContextDriver::Gl(d) => d.driver_state(),
            ContextDriver::Vulkan(d) => d.driver_state(),
            ContextDriver::Gdi(d) => d.driver_state(),
        }
    }

    fn driver_state_mut(&mut self) -> &mut DriverState {
        match self {
            ContextDriver::Gl(d) => d.driver_state_mut(),
            ContextDriver::Vulkan(d) => d.driver_state_mut(),
            ContextDriver::Gdi(d) => d.driver_state_mut(),
        }
    }

    fn state(&self) -> ContextState {
        match self {
            ContextDriver::Gl(d) => d.state(),
            ContextDriver::Vulkan(d) => d.state(),
            ContextDriver::Gdi(d) => d.state(),
        }
    }

    fn configure(&mut self, settings: &ContextSettings) {
        match self {
            ContextDriver::Gl(d) => d.configure(settings),
            ContextDriver::Vulkan(d) => d.configure(settings),
            ContextDriver::Gdi(d) => d.configure(settings),
        }
    }

    fn init(&mut self) -> Result<()> {
        match self {
            ContextDriver::Gl(d) => d.init(),
            ContextDriver::Vulkan(d) => d.init(),
            ContextDriver::Gdi(d) => d.init(),
        }
    }

    fn destroy(&mut self) {
        match self {
            ContextDriver::Gl(d) => d.destroy(),
            ContextDriver::Vulkan(d) => d.destroy(),
            ContextDriver::Gdi(d) => d.destroy(),
        }
    }

    fn get_api(&self) -> ContextApi {
        match self {
            ContextDriver::Gl(d) => d.get_api(),
            ContextDriver::Vulkan(d) => d.get_api(),
            ContextDriver::Gdi(d) => d.get_api(),
        }
    }

    fn bind_api(&mut self, api: ContextApi, major: u32, minor: u32) -> Result<()> {
        match self {
            ContextDriver::Gl(d) => d.bind_api(api, major, minor),
            ContextDriver::Vulkan(d) => d.bind_api(api, major, minor),
            ContextDriver::Gdi(d) => d.bind_api(api, major, minor),
        }
    }

    fn swap_interval(&mut self, interval: i32) {
        match self {
            ContextDriver::Gl(d) => d.swap_interval(interval),
            ContextDriver::Vulkan(d) => d.swap_interval(interval),
            ContextDriver::Gdi(d) => d.swap_interval(interval),
        }
    }

    fn set_video_mode(&mut self, width: u32, height: u32, fullscreen: bool) -> Result<VideoModeOutcome> {
        match self {
            ContextDriver::Gl(d) => d.set_video_mode(width, height, fullscreen),
            ContextDriver::Vulkan(d) => d.set_video_mode(width, height, fullscreen),
            ContextDriver::Gdi(d) => d.set_video_mode(width, height, fullscreen),
        }
    }

    fn get_video_size(&self) -> (u32, u32) {
        match self {
            ContextDriver::Gl(d) => d.get_video_size(),
            ContextDriver::Vulkan(d) => d.get_video_size(),
            ContextDriver::Gdi(d) => d.get_video_size(),
        }
    }

    fn get_refresh_rate(&self) -> Option<f32> {
        match self {
            ContextDriver::Gl(d) => d.get_refresh_rate(),
            ContextDriver::Vulkan(d) => d.get_refresh_rate(),
            ContextDriver::Gdi(d) => d.get_refresh_rate(),
        }
    }

    fn get_video_output_size(&self) -> Option<(u32, u32)> {
        match self {
            ContextDriver::Gl(d) => d.get_video_output_size(),
            ContextDriver::Vulkan(d) => d.get_video_output_size(),
            ContextDriver::Gdi(d) => d.get_video_output_size(),
        }
    }

    fn get_metrics(&self, metric: DisplayMetric) -> Option<f32> {
        match self {
            ContextDriver::Gl(d) => d.get_metrics(metric),
            ContextDriver::Vulkan(d) => d.get_metrics(metric),
            ContextDriver::Gdi(d) => d.get_metrics(metric),
        }
    }

    fn update_window_title(&mut self, title: &str) {
        match self {
            ContextDriver::Gl(d) => d.update_window_title(title),
            ContextDriver::Vulkan(d) => d.update_window_title(title),
            ContextDriver::Gdi(d) => d.update_window_title(title),
        }
    }

    fn check_window(&mut self) -> WindowEvents {
        match self {
            ContextDriver::Gl(d) => d.check_window(),
            ContextDriver::Vulkan(d) => d.check_window(),
            ContextDriver::Gdi(d) => d.check_window(),
        }
    }

    fn set_resize(&mut self, width: u32, height: u32) -> Result<bool> {
        match self {
            ContextDriver::Gl(d) => d.set_resize(width, height),
            ContextDriver::Vulkan(d) => d.set_resize(width, height),
            ContextDriver::Gdi(d) => d.set_resize(width, height),
        }
    }

    fn has_focus(&self) -> bool {
        match self {
            ContextDriver::Gl(d) => d.has_focus(),
            ContextDriver::Vulkan(d) => d.has_focus(),
            ContextDriver::Gdi(d) => d.has_focus(),
        }
    }

    fn suppress_screensaver(&mut self, enable: bool) -> bool {
        match self {
            ContextDriver::Gl(d) => d.suppress_screensaver(enable),
            ContextDriver::Vulkan(d) => d.suppress_screensaver(enable),
            ContextDriver::Gdi(d) => d.suppress_screensaver(enable),
        }
    }

    fn has_windowed(&self) -> bool {
        match self {
            ContextDriver::Gl(d) => d.has_windowed(),
            ContextDriver::Vulkan(d) => d.has_windowed(),
            ContextDriver::Gdi(d) => d.has_windowed(),
        }
    }

    fn swap_buffers(&mut self) {
        match self {
            ContextDriver::Gl(d) => d.swap_buffers(),
            ContextDriver::Vulkan(d) => d.swap_buffers(),
            ContextDriver::Gdi(d) => d.swap_buffers(),
        }
    }

    fn input_driver(&self, requested: &str) -> Option<&'static str> {
        match self {
            ContextDriver::Gl(d) => d.input_driver(requested),
            ContextDriver::Vulkan(d) => d.input_driver(requested),
            ContextDriver::Gdi(d) => d.input_driver(requested),
        }
    }

    fn get_proc_address(&self, symbol: &str) -> Option<ProcAddress> {
        match self {
            ContextDriver::Gl(d) => d.get_proc_address(symbol),
            ContextDriver::Vulkan(d) => d.get_proc_address(symbol),
            ContextDriver::Gdi(d) => d.get_proc_address(symbol),
        }
    }

    fn show_mouse(&mut self, visible: bool) {
        match self {
            ContextDriver::Gl(d) => d.show_mouse(visible),
            ContextDriver::Vulkan(d) => d.show_mouse(visible),
            ContextDriver::Gdi(d) => d.show_mouse(visible),
        }
    }

    fn get_flags(&self) -> FeatureFlags {
        match self {
            ContextDriver::Gl(d) => d.get_flags(),
            ContextDriver::Vulkan(d) => d.get_flags(),
            ContextDriver::Gdi(d) => d.get_flags(),
        }
    }

    fn set_flags(&mut self, flags: FeatureFlags) {
        match self {
            ContextDriver::Gl(d) => d.set_flags(flags),
            ContextDriver::Vulkan(d) => d.set_flags(flags),
            ContextDriver::Gdi(d) => d.set_flags(flags),
        }
    }

    fn bind_hw_render(&mut self, enable: bool) {
        match self {
            ContextDriver::Gl(d) => d.bind_hw_render(enable),
            ContextDriver::Vulkan(d) => d.bind_hw_render(enable),
            ContextDriver::Gdi(d) => d.bind_hw_render(enable),
        }
    }

    fn get_context_data(&self) -> Option<ContextData> {
        match self {
            ContextDriver::Gl(d) => d.get_context_data(),
            ContextDriver::Vulkan(d) => d.get_context_data(),
            ContextDriver::Gdi(d) => d.get_context_data(),
        }
    }
}

impl Drop for ContextDriver {
    fn drop(&mut self) {
        if self.state().holds_resources() {
            debug!(target: LOG_TARGET, "Context driver dropped while live, destroying");
            self.destroy();
        }
    }
}
