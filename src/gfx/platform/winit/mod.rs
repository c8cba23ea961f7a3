//! winit 窗口 + wgpu 表面 + glutin 上下文
//!
//! 窗口由 winit 创建，交换链用 wgpu 表面表达：`configure` 对应创建交换链，
//! `get_current_texture` 对应获取图像。GL 上下文原语由 [`gl`] 子模块基于 glutin 实现。
//! 调用方拥有事件循环，`poll_events` 通过 `pump_events` 非阻塞地取出积压的事件。

mod gl;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowBuilder};

use crate::core::error::{GraphicsError, Result};
use crate::gfx::present::PresentMode;
use crate::gfx::surface::{DisplayMetric, WindowEvents};

use super::{
    NativeDrawable, NativeWindow, PixelFormat, SwapchainInfo, SwapchainPlatform, WindowDesc,
    WindowSystem,
};

use self::gl::GlState;

const LOG_TARGET: &str = "vid_ctx::winit";

/// 呈现队列的最大帧延迟，交换链图像数为它加一
const FRAME_LATENCY: u32 = 2;

/// 表面、适配器和设备
struct GpuSurface {
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    _queue: wgpu::Queue,
    config: Option<wgpu::SurfaceConfiguration>,
}

/// winit 平台
pub struct WinitPlatform {
    // 字段按声明顺序释放：GL 和 wgpu 资源先于窗口
    gl: GlState,
    frame: Option<wgpu::SurfaceTexture>,
    gpu: Option<GpuSurface>,
    instance: Option<wgpu::Instance>,
    window: Option<(NativeWindow, Arc<Window>)>,
    event_loop: EventLoop<()>,
    next_window_id: u64,
    focused: bool,
    /// 当前图像来自次优的表面，呈现之后需要重建
    suboptimal: bool,
    next_image: u32,
}

impl WinitPlatform {
    pub fn new() -> Result<Self> {
        let event_loop = EventLoop::new()
            .map_err(|e| GraphicsError::WindowCreation(format!("Failed to create event loop: {}", e)))?;

        Ok(Self {
            event_loop,
            window: None,
            next_window_id: 1,
            focused: true,
            instance: None,
            gpu: None,
            frame: None,
            suboptimal: false,
            next_image: 0,
            gl: GlState::default(),
        })
    }

    fn window(&self, handle: NativeWindow) -> Option<&Arc<Window>> {
        self.window
            .as_ref()
            .filter(|(id, _)| *id == handle)
            .map(|(_, window)| window)
    }

    fn image_count() -> u32 {
        FRAME_LATENCY + 1
    }
}

/// 获取表面图像失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireErrorAction {
    /// 交换链过期，由驱动标记并重建
    Rebuild,
    /// 丢弃这一帧
    DropFrame,
    Fatal,
}

fn acquire_error_action(err: &wgpu::SurfaceError) -> AcquireErrorAction {
    match err {
        wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost => AcquireErrorAction::Rebuild,
        wgpu::SurfaceError::Timeout => AcquireErrorAction::DropFrame,
        wgpu::SurfaceError::OutOfMemory => AcquireErrorAction::Fatal,
    }
}

fn to_wgpu_mode(mode: PresentMode) -> wgpu::PresentMode {
    match mode {
        PresentMode::Immediate => wgpu::PresentMode::Immediate,
        PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
        PresentMode::Fifo => wgpu::PresentMode::Fifo,
        PresentMode::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
    }
}

fn from_wgpu_mode(mode: wgpu::PresentMode) -> Option<PresentMode> {
    match mode {
        wgpu::PresentMode::Immediate => Some(PresentMode::Immediate),
        wgpu::PresentMode::Mailbox => Some(PresentMode::Mailbox),
        wgpu::PresentMode::Fifo => Some(PresentMode::Fifo),
        wgpu::PresentMode::FifoRelaxed => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

impl WindowSystem for WinitPlatform {
    fn name(&self) -> &'static str {
        "winit"
    }

    fn create_window(&mut self, desc: &WindowDesc) -> Result<NativeWindow> {
        if self.window.is_some() {
            return Err(GraphicsError::AlreadyInitialized.into());
        }

        let window = WindowBuilder::new()
            .with_title(desc.title.as_str())
            .with_inner_size(LogicalSize::new(desc.width, desc.height))
            .with_resizable(desc.resizable)
            .build(&self.event_loop)
            .map_err(|e| GraphicsError::WindowCreation(e.to_string()))?;

        let handle = NativeWindow(self.next_window_id);
        self.next_window_id += 1;
        self.window = Some((handle, Arc::new(window)));
        self.focused = true;

        debug!(target: LOG_TARGET, "Window created: {:?}", handle);
        Ok(handle)
    }

    fn destroy_window(&mut self, window: NativeWindow) {
        if self.window(window).is_some() {
            self.gl.forget_window(NativeDrawable(window.0));
            self.window = None;
            debug!(target: LOG_TARGET, "Window destroyed: {:?}", window);
        }
    }

    fn acquire_drawable(&mut self, window: NativeWindow) -> Result<NativeDrawable> {
        // winit 没有设备上下文，用窗口身份代替
        self.window(window)
            .map(|_| NativeDrawable(window.0))
            .ok_or_else(|| GraphicsError::WindowCreation("window is not alive".to_string()).into())
    }

    fn release_drawable(&mut self, _window: NativeWindow, drawable: NativeDrawable) {
        self.gl.forget_window(drawable);
    }

    fn set_pixel_format(&mut self, drawable: NativeDrawable, format: &PixelFormat) -> Result<()> {
        if !format.support_opengl {
            trace!(target: LOG_TARGET, ?drawable, ?format, "Pixel format is managed by the compositor");
            return Ok(());
        }
        self.choose_gl_config(drawable, format)
    }

    fn apply_video_mode(
        &mut self,
        window: NativeWindow,
        width: u32,
        height: u32,
        fullscreen: bool,
    ) -> Result<bool> {
        let window = self
            .window(window)
            .ok_or_else(|| GraphicsError::DisplayMode("window is not alive".to_string()))?;

        if !fullscreen {
            window.set_fullscreen(None);
            let _ = window.request_inner_size(PhysicalSize::new(width, height));
            return Ok(false);
        }

        let exclusive = window.current_monitor().and_then(|monitor| {
            monitor
                .video_modes()
                .find(|mode| mode.size() == PhysicalSize::new(width, height))
        });

        match exclusive {
            Some(mode) => {
                info!(target: LOG_TARGET, "Switching to exclusive fullscreen {}x{}", width, height);
                window.set_fullscreen(Some(Fullscreen::Exclusive(mode)));
                Ok(true)
            }
            None => {
                warn!(target: LOG_TARGET, "No {}x{} video mode, using borderless fullscreen", width, height);
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                Ok(false)
            }
        }
    }

    fn restore_display_mode(&mut self) {
        if let Some((_, window)) = &self.window {
            window.set_fullscreen(None);
        }
    }

    fn monitor_resolution(&self) -> (u32, u32) {
        self.window
            .as_ref()
            .and_then(|(_, window)| window.current_monitor())
            .or_else(|| self.event_loop.primary_monitor())
            .map(|monitor| {
                let size = monitor.size();
                (size.width, size.height)
            })
            .unwrap_or((0, 0))
    }

    fn refresh_rate(&self) -> Option<f32> {
        let (_, window) = self.window.as_ref()?;
        let millihertz = window.current_monitor()?.refresh_rate_millihertz()?;
        Some(millihertz as f32 / 1000.0)
    }

    fn metric(&self, metric: DisplayMetric) -> Option<f32> {
        let (_, window) = self.window.as_ref()?;
        match metric {
            DisplayMetric::Dpi => Some((window.scale_factor() * 96.0) as f32),
            // winit 不提供显示器的物理尺寸
            DisplayMetric::MmWidth | DisplayMetric::MmHeight => None,
        }
    }

    fn poll_events(&mut self, window: NativeWindow) -> WindowEvents {
        let mut events = WindowEvents::default();
        if self.window(window).is_none() {
            return events;
        }

        let mut focused = self.focused;
        let status = self
            .event_loop
            .pump_events(Some(Duration::ZERO), |event, _target| {
                if let Event::WindowEvent { event, .. } = event {
                    match event {
                        WindowEvent::CloseRequested => events.quit = true,
                        WindowEvent::Resized(size) => {
                            events.resize = true;
                            events.width = size.width;
                            events.height = size.height;
                        }
                        WindowEvent::Focused(state) => focused = state,
                        _ => (),
                    }
                }
            });
        self.focused = focused;

        if events.resize {
            self.resize_gl_surface(events.width, events.height);
        }

        if let PumpStatus::Exit(code) = status {
            debug!(target: LOG_TARGET, "Event loop exited with code {}", code);
            events.quit = true;
        }
        events
    }

    fn set_title(&mut self, window: NativeWindow, title: &str) {
        if let Some(window) = self.window(window) {
            window.set_title(title);
        }
    }

    fn has_focus(&self, window: NativeWindow) -> bool {
        self.window(window).is_some() && self.focused
    }

    fn suppress_screensaver(&mut self, _enable: bool) -> bool {
        false
    }

    fn show_cursor(&mut self, window: NativeWindow, visible: bool) {
        if let Some(window) = self.window(window) {
            window.set_cursor_visible(visible);
        }
    }

    fn swap_buffers(&mut self, drawable: NativeDrawable) {
        // 没有 GL 表面时由合成器负责呈现
        if !self.swap_gl_surface(drawable) {
            trace!(target: LOG_TARGET, ?drawable, "swap_buffers");
        }
    }

    fn input_drivers(&self) -> &'static [&'static str] {
        &["winit"]
    }
}

impl SwapchainPlatform for WinitPlatform {
    fn create_instance(&mut self) -> Result<()> {
        debug!(target: LOG_TARGET, "Creating wgpu instance");
        self.instance = Some(wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN | wgpu::Backends::METAL | wgpu::Backends::DX12,
            dx12_shader_compiler: Default::default(),
            flags: wgpu::InstanceFlags::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        }));
        Ok(())
    }

    fn destroy_instance(&mut self) {
        self.instance = None;
    }

    fn create_surface(&mut self, window: NativeWindow) -> Result<()> {
        let window = self
            .window(window)
            .cloned()
            .ok_or_else(|| GraphicsError::SurfaceCreation("window is not alive".to_string()))?;
        let instance = self
            .instance
            .as_ref()
            .ok_or_else(|| GraphicsError::SurfaceCreation("instance not created".to_string()))?;

        let surface = instance
            .create_surface(window)
            .map_err(|e| GraphicsError::SurfaceCreation(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| GraphicsError::SurfaceCreation("Failed to find suitable adapter".to_string()))?;

        info!(target: LOG_TARGET, "Selected adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("vid_ctx device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| GraphicsError::SurfaceCreation(format!("Failed to create device: {}", e)))?;

        self.gpu = Some(GpuSurface {
            surface,
            adapter,
            device,
            _queue: queue,
            config: None,
        });
        Ok(())
    }

    fn destroy_surface(&mut self) {
        self.frame = None;
        self.gpu = None;
    }

    fn supported_present_modes(&self) -> Vec<PresentMode> {
        match &self.gpu {
            Some(gpu) => gpu
                .surface
                .get_capabilities(&gpu.adapter)
                .present_modes
                .into_iter()
                .filter_map(from_wgpu_mode)
                .collect(),
            None => Vec::new(),
        }
    }

    fn create_swapchain(
        &mut self,
        width: u32,
        height: u32,
        mode: PresentMode,
        recreate: bool,
    ) -> Result<SwapchainInfo> {
        let gpu = self
            .gpu
            .as_mut()
            .ok_or_else(|| GraphicsError::SwapchainError("surface not created".to_string()))?;

        let present_mode = to_wgpu_mode(mode);
        let unchanged = !recreate
            && gpu
                .config
                .as_ref()
                .map_or(false, |c| c.width == width && c.height == height && c.present_mode == present_mode);

        // 最小化时尺寸为 0，保留旧交换链
        if width == 0 || height == 0 || unchanged {
            let (width, height, present_mode) = gpu
                .config
                .as_ref()
                .map(|c| (c.width, c.height, from_wgpu_mode(c.present_mode).unwrap_or(mode)))
                .unwrap_or((width, height, mode));
            return Ok(SwapchainInfo {
                created_new: false,
                width,
                height,
                image_count: Self::image_count(),
                present_mode,
            });
        }

        let caps = gpu.surface.get_capabilities(&gpu.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| matches!(f, wgpu::TextureFormat::Bgra8UnormSrgb | wgpu::TextureFormat::Rgba8UnormSrgb))
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| GraphicsError::SwapchainError("surface reports no formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: FRAME_LATENCY,
        };

        // 配置表面之前必须归还已获取的图像
        self.frame = None;
        self.suboptimal = false;
        gpu.surface.configure(&gpu.device, &config);
        gpu.config = Some(config);
        self.next_image = 0;
        debug!(target: LOG_TARGET, width, height, ?present_mode, recreate, "Surface configured");

        Ok(SwapchainInfo {
            created_new: true,
            width,
            height,
            image_count: Self::image_count(),
            present_mode: mode,
        })
    }

    fn destroy_swapchain(&mut self) {
        self.frame = None;
        self.suboptimal = false;
        if let Some(gpu) = &mut self.gpu {
            gpu.config = None;
        }
    }

    fn acquire_next_image(&mut self) -> Result<Option<u32>> {
        // 同一时刻只能持有一张表面图像，没呈现的直接丢弃
        self.frame = None;
        self.suboptimal = false;

        let gpu = self
            .gpu
            .as_ref()
            .ok_or_else(|| GraphicsError::SwapchainError("surface not created".to_string()))?;

        let frame = match gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(e) => {
                return match acquire_error_action(&e) {
                    AcquireErrorAction::Rebuild => {
                        debug!(target: LOG_TARGET, "Surface needs reconfiguring: {}", e);
                        Ok(None)
                    }
                    AcquireErrorAction::DropFrame => {
                        warn!(target: LOG_TARGET, "Timed out acquiring surface texture");
                        Ok(None)
                    }
                    AcquireErrorAction::Fatal => Err(GraphicsError::SwapchainError(e.to_string()).into()),
                };
            }
        };

        // 次优的图像仍然可以呈现，呈现时再报告过期
        self.suboptimal = frame.suboptimal;
        self.frame = Some(frame);
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % Self::image_count();
        Ok(Some(index))
    }

    fn present(&mut self, image_index: u32) -> Result<bool> {
        match self.frame.take() {
            Some(frame) => {
                frame.present();
                Ok(!std::mem::take(&mut self.suboptimal))
            }
            None => Err(GraphicsError::Present(format!("image {} was not acquired", image_index)).into()),
        }
    }

    fn wait_idle(&mut self) {
        if let Some(gpu) = &self.gpu {
            let _ = gpu.device.poll(wgpu::Maintain::Wait);
        }
    }
}
