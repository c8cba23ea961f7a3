//! 进程内模拟平台
//!
//! 不依赖窗口系统和 GPU，按确定的规则模拟窗口、GL 上下文和交换链，
//! 并按顺序记录每一次平台调用。测试通过 [`HeadlessProbe`] 观察调用顺序、
//! 存活资源和下发给"操作系统"的交换间隔，也可以注入窗口事件和故障。

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::rc::Rc;

use tracing::trace;

use crate::core::error::{GraphicsError, Result};
use crate::gfx::api::ContextAttribs;
use crate::gfx::platform::{
    GlContextId, GlPlatform, NativeDrawable, NativeWindow, PixelFormat, ProcAddress, SwapchainInfo,
    SwapchainPlatform, WindowDesc, WindowSystem,
};
use crate::gfx::present::PresentMode;
use crate::gfx::surface::{DisplayMetric, WindowEvents};

/// 模拟平台的能力和故障注入选项
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    /// 显示器分辨率
    pub monitor: (u32, u32),
    pub refresh_rate: f32,
    pub dpi: f32,
    /// 扩展字符串
    pub extensions: String,
    /// 是否能解析到 `wglCreateContextAttribsARB`
    pub has_create_context_attribs: bool,
    /// 是否能解析到 `wglSwapIntervalEXT`
    pub has_swap_interval: bool,
    /// 是否能解析到 `wglGetExtensionsStringARB`
    pub has_extensions_string: bool,
    /// 表面支持的呈现模式
    pub present_modes: Vec<PresentMode>,
    pub swapchain_images: u32,
    pub fail_window: bool,
    pub fail_pixel_format: bool,
    pub fail_display_mode: bool,
    pub fail_context: bool,
    /// 已有上下文时，再创建上下文失败
    pub fail_shared_context: bool,
    pub fail_share_lists: bool,
    pub fail_attribs_context: bool,
    pub fail_make_current: bool,
    pub fail_swap_interval: bool,
    pub fail_instance: bool,
    pub fail_surface: bool,
    pub fail_swapchain: bool,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            monitor: (1920, 1080),
            refresh_rate: 60.0,
            dpi: 96.0,
            extensions: "WGL_ARB_extensions_string WGL_ARB_pixel_format WGL_ARB_create_context \
                         WGL_ARB_create_context_profile WGL_EXT_swap_control"
                .to_string(),
            has_create_context_attribs: true,
            has_swap_interval: true,
            has_extensions_string: true,
            present_modes: vec![PresentMode::Immediate, PresentMode::Mailbox, PresentMode::Fifo],
            swapchain_images: 3,
            fail_window: false,
            fail_pixel_format: false,
            fail_display_mode: false,
            fail_context: false,
            fail_shared_context: false,
            fail_share_lists: false,
            fail_attribs_context: false,
            fail_make_current: false,
            fail_swap_interval: false,
            fail_instance: false,
            fail_surface: false,
            fail_swapchain: false,
        }
    }
}

/// 记录下来的平台调用
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    CreateWindow(NativeWindow),
    DestroyWindow(NativeWindow),
    AcquireDrawable(NativeDrawable),
    ReleaseDrawable(NativeDrawable),
    SetPixelFormat(PixelFormat),
    ApplyVideoMode { width: u32, height: u32, fullscreen: bool },
    RestoreDisplayMode,
    SetTitle(String),
    ShowCursor(bool),
    SwapBuffers(NativeDrawable),
    OpenLibrary,
    CloseLibrary,
    CreateContext(GlContextId),
    CreateContextAttribs { context: GlContextId, share: Option<GlContextId>, attribs: ContextAttribs },
    ShareLists(GlContextId, GlContextId),
    MakeCurrent(Option<GlContextId>),
    DeleteContext(GlContextId),
    Finish,
    SetSwapInterval(i32),
    CreateInstance,
    DestroyInstance,
    CreateSurface,
    DestroySurface,
    CreateSwapchain { width: u32, height: u32, mode: PresentMode, recreate: bool },
    DestroySwapchain,
    AcquireImage(u32),
    Present(u32),
    WaitIdle,
}

#[derive(Debug, Clone, Copy)]
enum HeadlessEvent {
    Resize(u32, u32),
    Close,
    Focus(bool),
}

#[derive(Debug)]
struct HeadlessState {
    opts: HeadlessOptions,
    next_id: u64,
    windows: HashSet<NativeWindow>,
    drawables: HashSet<NativeDrawable>,
    contexts: HashSet<GlContextId>,
    current: Option<GlContextId>,
    window_size: (u32, u32),
    display_mode_changed: bool,
    library_open: bool,
    swap_interval: Option<i32>,
    instance: bool,
    surface: bool,
    swapchain: Option<SwapchainInfo>,
    next_image: u32,
    acquired: Option<u32>,
    out_of_date: bool,
    suboptimal: bool,
    events: VecDeque<HeadlessEvent>,
    focused: bool,
    title: String,
    cursor_visible: bool,
    screensaver_suppressed: bool,
    calls: Vec<PlatformCall>,
}

impl HeadlessState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, call: PlatformCall) {
        trace!(?call, "Headless platform call");
        self.calls.push(call);
    }
}

/// 模拟平台
pub struct HeadlessPlatform {
    inner: Rc<RefCell<HeadlessState>>,
}

/// 观察和操纵模拟平台的句柄
#[derive(Clone)]
pub struct HeadlessProbe {
    inner: Rc<RefCell<HeadlessState>>,
}

impl HeadlessPlatform {
    pub fn new(opts: HeadlessOptions) -> Self {
        let state = HeadlessState {
            opts,
            next_id: 0,
            windows: HashSet::new(),
            drawables: HashSet::new(),
            contexts: HashSet::new(),
            current: None,
            window_size: (0, 0),
            display_mode_changed: false,
            library_open: false,
            swap_interval: None,
            instance: false,
            surface: false,
            swapchain: None,
            next_image: 0,
            acquired: None,
            out_of_date: false,
            suboptimal: false,
            events: VecDeque::new(),
            focused: true,
            title: String::new(),
            cursor_visible: true,
            screensaver_suppressed: false,
            calls: Vec::new(),
        };

        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    /// 获取观察句柄（与平台共享同一份状态）
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl HeadlessProbe {
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.inner.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    pub fn live_windows(&self) -> usize {
        self.inner.borrow().windows.len()
    }

    pub fn live_drawables(&self) -> usize {
        self.inner.borrow().drawables.len()
    }

    pub fn live_contexts(&self) -> usize {
        self.inner.borrow().contexts.len()
    }

    pub fn current_context(&self) -> Option<GlContextId> {
        self.inner.borrow().current
    }

    /// 最近一次下发给"操作系统"的交换间隔
    pub fn last_swap_interval(&self) -> Option<i32> {
        self.inner.borrow().swap_interval
    }

    pub fn display_mode_changed(&self) -> bool {
        self.inner.borrow().display_mode_changed
    }

    pub fn library_open(&self) -> bool {
        self.inner.borrow().library_open
    }

    pub fn has_instance(&self) -> bool {
        self.inner.borrow().instance
    }

    pub fn has_surface(&self) -> bool {
        self.inner.borrow().surface
    }

    pub fn swapchain(&self) -> Option<SwapchainInfo> {
        self.inner.borrow().swapchain
    }

    pub fn acquired_image(&self) -> Option<u32> {
        self.inner.borrow().acquired
    }

    pub fn title(&self) -> String {
        self.inner.borrow().title.clone()
    }

    pub fn cursor_visible(&self) -> bool {
        self.inner.borrow().cursor_visible
    }

    pub fn screensaver_suppressed(&self) -> bool {
        self.inner.borrow().screensaver_suppressed
    }

    /// 统计满足条件的调用次数
    pub fn count(&self, pred: impl Fn(&PlatformCall) -> bool) -> usize {
        self.inner.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    /// 模拟用户拖动窗口边缘
    pub fn push_resize(&self, width: u32, height: u32) {
        self.inner.borrow_mut().events.push_back(HeadlessEvent::Resize(width, height));
    }

    /// 模拟用户关闭窗口
    pub fn push_close(&self) {
        self.inner.borrow_mut().events.push_back(HeadlessEvent::Close);
    }

    pub fn push_focus(&self, focused: bool) {
        self.inner.borrow_mut().events.push_back(HeadlessEvent::Focus(focused));
    }

    /// 让当前交换链过期，直到产生新的交换链之前获取图像都会失败
    pub fn mark_out_of_date(&self) {
        self.inner.borrow_mut().out_of_date = true;
    }

    pub fn set_fail_swapchain(&self, fail: bool) {
        self.inner.borrow_mut().opts.fail_swapchain = fail;
    }

    /// 让当前交换链变为次优：仍能获取图像，但呈现之后报告需要重建
    pub fn mark_suboptimal(&self) {
        self.inner.borrow_mut().suboptimal = true;
    }

    pub fn is_out_of_date(&self) -> bool {
        self.inner.borrow().out_of_date
    }
}

fn fake_address(symbol: &str) -> Option<ProcAddress> {
    let hash = symbol
        .bytes()
        .fold(0x1000usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    NonZeroUsize::new(hash | 1).map(ProcAddress)
}

impl WindowSystem for HeadlessPlatform {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_window(&mut self, desc: &WindowDesc) -> Result<NativeWindow> {
        let mut s = self.inner.borrow_mut();
        if s.opts.fail_window {
            return Err(GraphicsError::WindowCreation("injected failure".into()).into());
        }
        if !s.windows.is_empty() {
            return Err(GraphicsError::AlreadyInitialized.into());
        }

        let window = NativeWindow(s.alloc_id());
        s.windows.insert(window);
        s.window_size = (desc.width, desc.height);
        s.title = desc.title.clone();
        s.record(PlatformCall::CreateWindow(window));
        Ok(window)
    }

    fn destroy_window(&mut self, window: NativeWindow) {
        let mut s = self.inner.borrow_mut();
        s.windows.remove(&window);
        s.events.clear();
        s.record(PlatformCall::DestroyWindow(window));
    }

    fn acquire_drawable(&mut self, window: NativeWindow) -> Result<NativeDrawable> {
        let mut s = self.inner.borrow_mut();
        if !s.windows.contains(&window) {
            return Err(GraphicsError::WindowCreation("no such window".into()).into());
        }

        let drawable = NativeDrawable(s.alloc_id());
        s.drawables.insert(drawable);
        s.record(PlatformCall::AcquireDrawable(drawable));
        Ok(drawable)
    }

    fn release_drawable(&mut self, _window: NativeWindow, drawable: NativeDrawable) {
        let mut s = self.inner.borrow_mut();
        s.drawables.remove(&drawable);
        s.record(PlatformCall::ReleaseDrawable(drawable));
    }

    fn set_pixel_format(&mut self, _drawable: NativeDrawable, format: &PixelFormat) -> Result<()> {
        let mut s = self.inner.borrow_mut();
        if s.opts.fail_pixel_format {
            return Err(GraphicsError::WindowCreation("no matching pixel format".into()).into());
        }
        s.record(PlatformCall::SetPixelFormat(*format));
        Ok(())
    }

    fn apply_video_mode(
        &mut self,
        window: NativeWindow,
        width: u32,
        height: u32,
        fullscreen: bool,
    ) -> Result<bool> {
        let mut s = self.inner.borrow_mut();
        if s.opts.fail_display_mode || !s.windows.contains(&window) {
            return Err(GraphicsError::DisplayMode(format!("{}x{} rejected", width, height)).into());
        }

        s.window_size = (width, height);
        s.record(PlatformCall::ApplyVideoMode { width, height, fullscreen });
        if fullscreen {
            s.display_mode_changed = true;
        }
        Ok(fullscreen)
    }

    fn restore_display_mode(&mut self) {
        let mut s = self.inner.borrow_mut();
        s.display_mode_changed = false;
        s.record(PlatformCall::RestoreDisplayMode);
    }

    fn monitor_resolution(&self) -> (u32, u32) {
        self.inner.borrow().opts.monitor
    }

    fn refresh_rate(&self) -> Option<f32> {
        Some(self.inner.borrow().opts.refresh_rate)
    }

    fn metric(&self, metric: DisplayMetric) -> Option<f32> {
        let s = self.inner.borrow();
        let dpi = s.opts.dpi;
        let (w, h) = s.opts.monitor;
        Some(match metric {
            DisplayMetric::MmWidth => w as f32 / dpi * 25.4,
            DisplayMetric::MmHeight => h as f32 / dpi * 25.4,
            DisplayMetric::Dpi => dpi,
        })
    }

    fn poll_events(&mut self, window: NativeWindow) -> WindowEvents {
        let mut s = self.inner.borrow_mut();
        let mut events = WindowEvents::default();
        if !s.windows.contains(&window) {
            return events;
        }

        while let Some(event) = s.events.pop_front() {
            match event {
                HeadlessEvent::Resize(width, height) => {
                    s.window_size = (width, height);
                    events.resize = true;
                }
                HeadlessEvent::Close => events.quit = true,
                HeadlessEvent::Focus(focused) => s.focused = focused,
            }
        }

        (events.width, events.height) = s.window_size;
        events
    }

    fn set_title(&mut self, _window: NativeWindow, title: &str) {
        let mut s = self.inner.borrow_mut();
        s.title = title.to_string();
        s.record(PlatformCall::SetTitle(title.to_string()));
    }

    fn has_focus(&self, window: NativeWindow) -> bool {
        let s = self.inner.borrow();
        s.windows.contains(&window) && s.focused
    }

    fn suppress_screensaver(&mut self, enable: bool) -> bool {
        self.inner.borrow_mut().screensaver_suppressed = enable;
        true
    }

    fn show_cursor(&mut self, _window: NativeWindow, visible: bool) {
        let mut s = self.inner.borrow_mut();
        s.cursor_visible = visible;
        s.record(PlatformCall::ShowCursor(visible));
    }

    fn swap_buffers(&mut self, drawable: NativeDrawable) {
        self.inner.borrow_mut().record(PlatformCall::SwapBuffers(drawable));
    }

    fn input_drivers(&self) -> &'static [&'static str] {
        &["headless"]
    }
}

impl GlPlatform for HeadlessPlatform {
    fn open_library(&mut self) -> bool {
        let mut s = self.inner.borrow_mut();
        s.library_open = true;
        s.record(PlatformCall::OpenLibrary);
        true
    }

    fn close_library(&mut self) {
        let mut s = self.inner.borrow_mut();
        s.library_open = false;
        s.record(PlatformCall::CloseLibrary);
    }

    fn get_proc_address(&self, symbol: &str) -> Option<ProcAddress> {
        let s = self.inner.borrow();
        let found = match symbol {
            "wglCreateContextAttribsARB" => s.opts.has_create_context_attribs,
            "wglSwapIntervalEXT" => s.opts.has_swap_interval,
            "wglGetExtensionsStringARB" => s.opts.has_extensions_string,
            other => other.starts_with("gl") && s.library_open,
        };
        if found {
            fake_address(symbol)
        } else {
            None
        }
    }

    fn create_context(&mut self, drawable: NativeDrawable) -> Result<GlContextId> {
        let mut s = self.inner.borrow_mut();
        if s.opts.fail_context || (s.opts.fail_shared_context && !s.contexts.is_empty()) {
            return Err(GraphicsError::ContextCreation("injected failure".into()).into());
        }
        if !s.drawables.contains(&drawable) {
            return Err(GraphicsError::ContextCreation("invalid drawable".into()).into());
        }

        let context = GlContextId(s.alloc_id());
        s.contexts.insert(context);
        s.record(PlatformCall::CreateContext(context));
        Ok(context)
    }

    fn create_context_attribs(
        &mut self,
        drawable: NativeDrawable,
        share: Option<GlContextId>,
        attribs: &ContextAttribs,
    ) -> Result<GlContextId> {
        let mut s = self.inner.borrow_mut();
        if !s.opts.has_create_context_attribs {
            return Err(GraphicsError::ContextCreation("entry point not available".into()).into());
        }
        if s.opts.fail_attribs_context || (share.is_some() && s.opts.fail_shared_context) {
            return Err(GraphicsError::ContextCreation("injected failure".into()).into());
        }
        if !s.drawables.contains(&drawable) {
            return Err(GraphicsError::ContextCreation("invalid drawable".into()).into());
        }

        let context = GlContextId(s.alloc_id());
        s.contexts.insert(context);
        s.record(PlatformCall::CreateContextAttribs {
            context,
            share,
            attribs: *attribs,
        });
        Ok(context)
    }

    fn share_lists(&mut self, primary: GlContextId, shared: GlContextId) -> bool {
        let mut s = self.inner.borrow_mut();
        s.record(PlatformCall::ShareLists(primary, shared));
        !s.opts.fail_share_lists && s.contexts.contains(&primary) && s.contexts.contains(&shared)
    }

    fn make_current(&mut self, binding: Option<(NativeDrawable, GlContextId)>) -> bool {
        let mut s = self.inner.borrow_mut();
        let context = binding.map(|(_, ctx)| ctx);
        s.record(PlatformCall::MakeCurrent(context));

        match binding {
            None => {
                s.current = None;
                true
            }
            Some((drawable, ctx)) => {
                if s.opts.fail_make_current
                    || !s.contexts.contains(&ctx)
                    || !s.drawables.contains(&drawable)
                {
                    return false;
                }
                s.current = Some(ctx);
                true
            }
        }
    }

    fn delete_context(&mut self, context: GlContextId) {
        let mut s = self.inner.borrow_mut();
        s.contexts.remove(&context);
        if s.current == Some(context) {
            s.current = None;
        }
        s.record(PlatformCall::DeleteContext(context));
    }

    fn finish(&mut self) {
        self.inner.borrow_mut().record(PlatformCall::Finish);
    }

    fn set_swap_interval(&mut self, interval: i32) -> bool {
        let mut s = self.inner.borrow_mut();
        s.record(PlatformCall::SetSwapInterval(interval));
        if s.opts.fail_swap_interval {
            return false;
        }
        s.swap_interval = Some(interval);
        true
    }

    fn extensions_string(&self, drawable: NativeDrawable) -> Option<String> {
        let s = self.inner.borrow();
        (s.opts.has_extensions_string && s.drawables.contains(&drawable))
            .then(|| s.opts.extensions.clone())
    }
}

impl SwapchainPlatform for HeadlessPlatform {
    fn create_instance(&mut self) -> Result<()> {
        let mut s = self.inner.borrow_mut();
        if s.opts.fail_instance {
            return Err(GraphicsError::ContextCreation("no Vulkan instance".into()).into());
        }
        s.instance = true;
        s.record(PlatformCall::CreateInstance);
        Ok(())
    }

    fn destroy_instance(&mut self) {
        let mut s = self.inner.borrow_mut();
        s.instance = false;
        s.record(PlatformCall::DestroyInstance);
    }

    fn create_surface(&mut self, window: NativeWindow) -> Result<()> {
        let mut s = self.inner.borrow_mut();
        if s.opts.fail_surface || !s.instance || !s.windows.contains(&window) {
            return Err(GraphicsError::SurfaceCreation("injected failure".into()).into());
        }
        s.surface = true;
        s.record(PlatformCall::CreateSurface);
        Ok(())
    }

    fn destroy_surface(&mut self) {
        let mut s = self.inner.borrow_mut();
        s.surface = false;
        s.record(PlatformCall::DestroySurface);
    }

    fn supported_present_modes(&self) -> Vec<PresentMode> {
        self.inner.borrow().opts.present_modes.clone()
    }

    fn create_swapchain(
        &mut self,
        width: u32,
        height: u32,
        mode: PresentMode,
        recreate: bool,
    ) -> Result<SwapchainInfo> {
        let mut s = self.inner.borrow_mut();
        s.record(PlatformCall::CreateSwapchain { width, height, mode, recreate });

        if s.opts.fail_swapchain || !s.surface {
            return Err(GraphicsError::SwapchainError("vkCreateSwapchainKHR failed".into()).into());
        }
        if !s.opts.present_modes.contains(&mode) {
            return Err(GraphicsError::SwapchainError(format!("present mode {:?} unsupported", mode)).into());
        }

        // 最小化窗口：保留旧交换链
        if width == 0 || height == 0 {
            let mut info = s.swapchain.unwrap_or(SwapchainInfo {
                created_new: false,
                width: 0,
                height: 0,
                image_count: 0,
                present_mode: mode,
            });
            info.created_new = false;
            return Ok(info);
        }

        if let Some(existing) = s.swapchain.filter(|_| !recreate) {
            if (existing.width, existing.height, existing.present_mode) == (width, height, mode) {
                return Ok(SwapchainInfo {
                    created_new: false,
                    ..existing
                });
            }
        }

        let info = SwapchainInfo {
            created_new: true,
            width,
            height,
            image_count: s.opts.swapchain_images.max(2),
            present_mode: mode,
        };
        s.swapchain = Some(info);
        s.next_image = 0;
        s.acquired = None;
        s.out_of_date = false;
        s.suboptimal = false;
        Ok(info)
    }

    fn destroy_swapchain(&mut self) {
        let mut s = self.inner.borrow_mut();
        s.swapchain = None;
        s.acquired = None;
        s.record(PlatformCall::DestroySwapchain);
    }

    fn acquire_next_image(&mut self) -> Result<Option<u32>> {
        let mut s = self.inner.borrow_mut();
        let Some(info) = s.swapchain else {
            return Err(GraphicsError::SwapchainError("no swapchain".into()).into());
        };

        if s.out_of_date {
            return Ok(None);
        }

        let index = s.next_image;
        s.next_image = (index + 1) % info.image_count;
        s.acquired = Some(index);
        s.record(PlatformCall::AcquireImage(index));
        Ok(Some(index))
    }

    fn present(&mut self, image_index: u32) -> Result<bool> {
        let mut s = self.inner.borrow_mut();
        if s.acquired != Some(image_index) {
            return Err(GraphicsError::Present(format!("image {} was not acquired", image_index)).into());
        }
        s.acquired = None;
        s.record(PlatformCall::Present(image_index));
        Ok(!s.suboptimal)
    }

    fn wait_idle(&mut self) {
        self.inner.borrow_mut().record(PlatformCall::WaitIdle);
    }
}
