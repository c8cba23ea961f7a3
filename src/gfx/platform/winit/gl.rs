//! glutin 实现的 GL 上下文原语
//!
//! glutin 在创建显示连接时选定像素格式（config），所以 `set_pixel_format` 负责建立
//! 显示连接、挑选 config 并为窗口创建 GL 表面。上下文创建、共享和交换间隔都通过
//! glutin 的可移植接口完成，WGL 扩展入口的查询按 glutin 的显示能力回答。
//!
//! glutin 只能在创建时指定共享对象，基础路径上再次创建的上下文会与最近一个存活的
//! 上下文共享，`share_lists` 只确认这层关系。

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::num::{NonZeroU32, NonZeroUsize};

use glutin::config::{Config, ConfigTemplateBuilder, GlConfig};
use glutin::context::{
    ContextApi as GlutinApi, ContextAttributesBuilder, GlProfile, NotCurrentGlContext,
    PossiblyCurrentContext, PossiblyCurrentGlContext, Version,
};
use glutin::display::{Display, DisplayApiPreference, DisplayFeatures, GlDisplay};
use glutin::surface::{GlSurface, Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};
use tracing::{debug, info, trace, warn};
use winit::window::Window;

use crate::core::error::{GraphicsError, Result};
use crate::gfx::api::ContextAttribs;
use crate::gfx::platform::{GlContextId, GlPlatform, NativeDrawable, NativeWindow, PixelFormat, ProcAddress};

use super::{WinitPlatform, LOG_TARGET};

/// glutin 代为实现的 WGL 扩展
const CREATE_CONTEXT_ATTRIBS: &str = "wglCreateContextAttribsARB";
const SWAP_INTERVAL: &str = "wglSwapIntervalEXT";
const EXTENSIONS_STRING: &str = "wglGetExtensionsStringARB";

/// glutin 显示连接、config、表面和上下文
#[derive(Default)]
pub(super) struct GlState {
    /// `open_library` 之后才解析核心 GL 入口
    library_open: bool,
    display: Option<Display>,
    config: Option<Config>,
    surfaces: HashMap<NativeDrawable, Surface<WindowSurface>>,
    contexts: HashMap<GlContextId, PossiblyCurrentContext>,
    /// 共享上下文 → 创建时共享的上下文
    shares: HashMap<GlContextId, GlContextId>,
    current: Option<(NativeDrawable, GlContextId)>,
    last_created: Option<GlContextId>,
    next_context_id: u64,
}

impl GlState {
    /// 窗口或绘制句柄失效时丢掉对应的 GL 表面
    pub(super) fn forget_window(&mut self, drawable: NativeDrawable) {
        if self.surfaces.remove(&drawable).is_some() {
            debug!(target: LOG_TARGET, ?drawable, "GL surface released");
        }
        if self.current.map_or(false, |(d, _)| d == drawable) {
            self.release_current();
        }
    }

    fn alloc_context(&mut self, context: PossiblyCurrentContext) -> GlContextId {
        self.next_context_id += 1;
        let id = GlContextId(self.next_context_id);
        self.contexts.insert(id, context);
        self.last_created = Some(id);
        id
    }

    fn current_context(&self) -> Option<(&Surface<WindowSurface>, &PossiblyCurrentContext)> {
        let (drawable, id) = self.current?;
        Some((self.surfaces.get(&drawable)?, self.contexts.get(&id)?))
    }

    /// 解除当前上下文，上下文本身保留
    fn release_current(&mut self) {
        let Some((_, id)) = self.current.take() else {
            return;
        };
        let Some(context) = self.contexts.remove(&id) else {
            return;
        };
        match context.make_not_current() {
            Ok(context) => {
                self.contexts.insert(id, context.treat_as_possibly_current());
            }
            Err(e) => warn!(target: LOG_TARGET, "Failed to release GL context {}: {}", id.0, e),
        }
    }

    /// 按 glutin 的显示能力拼出的扩展字符串
    fn extensions(&self) -> Option<String> {
        let display = self.display.as_ref()?;
        let mut extensions = vec![
            "WGL_ARB_extensions_string",
            "WGL_ARB_pixel_format",
            "WGL_ARB_create_context",
            "WGL_ARB_create_context_profile",
        ];
        if display.supported_features().contains(DisplayFeatures::SWAP_CONTROL) {
            extensions.push("WGL_EXT_swap_control");
        }
        Some(extensions.join(" "))
    }
}

/// glutin 代为调用的扩展入口没有真实地址，用这个函数的地址表示"已解析"
extern "C" fn glutin_entry() {}

fn portable_entry() -> Option<ProcAddress> {
    NonZeroUsize::new(glutin_entry as usize).map(ProcAddress)
}

fn window_handle(window: &Window) -> Result<RawWindowHandle> {
    window
        .window_handle()
        .map(|handle| handle.as_raw())
        .map_err(|e| GraphicsError::ContextCreation(format!("no native window handle: {}", e)).into())
}

#[cfg(target_os = "windows")]
fn display_preference(window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Wgl(Some(window))
}

#[cfg(target_os = "macos")]
fn display_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Cgl
}

#[cfg(target_os = "linux")]
fn display_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Egl
}

fn non_zero(width: u32, height: u32) -> Option<(NonZeroU32, NonZeroU32)> {
    Some((NonZeroU32::new(width)?, NonZeroU32::new(height)?))
}

impl WinitPlatform {
    fn gl_window(&self, drawable: NativeDrawable) -> Result<&Window> {
        self.window(NativeWindow(drawable.0))
            .map(|window| window.as_ref())
            .ok_or_else(|| GraphicsError::ContextCreation("window is not alive".to_string()).into())
    }

    /// 建立显示连接，挑选与窗口兼容的 config，并创建窗口的 GL 表面
    pub(super) fn choose_gl_config(&mut self, drawable: NativeDrawable, format: &PixelFormat) -> Result<()> {
        let window = self.gl_window(drawable)?;
        let raw_window = window_handle(window)?;
        let raw_display = window
            .display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| GraphicsError::WindowCreation(format!("no native display handle: {}", e)))?;
        let size = window.inner_size();

        if self.gl.display.is_none() {
            let display = unsafe { Display::new(raw_display, display_preference(raw_window)) }
                .map_err(|e| GraphicsError::WindowCreation(format!("Failed to open GL display: {}", e)))?;
            let version = display.version_string();
            info!(target: LOG_TARGET, "GL display: {}", version);
            self.gl.display = Some(display);
        }
        let Some(display) = self.gl.display.as_ref() else {
            return Err(GraphicsError::WindowCreation("GL display not available".to_string()).into());
        };

        let template = ConfigTemplateBuilder::new()
            .compatible_with_native_window(raw_window)
            .with_alpha_size(8)
            .with_depth_size(format.depth_bits)
            .with_stencil_size(format.stencil_bits)
            .with_single_buffering(!format.double_buffer)
            .build();

        let config = unsafe { display.find_configs(template) }
            .map_err(|e| GraphicsError::WindowCreation(format!("no matching pixel format: {}", e)))?
            .max_by_key(|config| config.num_samples())
            .ok_or_else(|| GraphicsError::WindowCreation("no matching pixel format".to_string()))?;
        debug!(
            target: LOG_TARGET,
            samples = config.num_samples(),
            depth = config.depth_size(),
            stencil = config.stencil_size(),
            "Selected GL config"
        );

        let (width, height) = non_zero(size.width, size.height)
            .unwrap_or((NonZeroU32::MIN, NonZeroU32::MIN));
        let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(raw_window, width, height);
        let surface = unsafe { display.create_window_surface(&config, &attrs) }
            .map_err(|e| GraphicsError::WindowCreation(format!("Failed to create GL surface: {}", e)))?;

        self.gl.surfaces.insert(drawable, surface);
        self.gl.config = Some(config);
        Ok(())
    }

    /// 窗口尺寸变化后调整当前 GL 表面
    pub(super) fn resize_gl_surface(&mut self, width: u32, height: u32) {
        let (Some((surface, context)), Some((width, height))) =
            (self.gl.current_context(), non_zero(width, height))
        else {
            return;
        };
        surface.resize(context, width, height);
    }

    /// 交换 GL 表面，没有 GL 表面时返回 `false`
    pub(super) fn swap_gl_surface(&mut self, drawable: NativeDrawable) -> bool {
        let Some((surface, context)) = self
            .gl
            .current_context()
            .filter(|_| self.gl.current.map_or(false, |(d, _)| d == drawable))
        else {
            return false;
        };
        if let Err(e) = surface.swap_buffers(context) {
            warn!(target: LOG_TARGET, "Failed to swap GL buffers: {}", e);
        }
        true
    }

    fn build_context(
        &mut self,
        drawable: NativeDrawable,
        share: Option<GlContextId>,
        attribs: Option<&ContextAttribs>,
    ) -> Result<GlContextId> {
        let raw_window = window_handle(self.gl_window(drawable)?)?;
        let (Some(display), Some(config)) = (self.gl.display.as_ref(), self.gl.config.as_ref()) else {
            return Err(GraphicsError::ContextCreation("pixel format not set".to_string()).into());
        };

        let mut builder = ContextAttributesBuilder::new();
        if let Some(attribs) = attribs {
            let version = attribs.version.map(|v| {
                Version::new(
                    u8::try_from(v.major).unwrap_or(u8::MAX),
                    u8::try_from(v.minor).unwrap_or(u8::MAX),
                )
            });
            builder = builder
                .with_context_api(GlutinApi::OpenGl(version))
                .with_debug(attribs.debug);
            if version.is_some() {
                let profile = if attribs.core_profile {
                    GlProfile::Core
                } else {
                    GlProfile::Compatibility
                };
                builder = builder.with_profile(profile);
            }
        }
        if let Some(context) = share.and_then(|id| self.gl.contexts.get(&id)) {
            builder = builder.with_sharing(context);
        }

        let context = unsafe { display.create_context(config, &builder.build(Some(raw_window))) }
            .map_err(|e| GraphicsError::ContextCreation(e.to_string()))?
            .treat_as_possibly_current();

        let id = self.gl.alloc_context(context);
        if let Some(share) = share {
            self.gl.shares.insert(id, share);
        }
        Ok(id)
    }
}

impl GlPlatform for WinitPlatform {
    fn open_library(&mut self) -> bool {
        // glutin 在建立显示连接时加载 GL 库
        self.gl.library_open = true;
        true
    }

    fn close_library(&mut self) {
        self.gl.library_open = false;
        // 缓存的上下文仍然引用显示连接
        if self.gl.contexts.is_empty() {
            self.gl.surfaces.clear();
            self.gl.config = None;
            self.gl.display = None;
        }
    }

    fn get_proc_address(&self, symbol: &str) -> Option<ProcAddress> {
        let display = self.gl.display.as_ref()?;
        match symbol {
            CREATE_CONTEXT_ATTRIBS | EXTENSIONS_STRING => return portable_entry(),
            SWAP_INTERVAL => {
                return display
                    .supported_features()
                    .contains(DisplayFeatures::SWAP_CONTROL)
                    .then(portable_entry)
                    .flatten();
            }
            _ => {}
        }
        if !self.gl.library_open {
            return None;
        }

        let name = CString::new(symbol).ok()?;
        let address = display.get_proc_address(&name);
        NonZeroUsize::new(address as usize).map(ProcAddress)
    }

    fn create_context(&mut self, drawable: NativeDrawable) -> Result<GlContextId> {
        let share = self.gl.last_created.filter(|id| self.gl.contexts.contains_key(id));
        self.build_context(drawable, share, None)
    }

    fn create_context_attribs(
        &mut self,
        drawable: NativeDrawable,
        share: Option<GlContextId>,
        attribs: &ContextAttribs,
    ) -> Result<GlContextId> {
        let id = self.build_context(drawable, share, Some(attribs))?;
        info!(target: LOG_TARGET, version = ?attribs.version, core = attribs.core_profile, "Created GL context {}", id.0);
        Ok(id)
    }

    fn share_lists(&mut self, primary: GlContextId, shared: GlContextId) -> bool {
        self.gl.shares.get(&shared) == Some(&primary)
    }

    fn make_current(&mut self, binding: Option<(NativeDrawable, GlContextId)>) -> bool {
        let Some((drawable, id)) = binding else {
            self.gl.release_current();
            return true;
        };

        let (Some(surface), Some(context)) = (self.gl.surfaces.get(&drawable), self.gl.contexts.get(&id)) else {
            return false;
        };
        match context.make_current(surface) {
            Ok(()) => {
                self.gl.current = Some((drawable, id));
                true
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to make GL context {} current: {}", id.0, e);
                false
            }
        }
    }

    fn delete_context(&mut self, context: GlContextId) {
        if self.gl.current.map_or(false, |(_, id)| id == context) {
            self.gl.release_current();
        }
        self.gl.contexts.remove(&context);
        self.gl.shares.retain(|shared, primary| *shared != context && *primary != context);
        if self.gl.last_created == Some(context) {
            self.gl.last_created = None;
        }
        trace!(target: LOG_TARGET, "GL context {} deleted", context.0);
    }

    fn finish(&mut self) {
        if self.gl.current_context().is_none() {
            return;
        }
        let Some(ProcAddress(address)) = self.get_proc_address("glFinish") else {
            return;
        };
        // glFinish 没有参数和返回值，当前上下文由上面的检查保证
        unsafe {
            let finish: extern "system" fn() = std::mem::transmute(address.get() as *const c_void);
            finish();
        }
    }

    fn set_swap_interval(&mut self, interval: i32) -> bool {
        let Some((surface, context)) = self.gl.current_context() else {
            return false;
        };
        let interval = match NonZeroU32::new(interval.unsigned_abs()) {
            Some(n) => SwapInterval::Wait(n),
            None => SwapInterval::DontWait,
        };
        match surface.set_swap_interval(context, interval) {
            Ok(()) => true,
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to set swap interval: {}", e);
                false
            }
        }
    }

    fn extensions_string(&self, drawable: NativeDrawable) -> Option<String> {
        if !self.gl.surfaces.contains_key(&drawable) {
            return None;
        }
        self.gl.extensions()
    }
}
