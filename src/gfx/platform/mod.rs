//! 平台协作接口
//!
//! 上下文驱动本身不直接调用操作系统，而是通过这里的 trait 使用：
//!
//! - [`WindowSystem`]：窗口、绘制句柄、像素格式、显示模式、事件轮询
//! - [`GlPlatform`]：动态 GL 库加载、上下文创建/共享/切换、扩展查询
//! - [`SwapchainPlatform`]：实例、表面、交换链、获取/呈现图像
//!
//! 提供两种实现：`headless`（进程内模拟，测试和无窗口运行使用）和
//! `winit`（winit 窗口，wgpu 表面作为交换链，glutin 提供 GL 上下文）。

pub mod headless;
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub mod winit;

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::gfx::api::ContextAttribs;
use crate::gfx::present::PresentMode;
use crate::gfx::surface::{DisplayMetric, WindowEvents};

pub use headless::{HeadlessOptions, HeadlessPlatform, HeadlessProbe, PlatformCall};

/// 平台类型（配置项）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// 进程内模拟平台
    #[default]
    Headless,
    /// winit 窗口，wgpu 交换链，glutin 上下文
    Winit,
}

impl PlatformKind {
    pub fn name(&self) -> &'static str {
        match self {
            PlatformKind::Headless => "headless",
            PlatformKind::Winit => "winit",
        }
    }
}

/// 原生窗口句柄（不透明）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeWindow(pub u64);

/// 原生绘制句柄（设备上下文 / drawable，不透明）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeDrawable(pub u64);

/// GL 上下文句柄（不透明）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlContextId(pub u64);

/// 通过 `get_proc_address` 解析到的入口地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcAddress(pub NonZeroUsize);

/// 像素格式描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub draw_to_window: bool,
    pub support_opengl: bool,
    pub double_buffer: bool,
    pub color_bits: u8,
    pub depth_bits: u8,
    pub stencil_bits: u8,
}

impl PixelFormat {
    /// GL 上下文使用的双缓冲 RGBA 格式
    pub const fn opengl() -> Self {
        Self {
            draw_to_window: true,
            support_opengl: true,
            double_buffer: true,
            color_bits: 32,
            depth_bits: 0,
            stencil_bits: 0,
        }
    }

    /// GDI 使用的双缓冲 RGBA 格式
    pub const fn gdi() -> Self {
        Self {
            support_opengl: false,
            ..Self::opengl()
        }
    }
}

/// 窗口创建参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDesc {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowDesc {
    fn default() -> Self {
        Self {
            title: "vid_ctx".to_string(),
            width: 640,
            height: 480,
            resizable: true,
        }
    }
}

/// 窗口系统原语
pub trait WindowSystem {
    /// 平台名称，用于日志
    fn name(&self) -> &'static str;

    /// 创建原生窗口
    fn create_window(&mut self, desc: &WindowDesc) -> Result<NativeWindow>;

    /// 销毁原生窗口
    fn destroy_window(&mut self, window: NativeWindow);

    /// 获取窗口的绘制句柄
    fn acquire_drawable(&mut self, window: NativeWindow) -> Result<NativeDrawable>;

    /// 释放绘制句柄，必须先于 `destroy_window`
    fn release_drawable(&mut self, window: NativeWindow, drawable: NativeDrawable);

    /// 为绘制句柄设置像素格式
    fn set_pixel_format(&mut self, drawable: NativeDrawable, format: &PixelFormat) -> Result<()>;

    /// 调整窗口尺寸；全屏时切换操作系统显示模式
    ///
    /// 返回是否改变了桌面显示模式（destroy 时需要恢复）。
    fn apply_video_mode(
        &mut self,
        window: NativeWindow,
        width: u32,
        height: u32,
        fullscreen: bool,
    ) -> Result<bool>;

    /// 恢复原始桌面显示模式
    fn restore_display_mode(&mut self);

    /// 当前显示器分辨率
    fn monitor_resolution(&self) -> (u32, u32);

    /// 当前显示器刷新率（Hz）
    fn refresh_rate(&self) -> Option<f32> {
        None
    }

    /// 显示器度量值
    fn metric(&self, metric: DisplayMetric) -> Option<f32>;

    /// 轮询窗口事件，调用方拥有事件循环
    fn poll_events(&mut self, window: NativeWindow) -> WindowEvents;

    fn set_title(&mut self, window: NativeWindow, title: &str);

    fn has_focus(&self, window: NativeWindow) -> bool;

    /// 抑制屏保，返回平台是否支持
    fn suppress_screensaver(&mut self, enable: bool) -> bool;

    fn show_cursor(&mut self, window: NativeWindow, visible: bool);

    /// 交换绘制句柄的前后缓冲
    fn swap_buffers(&mut self, drawable: NativeDrawable);

    /// 平台提供的输入驱动，按优先级排列
    fn input_drivers(&self) -> &'static [&'static str];
}

/// GL 上下文原语（WGL 风格）
pub trait GlPlatform: WindowSystem {
    /// 加载 GL 动态库，未加载时 `get_proc_address` 只能解析扩展入口
    fn open_library(&mut self) -> bool;

    fn close_library(&mut self);

    /// 解析入口点，先查扩展入口，再回退到动态库导出
    fn get_proc_address(&self, symbol: &str) -> Option<ProcAddress>;

    /// 基础上下文创建
    fn create_context(&mut self, drawable: NativeDrawable) -> Result<GlContextId>;

    /// 扩展上下文创建（需要先解析到 `wglCreateContextAttribsARB`）
    fn create_context_attribs(
        &mut self,
        drawable: NativeDrawable,
        share: Option<GlContextId>,
        attribs: &ContextAttribs,
    ) -> Result<GlContextId>;

    /// 让两个上下文共享对象命名空间
    fn share_lists(&mut self, primary: GlContextId, shared: GlContextId) -> bool;

    /// 将上下文设为当前，`None` 表示解除绑定
    fn make_current(&mut self, binding: Option<(NativeDrawable, GlContextId)>) -> bool;

    fn delete_context(&mut self, context: GlContextId);

    /// 等待所有已提交的 GPU 工作完成
    fn finish(&mut self);

    /// 调用交换间隔扩展（需要先解析到 `wglSwapIntervalEXT`）
    fn set_swap_interval(&mut self, interval: i32) -> bool;

    /// 查询扩展字符串（需要先解析到 `wglGetExtensionsStringARB`）
    fn extensions_string(&self, drawable: NativeDrawable) -> Option<String>;
}

/// 交换链创建结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainInfo {
    /// 是否产生了新的交换链对象（尺寸为 0 或参数未变时为 false）
    pub created_new: bool,
    pub width: u32,
    pub height: u32,
    pub image_count: u32,
    pub present_mode: PresentMode,
}

/// 显式交换链原语（Vulkan 风格）
pub trait SwapchainPlatform: WindowSystem {
    fn create_instance(&mut self) -> Result<()>;

    fn destroy_instance(&mut self);

    fn create_surface(&mut self, window: NativeWindow) -> Result<()>;

    fn destroy_surface(&mut self);

    /// 表面支持的呈现模式
    fn supported_present_modes(&self) -> Vec<PresentMode>;

    /// 以给定尺寸和呈现模式（重新）创建交换链
    ///
    /// 参数未变时保留旧交换链；`recreate` 表示旧交换链已过期，即使参数相同也必须替换。
    /// 尺寸为 0 时总是保留旧交换链。
    fn create_swapchain(
        &mut self,
        width: u32,
        height: u32,
        mode: PresentMode,
        recreate: bool,
    ) -> Result<SwapchainInfo>;

    fn destroy_swapchain(&mut self);

    /// 获取下一张图像，`Ok(None)` 表示交换链已过期需要重建
    fn acquire_next_image(&mut self) -> Result<Option<u32>>;

    /// 呈现图像，`Ok(false)` 表示交换链已过期需要重建
    fn present(&mut self, image_index: u32) -> Result<bool>;

    /// 等待设备空闲
    fn wait_idle(&mut self);
}
