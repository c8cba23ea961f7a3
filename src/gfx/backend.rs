//! 上下文驱动的统一接口
//!
//! 所有后端（WGL/OpenGL、Vulkan、GDI）都实现 [`GfxContext`]。
//! 后端不支持的操作使用 trait 的默认实现，返回 `None` / `false` 或者什么都不做，
//! 调用方不需要再判断某个入口是否存在。

use tracing::{debug, warn};

use crate::core::error::Result;
use crate::gfx::api::{BackendDescriptor, ContextApi};
use crate::gfx::flags::FeatureFlags;
use crate::gfx::platform::ProcAddress;
use crate::gfx::present::PresentMode;
use crate::gfx::state::{ContextSettings, ContextState, DriverState};
use crate::gfx::surface::{DisplayMetric, WindowEvents};

/// `set_video_mode` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoModeOutcome {
    /// 新建了上下文（或交换链）
    Created,
    /// 命中上下文缓存，调用方需要确认复用
    ReusedCachedContext,
}

/// 显式交换链后端暴露给渲染器的上下文数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextData {
    pub swapchain_width: u32,
    pub swapchain_height: u32,
    pub image_count: u32,
    /// 当前已获取、尚未呈现的图像
    pub current_image: Option<u32>,
    pub present_mode: PresentMode,
    /// 交换链刚被替换，渲染器需要重建依赖它的资源
    pub invalid_swapchain: bool,
}

/// 上下文驱动的统一接口
pub trait GfxContext {
    /// 注册表中的描述
    fn descriptor(&self) -> &'static BackendDescriptor;

    fn driver_state(&self) -> &DriverState;

    fn driver_state_mut(&mut self) -> &mut DriverState;

    /// 生命周期状态
    fn state(&self) -> ContextState {
        self.driver_state().state()
    }

    /// 应用上层视频驱动的设置
    fn configure(&mut self, settings: &ContextSettings) {
        self.driver_state_mut().configure(settings);
    }

    /// 创建窗口和表面配置
    fn init(&mut self) -> Result<()>;

    /// 释放全部资源，可重复调用
    fn destroy(&mut self);

    fn get_api(&self) -> ContextApi {
        self.driver_state().request.api
    }

    /// 记录要创建的 API 和版本
    fn bind_api(&mut self, api: ContextApi, major: u32, minor: u32) -> Result<()>;

    /// 请求交换间隔
    fn swap_interval(&mut self, interval: i32);

    /// 设置视频模式并创建上下文
    fn set_video_mode(&mut self, width: u32, height: u32, fullscreen: bool) -> Result<VideoModeOutcome>;

    /// 当前绘制尺寸，没有窗口时返回显示器分辨率
    fn get_video_size(&self) -> (u32, u32);

    fn get_refresh_rate(&self) -> Option<f32> {
        None
    }

    fn get_video_output_size(&self) -> Option<(u32, u32)> {
        None
    }

    fn get_metrics(&self, _metric: DisplayMetric) -> Option<f32> {
        None
    }

    fn update_window_title(&mut self, _title: &str) {}

    /// 每帧轮询窗口事件
    fn check_window(&mut self) -> WindowEvents;

    /// 调整绘制尺寸，返回是否执行了重建
    fn set_resize(&mut self, _width: u32, _height: u32) -> Result<bool> {
        Ok(false)
    }

    fn has_focus(&self) -> bool {
        false
    }

    fn suppress_screensaver(&mut self, _enable: bool) -> bool {
        false
    }

    fn has_windowed(&self) -> bool {
        true
    }

    /// 呈现当前帧
    fn swap_buffers(&mut self);

    /// 选择输入驱动
    fn input_driver(&self, _requested: &str) -> Option<&'static str> {
        None
    }

    fn get_proc_address(&self, _symbol: &str) -> Option<ProcAddress> {
        None
    }

    fn show_mouse(&mut self, _visible: bool) {}

    /// 当前能力标志，上下文创建之前为零
    fn get_flags(&self) -> FeatureFlags {
        if !self.state().is_ready() {
            return FeatureFlags::empty();
        }
        self.driver_state().caps.flags()
    }

    /// 强制开启检测不到的标志，只会追加
    fn set_flags(&mut self, flags: FeatureFlags) {
        let ident = self.descriptor().ident;
        let ignored = self.driver_state_mut().caps.force(flags);
        if !ignored.is_empty() {
            debug!(backend = ident, ?ignored, "Ignoring flags this backend cannot force");
        }
    }

    /// 资源上传是否要投递到视频线程执行
    ///
    /// 视频驱动运行在独立线程上时，上下文只在该线程上当前，其他线程不能直接上传。
    fn defers_uploads(&self) -> bool {
        self.driver_state().threaded
    }

    /// 切换当前上下文：`true` 为共享的硬件渲染上下文，`false` 为主上下文
    fn bind_hw_render(&mut self, _enable: bool) {}

    fn get_context_data(&self) -> Option<ContextData> {
        None
    }
}

/// 按优先级选择输入驱动
///
/// 请求的驱动可用时使用它，否则使用平台的首选，平台一个都不提供时返回 `None`。
pub fn choose_input_driver(requested: &str, offered: &'static [&'static str]) -> Option<&'static str> {
    if let Some(found) = offered.iter().copied().find(|d| *d == requested) {
        return Some(found);
    }

    let fallback = offered.first().copied();
    if let Some(fallback) = fallback {
        if !requested.is_empty() {
            warn!(requested, fallback, "Requested input driver not available");
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_input_driver() {
        const OFFERED: &[&str] = &["raw", "dinput"];
        assert_eq!(choose_input_driver("dinput", OFFERED), Some("dinput"));
        assert_eq!(choose_input_driver("sdl2", OFFERED), Some("raw"));
        assert_eq!(choose_input_driver("raw", &[]), None);
    }
}
