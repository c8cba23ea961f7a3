//! 窗口/表面绑定
//!
//! 进程内只有一个窗口：`SurfaceBinding` 成对保存原生窗口句柄和绘制句柄，
//! 尺寸在 resize 时更新，身份保持不变。

use tracing::debug;

use crate::core::error::{GraphicsError, Result};
use crate::gfx::platform::{NativeDrawable, NativeWindow, PixelFormat, WindowDesc, WindowSystem};

/// 显示器度量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayMetric {
    /// 物理宽度（毫米）
    MmWidth,
    /// 物理高度（毫米）
    MmHeight,
    /// 每英寸点数
    Dpi,
}

/// 一次 `check_window` 轮询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowEvents {
    /// 用户请求关闭窗口
    pub quit: bool,
    /// 是否发生了尺寸变化（或需要重建交换链）
    pub resize: bool,
    pub width: u32,
    pub height: u32,
}

/// 原生窗口与绘制句柄的配对
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceBinding {
    pub window: NativeWindow,
    /// 交换链后端没有绘制句柄
    pub drawable: Option<NativeDrawable>,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    /// 是否改变过桌面显示模式
    pub display_mode_changed: bool,
}

impl SurfaceBinding {
    /// 创建窗口；`pixel_format` 非空时同步获取绘制句柄并设置像素格式
    ///
    /// 像素格式设置失败时会按正确顺序释放已创建的句柄。
    pub fn create<P: WindowSystem + ?Sized>(
        platform: &mut P,
        desc: &WindowDesc,
        pixel_format: Option<&PixelFormat>,
    ) -> Result<Self> {
        let window = platform.create_window(desc)?;
        let mut binding = Self {
            window,
            drawable: None,
            width: desc.width,
            height: desc.height,
            fullscreen: false,
            display_mode_changed: false,
        };

        if let Some(format) = pixel_format {
            let drawable = match platform.acquire_drawable(window) {
                Ok(drawable) => drawable,
                Err(e) => {
                    platform.destroy_window(window);
                    return Err(e);
                }
            };
            binding.drawable = Some(drawable);

            if let Err(e) = platform.set_pixel_format(drawable, format) {
                binding.release(platform);
                return Err(e);
            }
        }

        debug!(window = window.0, drawable = ?binding.drawable, "Surface binding created");
        Ok(binding)
    }

    /// 应用视频模式，记录尺寸和是否切换了桌面显示模式
    pub fn apply_video_mode<P: WindowSystem + ?Sized>(
        &mut self,
        platform: &mut P,
        width: u32,
        height: u32,
        fullscreen: bool,
    ) -> Result<()> {
        let changed = platform
            .apply_video_mode(self.window, width, height, fullscreen)
            .map_err(|e| GraphicsError::DisplayMode(e.to_string()))?;

        self.width = width;
        self.height = height;
        self.fullscreen = fullscreen;
        self.display_mode_changed |= changed;
        Ok(())
    }

    /// 轮询事件并跟踪外部报告的尺寸
    pub fn poll<P: WindowSystem + ?Sized>(&mut self, platform: &mut P) -> WindowEvents {
        let mut events = platform.poll_events(self.window);
        if events.resize {
            self.width = events.width;
            self.height = events.height;
        } else {
            events.width = self.width;
            events.height = self.height;
        }
        events
    }

    /// 释放绘制句柄、销毁窗口、恢复显示模式
    ///
    /// 绘制句柄必须先于窗口释放：窗口句柄可能被系统复用，
    /// 残留的设备上下文引用会静默失效。
    pub fn release<P: WindowSystem + ?Sized>(self, platform: &mut P) {
        if let Some(drawable) = self.drawable {
            platform.release_drawable(self.window, drawable);
        }

        platform.destroy_window(self.window);

        if self.display_mode_changed {
            platform.restore_display_mode();
        }

        debug!(window = self.window.0, "Surface binding released");
    }
}

/// 没有窗口时回退到显示器分辨率，以便调用方为将要创建的窗口定尺寸
pub fn video_size<P: WindowSystem + ?Sized>(binding: Option<&SurfaceBinding>, platform: &P) -> (u32, u32) {
    match binding {
        Some(binding) => (binding.width, binding.height),
        None => platform.monitor_resolution(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::platform::{HeadlessOptions, HeadlessPlatform, PlatformCall};

    #[test]
    fn test_video_size_falls_back_to_monitor() {
        let platform = HeadlessPlatform::new(HeadlessOptions {
            monitor: (2560, 1440),
            ..Default::default()
        });
        assert_eq!(video_size(None, &platform), (2560, 1440));
    }

    #[test]
    fn test_release_order() {
        let mut platform = HeadlessPlatform::new(HeadlessOptions::default());
        let probe = platform.probe();

        let mut binding =
            SurfaceBinding::create(&mut platform, &WindowDesc::default(), Some(&PixelFormat::gdi()))
                .unwrap();
        binding.apply_video_mode(&mut platform, 800, 600, true).unwrap();
        assert!(binding.display_mode_changed);
        assert_eq!(video_size(Some(&binding), &platform), (800, 600));

        binding.release(&mut platform);

        let calls = probe.calls();
        let release = calls
            .iter()
            .position(|c| matches!(c, PlatformCall::ReleaseDrawable(_)))
            .unwrap();
        let destroy = calls
            .iter()
            .position(|c| matches!(c, PlatformCall::DestroyWindow(_)))
            .unwrap();
        let restore = calls
            .iter()
            .position(|c| matches!(c, PlatformCall::RestoreDisplayMode))
            .unwrap();
        assert!(release < destroy);
        assert!(destroy < restore);
        assert_eq!(probe.live_windows(), 0);
    }

    #[test]
    fn test_pixel_format_failure_rolls_back() {
        let mut platform = HeadlessPlatform::new(HeadlessOptions {
            fail_pixel_format: true,
            ..Default::default()
        });
        let probe = platform.probe();

        let result =
            SurfaceBinding::create(&mut platform, &WindowDesc::default(), Some(&PixelFormat::opengl()));
        assert!(result.is_err());
        assert_eq!(probe.live_windows(), 0);
        assert_eq!(probe.live_drawables(), 0);
    }

    #[test]
    fn test_poll_tracks_external_resize() {
        let mut platform = HeadlessPlatform::new(HeadlessOptions::default());
        let probe = platform.probe();
        let mut binding = SurfaceBinding::create(&mut platform, &WindowDesc::default(), None).unwrap();

        let events = binding.poll(&mut platform);
        assert!(!events.resize);
        assert_eq!((events.width, events.height), (640, 480));

        probe.push_resize(1024, 768);
        let events = binding.poll(&mut platform);
        assert!(events.resize);
        assert_eq!((binding.width, binding.height), (1024, 768));

        probe.push_close();
        assert!(binding.poll(&mut platform).quit);
    }
}
