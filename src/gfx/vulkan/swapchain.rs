//! 交换链的重建、获取和呈现
//!
//! 采用提前获取：呈现当前图像之后立刻获取下一张，
//! 让调用方下一次渲染时总有可用的目标。

use tracing::{debug, error};

use crate::core::error::Result;
use crate::gfx::platform::{SwapchainInfo, SwapchainPlatform};
use crate::gfx::present::{present_mode_for_interval, PresentMode};

use super::LOG_TARGET;

/// 交换链及当前获取到的图像
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swapchain {
    pub info: SwapchainInfo,
    /// 已获取、尚未呈现的图像
    pub current_image: Option<u32>,
    /// 交换链对象刚被替换
    pub invalid: bool,
}

impl Swapchain {
    /// 按交换间隔选择呈现模式并创建交换链，随后获取第一张图像
    ///
    /// 返回值的第二项表示获取时交换链已经过期。
    pub fn create<P: SwapchainPlatform + ?Sized>(
        platform: &mut P,
        width: u32,
        height: u32,
        interval: i32,
    ) -> Result<(Self, bool)> {
        let mode = Self::pick_mode(platform, interval);
        let info = platform.create_swapchain(width, height, mode, false)?;
        debug!(
            target: LOG_TARGET,
            width = info.width,
            height = info.height,
            images = info.image_count,
            mode = ?info.present_mode,
            "Swapchain created"
        );

        let mut swapchain = Self {
            info,
            current_image: None,
            invalid: true,
        };
        let out_of_date = !swapchain.acquire(platform);
        Ok((swapchain, out_of_date))
    }

    fn pick_mode<P: SwapchainPlatform + ?Sized>(platform: &P, interval: i32) -> PresentMode {
        present_mode_for_interval(interval, &platform.supported_present_modes())
    }

    /// 以新尺寸/间隔重建
    ///
    /// `recreate` 表示旧交换链已经过期，参数相同也要替换。
    /// 只有真的产生了新交换链时才重新获取图像。返回值表示获取时交换链已过期。
    pub fn rebuild<P: SwapchainPlatform + ?Sized>(
        &mut self,
        platform: &mut P,
        width: u32,
        height: u32,
        interval: i32,
        recreate: bool,
    ) -> Result<bool> {
        let mode = Self::pick_mode(platform, interval);
        let info = platform.create_swapchain(width, height, mode, recreate)?;
        self.info = info;
        self.invalid = true;

        if info.created_new {
            debug!(target: LOG_TARGET, "Swapchain rebuilt at {}x{} ({:?})", width, height, mode);
            self.current_image = None;
            return Ok(!self.acquire(platform));
        }
        Ok(false)
    }

    /// 获取下一张图像，返回 `false` 表示交换链已过期
    pub fn acquire<P: SwapchainPlatform + ?Sized>(&mut self, platform: &mut P) -> bool {
        match platform.acquire_next_image() {
            Ok(Some(index)) => {
                self.current_image = Some(index);
                true
            }
            Ok(None) => {
                debug!(target: LOG_TARGET, "Swapchain out of date on acquire");
                self.current_image = None;
                false
            }
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to acquire swapchain image: {}", e);
                self.current_image = None;
                false
            }
        }
    }

    /// 呈现当前图像再获取下一张，返回 `false` 表示需要重建
    pub fn present_and_acquire<P: SwapchainPlatform + ?Sized>(&mut self, platform: &mut P) -> bool {
        let mut valid = true;

        if let Some(index) = self.current_image.take() {
            match platform.present(index) {
                Ok(true) => self.invalid = false,
                Ok(false) => {
                    debug!(target: LOG_TARGET, "Swapchain out of date on present");
                    valid = false;
                }
                Err(e) => {
                    error!(target: LOG_TARGET, "Failed to present image {}: {}", index, e);
                    valid = false;
                }
            }
        }

        let acquired = self.acquire(platform);
        valid && acquired
    }

    pub fn destroy<P: SwapchainPlatform + ?Sized>(self, platform: &mut P) {
        platform.wait_idle();
        platform.destroy_swapchain();
    }
}
