//! Vulkan 上下文驱动（显式交换链后端）
//!
//! `init` 只创建窗口和实例，表面和交换链在 `set_video_mode` 中创建。
//! 交换间隔变化或窗口尺寸变化都通过重建交换链生效。

mod driver;
mod swapchain;

pub use driver::VulkanDriver;
pub use swapchain::Swapchain;

use crate::gfx::api::{BackendDescriptor, ContextApi};

pub(crate) const LOG_TARGET: &str = "vid_ctx::vulkan";

pub static DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    ident: "vulkan",
    api: ContextApi::Vulkan,
    name: "Vulkan",
};
