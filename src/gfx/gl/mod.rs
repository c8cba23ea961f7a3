//! WGL/OpenGL 上下文驱动（立即呈现后端）
//!
//! 窗口创建时同步设置双缓冲像素格式；上下文在 `set_video_mode` 中创建，
//! 交换间隔通过 `wglSwapIntervalEXT` 下发，`set_resize` 由窗口系统直接处理。

mod context;
mod driver;

pub use context::{create_contexts, GlContextGuard, GlContexts};
pub use driver::GlDriver;

use crate::gfx::api::{BackendDescriptor, ContextApi};

pub(crate) const LOG_TARGET: &str = "vid_ctx::wgl";

pub static DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    ident: "wgl",
    api: ContextApi::OpenGl,
    name: "WGL/OpenGL",
};
