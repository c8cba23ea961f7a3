//! vid_ctx - 图形上下文驱动层
//!
//! 为渲染前端提供统一的"窗口 + 渲染上下文 + 呈现"接口，
//! 支持传统的立即呈现后端（OpenGL、GDI）和显式交换链后端（Vulkan 风格）。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（配置、日志、错误处理）
//! - `gfx`: 上下文驱动层（能力标志、生命周期、表面绑定、交换控制、驱动注册表）
//!
//! # 使用示例
//!
//! ```no_run
//! use vid_ctx::gfx::{registry, ContextApi, GfxContext, PlatformKind};
//!
//! let mut driver = registry::create("wgl", PlatformKind::Headless)?;
//! driver.bind_api(ContextApi::OpenGl, 3, 3)?;
//! driver.init()?;
//! driver.set_video_mode(1280, 720, false)?;
//!
//! loop {
//!     let events = driver.check_window();
//!     if events.quit {
//!         break;
//!     }
//!     driver.swap_buffers();
//! }
//!
//! driver.destroy();
//! # Ok::<(), vid_ctx::core::VidCtxError>(())
//! ```

pub mod core;
pub mod gfx;
