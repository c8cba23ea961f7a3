//! vid_ctx - 图形上下文驱动演示程序
//!
//! 按配置选择上下文驱动，完成 `bind_api → init → set_video_mode`，
//! 然后运行呈现循环直到窗口关闭或达到帧数上限。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件（默认 headless 平台上的 wgl 驱动）
//! cargo run
//!
//! # 在真实窗口上运行 Vulkan 风格的交换链驱动
//! cargo run -- --driver vulkan --platform winit
//!
//! # 自适应垂直同步，渲染 300 帧
//! cargo run -- --driver vulkan --swap-interval -1 --frames 300
//! ```

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use vid_ctx::core::{log, Config};
use vid_ctx::gfx::{registry, GfxContext, PlatformKind};

/// headless 平台没有关闭事件，未指定帧数时使用的上限
const HEADLESS_FRAME_LIMIT: u64 = 60;

fn main() -> Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");

    // 2. 应用命令行参数
    config.apply_args(std::env::args().skip(1));

    // 3. 验证配置
    config.validate().context("invalid configuration")?;

    // 4. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!(version = env!("CARGO_PKG_VERSION"), "vid_ctx starting...");

    for descriptor in registry::list() {
        debug!(ident = descriptor.ident, api = descriptor.api.name(), "Registered context driver: {}", descriptor.name);
    }

    info!(
        driver = %config.video.driver,
        platform = config.video.platform.name(),
        api = config.video.api.name(),
        major = config.video.major,
        minor = config.video.minor,
        width = config.window.width,
        height = config.window.height,
        "Video configuration"
    );

    // 5. 创建并初始化上下文驱动
    let mut driver = registry::create(&config.video.driver, config.video.platform)
        .with_context(|| format!("failed to create context driver '{}'", config.video.driver))?;
    driver.configure(&config.context_settings());
    driver
        .bind_api(config.video.api, config.video.major, config.video.minor)
        .context("bind_api failed")?;
    driver.init().context("failed to initialize context driver")?;

    driver.swap_interval(config.video.swap_interval);
    let outcome = driver
        .set_video_mode(config.window.width, config.window.height, config.video.fullscreen)
        .context("set_video_mode failed")?;

    let (width, height) = driver.get_video_size();
    info!(
        ?outcome,
        width,
        height,
        flags = ?driver.get_flags(),
        deferred_uploads = driver.defers_uploads(),
        "Context ready"
    );
    driver.update_window_title(&format!("{} [{}]", config.window.title, driver.descriptor().name));

    // 6. 呈现循环
    let frame_limit = match (config.video.frames, config.video.platform) {
        (Some(frames), _) => Some(frames),
        (None, PlatformKind::Headless) => {
            warn!("No frame limit on the headless platform, stopping after {} frames", HEADLESS_FRAME_LIMIT);
            Some(HEADLESS_FRAME_LIMIT)
        }
        (None, PlatformKind::Winit) => None,
    };

    info!("Entering main loop...");
    let frames = run_frames(&mut driver, frame_limit);

    info!(frames, "Main loop finished");
    driver.destroy();
    Ok(())
}

/// 呈现循环，返回经过的帧数
fn run_frames<C: GfxContext + ?Sized>(driver: &mut C, frame_limit: Option<u64>) -> u64 {
    let mut frame: u64 = 0;
    while frame_limit.map_or(true, |limit| frame < limit) {
        let events = driver.check_window();
        if events.quit {
            info!("Close requested, shutting down...");
            break;
        }

        if events.resize {
            debug!(width = events.width, height = events.height, "Window resized");
            if let Err(e) = driver.set_resize(events.width, events.height) {
                // 本帧没有可用的呈现目标，跳过的帧同样计入上限
                error!("Resize failed, skipping frame {}: {}", frame, e);
                frame += 1;
                continue;
            }
        }

        driver.swap_buffers();
        frame += 1;
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use vid_ctx::gfx::platform::{HeadlessOptions, HeadlessPlatform};
    use vid_ctx::gfx::vulkan::VulkanDriver;
    use vid_ctx::gfx::ContextApi;

    #[test]
    fn test_failing_resize_still_reaches_frame_limit() {
        let platform = HeadlessPlatform::new(HeadlessOptions::default());
        let probe = platform.probe();
        let mut driver = VulkanDriver::new(Box::new(platform));
        driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap();
        driver.init().unwrap();
        driver.set_video_mode(640, 480, false).unwrap();

        // 交换链过期且无法重建：每一帧都会请求 resize 并失败
        probe.mark_out_of_date();
        probe.set_fail_swapchain(true);
        driver.swap_buffers();

        assert_eq!(run_frames(&mut driver, Some(5)), 5);
        assert!(driver.needs_swapchain_rebuild());
    }

    #[test]
    fn test_close_stops_loop() {
        let platform = HeadlessPlatform::new(HeadlessOptions::default());
        let probe = platform.probe();
        let mut driver = VulkanDriver::new(Box::new(platform));
        driver.bind_api(ContextApi::Vulkan, 1, 1).unwrap();
        driver.init().unwrap();
        driver.set_video_mode(640, 480, false).unwrap();

        probe.push_close();
        assert_eq!(run_frames(&mut driver, None), 0);
    }
}
