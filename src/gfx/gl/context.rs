//! GL 上下文的两阶段创建
//!
//! 创建顺序：基础上下文 → （可选）基础共享上下文 → 设为当前 →
//! （可选）用扩展属性重建主上下文 → （可选）扩展共享上下文。
//! 已创建的上下文由 [`GlContextGuard`] 持有，任何一步失败时守卫在
//! drop 中解除绑定并删除它们，调用方拿不到半成品。

use tracing::{debug, error, info, warn};

use crate::core::error::{GraphicsError, Result};
use crate::gfx::api::{ContextAttribs, ContextRequest};
use crate::gfx::platform::{GlContextId, GlPlatform, NativeDrawable};

use super::LOG_TARGET;

/// 创建完成的上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlContexts {
    pub primary: GlContextId,
    /// 供硬件渲染核心使用的共享上下文
    pub shared: Option<GlContextId>,
    /// 主上下文是否带 core profile 位创建成功
    pub core_profile: bool,
}

/// 持有创建中上下文的守卫
pub struct GlContextGuard<'a, P: GlPlatform + ?Sized> {
    platform: &'a mut P,
    drawable: NativeDrawable,
    primary: Option<GlContextId>,
    shared: Option<GlContextId>,
}

impl<'a, P: GlPlatform + ?Sized> GlContextGuard<'a, P> {
    pub fn new(platform: &'a mut P, drawable: NativeDrawable) -> Self {
        Self {
            platform,
            drawable,
            primary: None,
            shared: None,
        }
    }

    /// 基础创建路径
    pub fn create_primary(&mut self) -> Result<GlContextId> {
        let context = self.platform.create_context(self.drawable)?;
        self.primary = Some(context);
        Ok(context)
    }

    /// 通过重复基础创建 + 共享命名空间得到共享上下文
    ///
    /// 失败不影响主上下文，只是关闭硬件渲染。
    pub fn create_shared_basic(&mut self) -> bool {
        let Some(primary) = self.primary else {
            return false;
        };

        let shared = match self.platform.create_context(self.drawable) {
            Ok(shared) => shared,
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to create shared context: {}", e);
                return false;
            }
        };

        if !self.platform.share_lists(primary, shared) {
            warn!(target: LOG_TARGET, "Failed to share contexts");
            self.platform.delete_context(shared);
            return false;
        }

        self.shared = Some(shared);
        true
    }

    /// 将主上下文设为当前
    pub fn make_primary_current(&mut self) -> Result<()> {
        let primary = self
            .primary
            .ok_or_else(|| GraphicsError::MakeCurrent("no primary context".into()))?;

        if self.platform.make_current(Some((self.drawable, primary))) {
            Ok(())
        } else {
            Err(GraphicsError::MakeCurrent(format!("context {} rejected", primary.0)).into())
        }
    }

    /// 用扩展属性重建主上下文
    ///
    /// 返回 `Ok(false)` 表示扩展创建失败，仍然使用基础上下文。
    pub fn upgrade_primary(&mut self, attribs: &ContextAttribs) -> Result<bool> {
        let context = match self.platform.create_context_attribs(self.drawable, None, attribs) {
            Ok(context) => context,
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to create core context. Falling back to legacy context: {}", e);
                return Ok(false);
            }
        };

        self.platform.make_current(None);
        if let Some(old) = self.primary.replace(context) {
            self.platform.delete_context(old);
        }
        self.make_primary_current()?;
        Ok(true)
    }

    /// 通过扩展路径创建与主上下文共享的上下文
    pub fn create_shared_extended(&mut self, attribs: &ContextAttribs) -> bool {
        let share = self.primary;
        match self.platform.create_context_attribs(self.drawable, share, attribs) {
            Ok(shared) => {
                self.shared = Some(shared);
                true
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to create shared context: {}", e);
                false
            }
        }
    }

    pub fn platform(&self) -> &P {
        &*self.platform
    }

    /// 交出所有权，守卫不再清理
    pub fn commit(mut self, core_profile: bool) -> Result<GlContexts> {
        let primary = self
            .primary
            .take()
            .ok_or_else(|| GraphicsError::ContextCreation("no primary context".into()))?;

        Ok(GlContexts {
            primary,
            shared: self.shared.take(),
            core_profile,
        })
    }
}

impl<P: GlPlatform + ?Sized> Drop for GlContextGuard<'_, P> {
    fn drop(&mut self) {
        if self.primary.is_none() && self.shared.is_none() {
            return;
        }

        debug!(target: LOG_TARGET, "Rolling back partially created GL contexts");
        self.platform.make_current(None);
        if let Some(shared) = self.shared.take() {
            self.platform.delete_context(shared);
        }
        if let Some(primary) = self.primary.take() {
            self.platform.delete_context(primary);
        }
    }
}

/// 按请求创建主上下文和可选的共享上下文
///
/// 扩展创建入口缺失或扩展创建失败都退化为基础上下文，只记录日志；
/// 共享上下文创建失败只关闭硬件渲染。主上下文无法创建或无法设为当前时返回错误。
pub fn create_contexts<P: GlPlatform + ?Sized>(
    platform: &mut P,
    drawable: NativeDrawable,
    request: &ContextRequest,
) -> Result<GlContexts> {
    let extended = request.needs_extended_creation();
    let attribs = ContextAttribs::from_request(request);
    let mut guard = GlContextGuard::new(platform, drawable);

    // 1. 基础上下文
    debug!(target: LOG_TARGET, "Creating basic GL context");
    guard.create_primary()?;

    // 2. 没有扩展属性时，共享上下文走基础路径
    if request.shared_context && !extended && !guard.create_shared_basic() {
        warn!(target: LOG_TARGET, "Hardware render context disabled");
    }

    guard.make_primary_current()?;

    // 3. 版本号 / 调试标志需要扩展创建路径
    let mut core_profile = false;
    if extended {
        if guard.platform().get_proc_address("wglCreateContextAttribsARB").is_some() {
            if guard.upgrade_primary(&attribs)? {
                info!(
                    target: LOG_TARGET,
                    version = ?attribs.version,
                    core = attribs.core_profile,
                    debug = attribs.debug,
                    "Created GL context with extended attributes"
                );
                core_profile = attribs.core_profile;
            }

            if request.shared_context && !guard.create_shared_extended(&attribs) {
                warn!(target: LOG_TARGET, "Hardware render context disabled");
            }
        } else {
            warn!(target: LOG_TARGET, "wglCreateContextAttribsARB not supported, using legacy context");
            if request.shared_context {
                warn!(target: LOG_TARGET, "Hardware render context disabled");
            }
        }
    }

    guard.commit(core_profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::api::{ApiVersion, ContextApi};
    use crate::gfx::platform::{
        HeadlessOptions, HeadlessPlatform, PixelFormat, PlatformCall, WindowDesc, WindowSystem,
    };

    fn platform_with_drawable(opts: HeadlessOptions) -> (HeadlessPlatform, NativeDrawable) {
        let mut platform = HeadlessPlatform::new(opts);
        let window = platform.create_window(&WindowDesc::default()).unwrap();
        let drawable = platform.acquire_drawable(window).unwrap();
        platform.set_pixel_format(drawable, &PixelFormat::opengl()).unwrap();
        (platform, drawable)
    }

    fn request(major: u32, minor: u32, shared: bool) -> ContextRequest {
        ContextRequest {
            api: ContextApi::OpenGl,
            version: ApiVersion::new(major, minor),
            debug_context: false,
            shared_context: shared,
        }
    }

    #[test]
    fn test_basic_shared_context() {
        let (mut platform, drawable) = platform_with_drawable(HeadlessOptions::default());
        let probe = platform.probe();

        let contexts = create_contexts(&mut platform, drawable, &request(2, 1, true)).unwrap();
        assert!(contexts.shared.is_some());
        assert!(!contexts.core_profile);
        assert_eq!(probe.current_context(), Some(contexts.primary));
        assert_eq!(probe.count(|c| matches!(c, PlatformCall::ShareLists(..))), 1);
    }

    #[test]
    fn test_extended_shared_context_uses_primary_as_partner() {
        let (mut platform, drawable) = platform_with_drawable(HeadlessOptions::default());
        let probe = platform.probe();

        let contexts = create_contexts(&mut platform, drawable, &request(3, 3, true)).unwrap();
        assert!(contexts.core_profile);
        let partner = probe.calls().iter().find_map(|c| match c {
            PlatformCall::CreateContextAttribs { share: Some(share), .. } => Some(*share),
            _ => None,
        });
        assert_eq!(partner, Some(contexts.primary));
        // 基础上下文已经被替换并删除
        assert_eq!(probe.live_contexts(), 2);
    }

    #[test]
    fn test_share_lists_failure_is_not_fatal() {
        let (mut platform, drawable) = platform_with_drawable(HeadlessOptions {
            fail_share_lists: true,
            ..Default::default()
        });
        let probe = platform.probe();

        let contexts = create_contexts(&mut platform, drawable, &request(2, 1, true)).unwrap();
        assert!(contexts.shared.is_none());
        assert_eq!(probe.live_contexts(), 1);
    }

    #[test]
    fn test_make_current_failure_rolls_back() {
        let (mut platform, drawable) = platform_with_drawable(HeadlessOptions {
            fail_make_current: true,
            ..Default::default()
        });
        let probe = platform.probe();

        assert!(create_contexts(&mut platform, drawable, &request(2, 1, true)).is_err());
        assert_eq!(probe.live_contexts(), 0);
        assert_eq!(probe.current_context(), None);
    }

    #[test]
    fn test_attribs_failure_keeps_basic_context() {
        let (mut platform, drawable) = platform_with_drawable(HeadlessOptions {
            fail_attribs_context: true,
            ..Default::default()
        });
        let probe = platform.probe();

        let contexts = create_contexts(&mut platform, drawable, &request(4, 5, false)).unwrap();
        assert!(!contexts.core_profile);
        assert_eq!(probe.current_context(), Some(contexts.primary));
        assert_eq!(probe.live_contexts(), 1);
    }
}
