//! 能力标志位
//!
//! 菜单、着色器子系统通过这些标志判断哪些着色器语言和垂直同步模式可用。
//! 标志在上下文（重新）创建时由驱动自省得出，调用方只读；
//! `set_flags` 只能追加后端允许强制开启的位。

use bitflags::bitflags;

bitflags! {
    /// 上下文能力位集合
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeatureFlags: u32 {
        const ADAPTIVE_VSYNC                = 1 << 0;
        const HARD_SYNC                     = 1 << 1;
        const BLACK_FRAME_INSERTION         = 1 << 2;
        const MENU_FRAME_FILTERING          = 1 << 3;
        const GL_CORE_CONTEXT               = 1 << 4;
        const SHADERS_CG                    = 1 << 5;
        const SHADERS_GLSL                  = 1 << 6;
        const SHADERS_SLANG                 = 1 << 7;
        const CUSTOMIZABLE_SWAPCHAIN_IMAGES = 1 << 8;
        const SCREENSHOTS_SUPPORTED         = 1 << 9;
    }
}

/// 能力注册表
///
/// `detected` 来自上下文创建后的自省，`forced` 来自协作方的 `set_flags`。
/// 两者分开保存，重新自省时只刷新 `detected`，不会清掉强制位。
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    detected: FeatureFlags,
    forced: FeatureFlags,
    overridable: FeatureFlags,
}

impl Capabilities {
    /// 创建注册表，`overridable` 是允许通过 `set_flags` 强制开启的位
    pub fn new(overridable: FeatureFlags) -> Self {
        Self {
            detected: FeatureFlags::empty(),
            forced: FeatureFlags::empty(),
            overridable,
        }
    }

    /// 当前有效的标志
    pub fn flags(&self) -> FeatureFlags {
        self.detected | self.forced
    }

    /// 用自省结果替换已检测的标志
    pub fn set_detected(&mut self, flags: FeatureFlags) {
        self.detected = flags;
    }

    /// 追加强制标志，返回被忽略的位
    pub fn force(&mut self, flags: FeatureFlags) -> FeatureFlags {
        self.forced |= flags & self.overridable;
        flags - self.overridable
    }

    pub fn contains(&self, flag: FeatureFlags) -> bool {
        self.flags().contains(flag)
    }

    /// 回到未创建上下文时的零值
    pub fn reset(&mut self) {
        self.detected = FeatureFlags::empty();
        self.forced = FeatureFlags::empty();
    }
}

/// 判断以空格分隔的扩展字符串中是否包含某个扩展
///
/// 必须整词匹配：`WGL_EXT_swap_control` 不能匹配到 `WGL_EXT_swap_control_tear`。
pub fn has_extension(extension: &str, extensions: Option<&str>) -> bool {
    if extension.is_empty() || extension.contains(' ') {
        return false;
    }

    extensions
        .map(|list| list.split_ascii_whitespace().any(|e| e == extension))
        .unwrap_or(false)
}
