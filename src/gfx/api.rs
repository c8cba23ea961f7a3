//! 图形 API 标识与上下文请求
//!
//! `bind_api` 只记录"要创建什么"，真正的上下文在 `set_video_mode` 中创建。

use serde::{Deserialize, Serialize};

/// 渲染 API 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextApi {
    /// 未绑定（重置后的基线状态）
    #[default]
    None,
    /// 桌面 OpenGL
    OpenGl,
    /// OpenGL ES
    OpenGlEs,
    /// OpenVG
    OpenVg,
    /// Vulkan
    Vulkan,
}

impl ContextApi {
    /// 获取 API 名称
    pub fn name(&self) -> &'static str {
        match self {
            ContextApi::None => "None",
            ContextApi::OpenGl => "OpenGL",
            ContextApi::OpenGlEs => "OpenGL ES",
            ContextApi::OpenVg => "OpenVG",
            ContextApi::Vulkan => "Vulkan",
        }
    }
}

/// 请求的 API 版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// 压缩成 `major * 1000 + minor`，便于比较
    pub fn packed(&self) -> u32 {
        self.major * 1000 + self.minor
    }

    /// 3.1 及以上需要通过扩展路径创建带版本号的上下文
    pub fn wants_versioned_context(&self) -> bool {
        self.packed() >= 3001
    }

    /// 3.2 之前不存在 core/compat 之分
    pub fn wants_core_profile(&self) -> bool {
        self.packed() >= 3002
    }
}

/// 一个可选择的渲染后端的描述
///
/// 每个编译进来的后端一份，注册时创建，进程生命周期内不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendDescriptor {
    /// 注册表中的标识（如 "wgl"、"vulkan"）
    pub ident: &'static str,
    /// 后端实现的 API
    pub api: ContextApi,
    /// 人类可读的名称
    pub name: &'static str,
}

/// 一次 `bind_api` 加上硬件渲染回调的参数
///
/// 类似于模拟核心提交的硬件渲染请求：是否需要调试上下文，是否需要
/// 与主上下文共享对象命名空间的第二个上下文。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextRequest {
    pub api: ContextApi,
    pub version: ApiVersion,
    pub debug_context: bool,
    pub shared_context: bool,
}

impl ContextRequest {
    /// 是否需要走扩展创建路径（带版本号或调试标志）
    pub fn needs_extended_creation(&self) -> bool {
        self.version.wants_versioned_context() || self.debug_context
    }
}

/// 扩展创建路径使用的上下文属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextAttribs {
    /// 显式请求的版本，`None` 表示不指定
    pub version: Option<ApiVersion>,
    pub core_profile: bool,
    pub debug: bool,
}

impl ContextAttribs {
    /// 根据请求构造属性列表
    pub fn from_request(request: &ContextRequest) -> Self {
        let versioned = request.version.wants_versioned_context();
        Self {
            version: versioned.then_some(request.version),
            core_profile: versioned && request.version.wants_core_profile(),
            debug: request.debug_context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_thresholds() {
        assert!(!ApiVersion::new(2, 1).wants_versioned_context());
        assert!(!ApiVersion::new(3, 0).wants_versioned_context());
        assert!(ApiVersion::new(3, 1).wants_versioned_context());
        assert!(!ApiVersion::new(3, 1).wants_core_profile());
        assert!(ApiVersion::new(3, 2).wants_core_profile());
        assert!(ApiVersion::new(4, 5).wants_core_profile());
        assert_eq!(ApiVersion::new(4, 5).packed(), 4005);
    }

    #[test]
    fn test_attribs_from_request() {
        let legacy = ContextRequest {
            api: ContextApi::OpenGl,
            version: ApiVersion::new(2, 1),
            ..Default::default()
        };
        assert!(!legacy.needs_extended_creation());
        assert_eq!(ContextAttribs::from_request(&legacy), ContextAttribs::default());

        let debug_only = ContextRequest {
            debug_context: true,
            ..legacy
        };
        assert!(debug_only.needs_extended_creation());
        let attribs = ContextAttribs::from_request(&debug_only);
        assert!(attribs.debug);
        assert!(attribs.version.is_none());
        assert!(!attribs.core_profile);

        let core = ContextRequest {
            version: ApiVersion::new(3, 3),
            ..legacy
        };
        let attribs = ContextAttribs::from_request(&core);
        assert_eq!(attribs.version, Some(ApiVersion::new(3, 3)));
        assert!(attribs.core_profile);
    }
}
