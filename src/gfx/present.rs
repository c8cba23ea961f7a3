//! 交换/呈现控制
//!
//! 交换间隔约定：
//!
//! - `0`：不节流，立即呈现
//! - `N > 0`：每 N 次刷新同步一次
//! - `N < 0`：自适应垂直同步（迟到的帧允许撕裂），只有在驱动声明支持
//!   `*_swap_control_tear` 或松弛 FIFO 时才生效，否则退化为 `|N|`

use serde::{Deserialize, Serialize};
use tracing::warn;

/// 交换链呈现模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    /// 不等待垂直同步
    Immediate,
    /// 邮箱模式，替换排队中的帧
    Mailbox,
    /// 标准垂直同步队列
    Fifo,
    /// 迟到时不等待的垂直同步（自适应）
    FifoRelaxed,
}

/// 将请求的交换间隔解析为实际交给操作系统的间隔
///
/// 不支持自适应时，负值不会原样下发。
pub fn resolve_interval(requested: i32, adaptive_supported: bool) -> i32 {
    if requested < 0 && !adaptive_supported {
        let fallback = requested.saturating_abs();
        warn!(
            requested,
            fallback, "Adaptive VSync requested but not supported, falling back to regular VSync"
        );
        return fallback;
    }
    requested
}

/// 将交换间隔映射为交换链呈现模式
///
/// 交换链无法表达"每 N 次刷新"，所有正值都映射为 FIFO。
pub fn present_mode_for_interval(interval: i32, supported: &[PresentMode]) -> PresentMode {
    let adaptive = supported.contains(&PresentMode::FifoRelaxed);
    let interval = resolve_interval(interval, adaptive);

    let wanted = match interval {
        0 => PresentMode::Immediate,
        n if n < 0 => PresentMode::FifoRelaxed,
        _ => PresentMode::Fifo,
    };

    if supported.contains(&wanted) {
        return wanted;
    }

    // FIFO 是唯一保证存在的模式
    if wanted == PresentMode::Immediate && supported.contains(&PresentMode::Mailbox) {
        PresentMode::Mailbox
    } else {
        PresentMode::Fifo
    }
}

/// 每帧呈现使用的可变状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentState {
    /// 请求的交换间隔
    pub swap_interval: i32,
    /// 交换链是否需要重建（仅显式交换链后端）
    pub needs_swapchain_rebuild: bool,
    /// 最近一次真正下发给平台的间隔
    pub effective_interval: Option<i32>,
}

impl Default for PresentState {
    fn default() -> Self {
        Self {
            swap_interval: 1,
            needs_swapchain_rebuild: false,
            effective_interval: None,
        }
    }
}

impl PresentState {
    /// 记录新的间隔，返回是否发生了变化
    pub fn request_interval(&mut self, interval: i32) -> bool {
        let changed = self.swap_interval != interval;
        self.swap_interval = interval;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_interval() {
        assert_eq!(resolve_interval(0, false), 0);
        assert_eq!(resolve_interval(2, false), 2);
        assert_eq!(resolve_interval(-1, true), -1);
        // 不支持自适应时 -1 退化为 1，不会把 -1 交给操作系统
        assert_eq!(resolve_interval(-1, false), 1);
        assert_eq!(resolve_interval(-2, false), 2);
        assert_eq!(resolve_interval(i32::MIN, false), i32::MAX);
    }

    #[test]
    fn test_present_mode_mapping() {
        let all = [
            PresentMode::Immediate,
            PresentMode::Mailbox,
            PresentMode::Fifo,
            PresentMode::FifoRelaxed,
        ];
        assert_eq!(present_mode_for_interval(0, &all), PresentMode::Immediate);
        assert_eq!(present_mode_for_interval(1, &all), PresentMode::Fifo);
        assert_eq!(present_mode_for_interval(3, &all), PresentMode::Fifo);
        assert_eq!(present_mode_for_interval(-1, &all), PresentMode::FifoRelaxed);

        let fifo_only = [PresentMode::Fifo];
        assert_eq!(present_mode_for_interval(0, &fifo_only), PresentMode::Fifo);
        assert_eq!(present_mode_for_interval(-1, &fifo_only), PresentMode::Fifo);

        let mailbox = [PresentMode::Fifo, PresentMode::Mailbox];
        assert_eq!(present_mode_for_interval(0, &mailbox), PresentMode::Mailbox);
    }

    #[test]
    fn test_request_interval_reports_change() {
        let mut state = PresentState::default();
        assert!(!state.request_interval(1));
        assert!(state.request_interval(0));
        assert_eq!(state.swap_interval, 0);
    }
}
