//! Activity 解析
//!
//! 三个来源，优先级固定：外部选择 > 上报的当前 activity > 列表中第一个运行中的 activity。
//! 按键匹配再额外退回到列表第一项。每次观测都重新计算，不缓存。

use crate::hass::EntitySnapshot;

/// 解析结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityResolution {
    /// 用于显示状态、启动/停止
    pub effective: Option<i64>,
    /// 用于索引按键映射
    pub key_match: Option<i64>,
}

pub fn resolve(external: Option<i64>, snapshot: &EntitySnapshot) -> ActivityResolution {
    let attrs = &snapshot.attributes;
    let effective = external
        .or(attrs.current_activity_id)
        .or_else(|| attrs.running_activity().map(|a| a.id));
    let key_match = external
        .or(effective)
        .or_else(|| attrs.activities().first().map(|a| a.id));

    ActivityResolution {
        effective,
        key_match,
    }
}
