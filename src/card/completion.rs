//! 请求完成判定
//!
//! 数据存在且快照在请求发出之后更新过，才算等到了本次请求的结果。
//! 只看存在性会把上一次请求留下的数据误判为新数据。

use crate::hass::{EntitySnapshot, KeyCategory};
use chrono::{DateTime, Utc};

/// 该类别下是否已有 activity 的条目（空列表也算）
pub fn has_data(category: KeyCategory, activity_id: i64, snapshot: &EntitySnapshot) -> bool {
    snapshot.attributes.has_keys(category, activity_id)
}

/// 在途请求是否已经得到结果
pub fn is_satisfied(
    category: KeyCategory,
    activity_id: i64,
    snapshot: &EntitySnapshot,
    issued_at: Option<DateTime<Utc>>,
) -> bool {
    let updated_after_issue = issued_at.is_some_and(|issued| snapshot.last_updated > issued);
    has_data(category, activity_id, snapshot) && updated_after_issue
}
