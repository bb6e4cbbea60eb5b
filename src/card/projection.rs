//! 渲染投影
//!
//! 纯函数：(快照, activity 解析结果, 当前页, 在途标记) -> 可显示的视图。

use super::activity::ActivityResolution;
use super::keys::{self, KeyGroup};
use super::tracker::InFlightFlags;
use crate::hass::{EntitySnapshot, FavoriteKey, KeyCategory, MacroKey};
use std::fmt;

/// Activity 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityStatus {
    Running,
    Selected,
    NotStarted,
    Unknown,
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "Running",
            Self::Selected => "Selected",
            Self::NotStarted => "Not Started",
            Self::Unknown => "Unknown Status",
        })
    }
}

/// 顶部 activity 信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityBanner {
    pub name: String,
    pub status: ActivityStatus,
}

/// 没有有效 activity 时的提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusNotice {
    /// activity 列表为空，可能是 hub 未连接
    NoActivities,
    /// 有 activity 但都没运行
    StartActivity,
}

/// 当前页为空时的提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingHint {
    Loading,
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// 已分配且有有效 activity
    Enabled,
    /// 已分配但 activity 未启动
    Partial,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyButton {
    pub group: KeyGroup,
    pub name: &'static str,
    pub id: i64,
    pub state: KeyState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContent {
    Assigned { buttons: Vec<KeyButton> },
    Macro { keys: Vec<MacroKey> },
    Favorite { keys: Vec<FavoriteKey> },
}

/// 对话框视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogView {
    pub title: String,
    pub banner: ActivityBanner,
    pub page: KeyCategory,
    pub notice: Option<StatusNotice>,
    pub hint: Option<LoadingHint>,
    pub content: PageContent,
    pub resolution: ActivityResolution,
    pub in_flight: InFlightFlags,
}

impl DialogView {
    /// 当前页是否正在加载
    pub fn is_loading(&self) -> bool {
        self.hint == Some(LoadingHint::Loading)
    }

    /// 可按下的遥控按键（完全可用）
    pub fn enabled_keys(&self) -> Vec<&KeyButton> {
        match &self.content {
            PageContent::Assigned { buttons } => buttons
                .iter()
                .filter(|b| b.state == KeyState::Enabled)
                .collect(),
            _ => Vec::new(),
        }
    }
}

pub fn project(
    snapshot: &EntitySnapshot,
    resolution: ActivityResolution,
    page: KeyCategory,
    in_flight: InFlightFlags,
) -> DialogView {
    let attrs = &snapshot.attributes;
    let loading = in_flight.get(page);

    let key_match = resolution.key_match;
    let (content, count) = match page {
        KeyCategory::Assigned => {
            let assigned = key_match.map(|id| attrs.assigned_for(id)).unwrap_or(&[]);
            let received = key_match.is_some_and(|id| attrs.has_keys(page, id));
            let has_active = resolution.effective.is_some();
            let buttons = if received && !assigned.is_empty() {
                keys::catalog()
                    .map(|(group, key)| {
                        let is_assigned = assigned.contains(&key.id);
                        let state = match (is_assigned, has_active) {
                            (true, true) => KeyState::Enabled,
                            (true, false) => KeyState::Partial,
                            (false, _) => KeyState::Disabled,
                        };
                        KeyButton {
                            group,
                            name: key.name,
                            id: key.id,
                            state,
                        }
                    })
                    .collect()
            } else {
                Vec::new()
            };
            (PageContent::Assigned { buttons }, assigned.len())
        }
        KeyCategory::Macro => {
            let keys = key_match
                .map(|id| attrs.macros_for(id).to_vec())
                .unwrap_or_default();
            let count = keys.len();
            (PageContent::Macro { keys }, count)
        }
        KeyCategory::Favorite => {
            let keys = key_match
                .map(|id| attrs.favorites_for(id).to_vec())
                .unwrap_or_default();
            let count = keys.len();
            (PageContent::Favorite { keys }, count)
        }
    };

    let hint = (count == 0).then_some(if loading {
        LoadingHint::Loading
    } else {
        LoadingHint::NoData
    });

    let notice = resolution.effective.is_none().then(|| {
        if attrs.activities().is_empty() {
            StatusNotice::NoActivities
        } else {
            StatusNotice::StartActivity
        }
    });

    DialogView {
        title: format!("{} - Remote Control", snapshot.display_name()),
        banner: banner(snapshot, resolution),
        page,
        notice,
        hint,
        content,
        resolution,
        in_flight,
    }
}

fn banner(snapshot: &EntitySnapshot, resolution: ActivityResolution) -> ActivityBanner {
    let attrs = &snapshot.attributes;
    let current = resolution.effective.and_then(|id| attrs.activity(id));
    let key_match = resolution.key_match.and_then(|id| attrs.activity(id));

    match (current, key_match) {
        (Some(activity), _) => ActivityBanner {
            name: activity.name.clone(),
            status: if activity.is_on() {
                ActivityStatus::Running
            } else {
                ActivityStatus::Selected
            },
        },
        (None, Some(activity)) if resolution.effective.is_none() => ActivityBanner {
            name: activity.name.clone(),
            status: ActivityStatus::NotStarted,
        },
        _ => ActivityBanner {
            name: resolution
                .key_match
                .map(|id| format!("Activity {}", id))
                .unwrap_or_else(|| "No Activity".to_string()),
            status: ActivityStatus::Unknown,
        },
    }
}

impl fmt::Display for DialogView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        let icon = if self.banner.status == ActivityStatus::Running {
            "▶"
        } else {
            "⏸"
        };
        writeln!(f, "[{}] {} - {}", icon, self.banner.name, self.banner.status)?;
        writeln!(f, "{} ({}/3)", self.page.title(), self.page.page_number())?;

        match self.notice {
            Some(StatusNotice::NoActivities) => {
                writeln!(f, "! No activities found, please check Hub connection")?
            }
            Some(StatusNotice::StartActivity) => writeln!(
                f,
                "i Please start an activity on the main card to fully control corresponding keys"
            )?,
            None => {}
        }

        match self.hint {
            Some(LoadingHint::Loading) => writeln!(f, "… Loading {} ...", self.page.title())?,
            Some(LoadingHint::NoData) => {
                writeln!(f, "i No {} available for this activity", self.page.title())?
            }
            None => {}
        }

        match &self.content {
            PageContent::Assigned { buttons } => {
                let mut group = None;
                for button in buttons {
                    if group != Some(button.group) {
                        if group.is_some() {
                            writeln!(f)?;
                        }
                        group = Some(button.group);
                    }
                    let mark = match button.state {
                        KeyState::Enabled => "●",
                        KeyState::Partial => "◐",
                        KeyState::Disabled => "○",
                    };
                    write!(f, " {}{}", mark, button.name)?;
                }
                if !buttons.is_empty() {
                    writeln!(f)?;
                }
            }
            PageContent::Macro { keys } => {
                for key in keys {
                    writeln!(f, " [{}] {}", key.id, key.name)?;
                }
            }
            PageContent::Favorite { keys } => {
                for key in keys {
                    writeln!(f, " [{}] {}", key.id, key.name)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::activity::resolve;
    use crate::card::tracker::RequestTracker;
    use crate::hass::test_support::{hub_snapshot, ts};
    use serde_json::json;

    fn tv_snapshot(assigned: serde_json::Value) -> EntitySnapshot {
        hub_snapshot(
            "remote.hub",
            "2024-05-01T10:00:00Z",
            json!({
                "friendly_name": "Living Room",
                "activities": [
                    {"id": 42, "name": "Watch TV", "state": "on"},
                    {"id": 43, "name": "Music", "state": "off"}
                ],
                "assigned_keys": assigned
            }),
        )
    }

    #[test]
    fn test_two_enabled_keys() {
        let snapshot = tv_snapshot(json!({"42": [174, 176]}));
        let view = project(
            &snapshot,
            resolve(Some(42), &snapshot),
            KeyCategory::Assigned,
            InFlightFlags::default(),
        );

        let enabled: Vec<&str> = view.enabled_keys().iter().map(|b| b.name).collect();
        assert_eq!(enabled, vec!["up", "ok"]);
        match &view.content {
            PageContent::Assigned { buttons } => assert_eq!(buttons.len(), 27),
            other => panic!("unexpected content: {:?}", other),
        }
        assert_eq!(view.hint, None);
        assert_eq!(view.banner.status, ActivityStatus::Running);
        assert_eq!(view.title, "Living Room - Remote Control");
    }

    #[test]
    fn test_partial_keys_without_effective_activity() {
        let snapshot = hub_snapshot(
            "remote.hub",
            "2024-05-01T10:00:00Z",
            json!({
                "activities": [{"id": 43, "name": "Music", "state": "off"}],
                "assigned_keys": {"43": [182]}
            }),
        );
        let resolution = resolve(None, &snapshot);
        let view = project(&snapshot, resolution, KeyCategory::Assigned, InFlightFlags::default());

        assert!(view.enabled_keys().is_empty());
        assert_eq!(view.banner.status, ActivityStatus::NotStarted);
        assert_eq!(view.notice, Some(StatusNotice::StartActivity));
        match &view.content {
            PageContent::Assigned { buttons } => {
                let volume = buttons.iter().find(|b| b.name == "volume_up").unwrap();
                assert_eq!(volume.state, KeyState::Partial);
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_loading_versus_no_data() {
        let never_fetched = tv_snapshot(json!({}));
        let resolution = resolve(Some(42), &never_fetched);

        let mut tracker = RequestTracker::new();
        tracker.begin(KeyCategory::Assigned, 42, ts("2024-05-01T10:00:00Z"));
        let loading = project(&never_fetched, resolution, KeyCategory::Assigned, tracker.flags());
        assert!(loading.is_loading());

        tracker.complete(KeyCategory::Assigned);
        let settled = project(&never_fetched, resolution, KeyCategory::Assigned, tracker.flags());
        assert_eq!(settled.hint, Some(LoadingHint::NoData));

        // 已获取但为空：不显示按键面板
        let fetched_empty = tv_snapshot(json!({"42": []}));
        let view = project(&fetched_empty, resolution, KeyCategory::Assigned, tracker.flags());
        assert_eq!(view.hint, Some(LoadingHint::NoData));
        assert_eq!(view.content, PageContent::Assigned { buttons: Vec::new() });
    }

    #[test]
    fn test_macro_page_lists_keys() {
        let snapshot = hub_snapshot(
            "remote.hub",
            "2024-05-01T10:00:00Z",
            json!({
                "current_activity_id": 1,
                "activities": [{"id": 1, "name": "Cinema", "state": "on"}],
                "macro_keys": {"1": [{"id": 3, "name": "Lights Off"}, {"id": 4, "name": "Screen Down"}]}
            }),
        );
        let view = project(
            &snapshot,
            resolve(None, &snapshot),
            KeyCategory::Macro,
            InFlightFlags::default(),
        );
        match view.content {
            PageContent::Macro { keys } => {
                assert_eq!(keys.len(), 2);
                assert_eq!(keys[1].name, "Screen Down");
            }
            other => panic!("unexpected content: {:?}", other),
        }
        assert_eq!(view.hint, None);
    }

    #[test]
    fn test_no_activities_notice() {
        let snapshot = hub_snapshot("remote.hub", "2024-05-01T10:00:00Z", json!({"activities": []}));
        let view = project(
            &snapshot,
            resolve(None, &snapshot),
            KeyCategory::Favorite,
            InFlightFlags::default(),
        );
        assert_eq!(view.notice, Some(StatusNotice::NoActivities));
        assert_eq!(view.banner.name, "No Activity");
        assert_eq!(view.banner.status, ActivityStatus::Unknown);
    }
}
