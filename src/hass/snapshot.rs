//! 实体快照数据模型
//!
//! 一次观测到的 hub 实体状态。快照整体替换、从不原地修改，
//! 新旧只通过 `last_updated` 比较。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 集成标识（`integration` 属性）
pub const HUB_INTEGRATION: &str = "sofabaton_hub";

/// 设备类别标识（`device_class` 属性）
pub const HUB_DEVICE_CLASS: &str = "sofabaton";

/// activity_id -> 按键列表
///
/// 某个 activity 缺失表示“从未获取”，存在但为空表示“已获取、无数据”。
pub type KeyMap<T> = BTreeMap<i64, Vec<T>>;

/// 按键数据类别（对话框的三个页面）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCategory {
    Assigned,
    Macro,
    Favorite,
}

impl KeyCategory {
    pub const ALL: [KeyCategory; 3] = [Self::Assigned, Self::Macro, Self::Favorite];

    pub fn index(self) -> usize {
        match self {
            Self::Assigned => 0,
            Self::Macro => 1,
            Self::Favorite => 2,
        }
    }

    /// 页码（1..=3）
    pub fn page_number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn from_page_number(page: u8) -> Option<Self> {
        match page {
            1 => Some(Self::Assigned),
            2 => Some(Self::Macro),
            3 => Some(Self::Favorite),
            _ => None,
        }
    }

    /// 实体属性名，如 `assigned_keys`
    pub fn attribute_name(self) -> &'static str {
        match self {
            Self::Assigned => "assigned_keys",
            Self::Macro => "macro_keys",
            Self::Favorite => "favorite_keys",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Assigned => "Assigned Keys",
            Self::Macro => "Macro Commands",
            Self::Favorite => "Favorite Commands",
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_page_number(self.page_number() + 1)
    }

    pub fn prev(self) -> Option<Self> {
        self.page_number()
            .checked_sub(1)
            .and_then(Self::from_page_number)
    }
}

impl fmt::Display for KeyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Assigned => "assigned",
            Self::Macro => "macro",
            Self::Favorite => "favorite",
        })
    }
}

/// Hub 上的一个 activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    /// "on" 表示正在运行
    #[serde(default, deserialize_with = "lenient::string")]
    pub state: String,
}

impl Activity {
    pub fn is_on(&self) -> bool {
        self.state == "on"
    }
}

/// 宏按键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroKey {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
}

/// 收藏按键（发送时需要附带 device_id）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteKey {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default)]
    pub device_id: Option<i64>,
}

/// Hub 实体属性
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default)]
    pub current_activity_id: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::list"
    )]
    pub activities: Option<Vec<Activity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<serde_json::Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::key_map"
    )]
    pub assigned_keys: Option<KeyMap<i64>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::key_map"
    )]
    pub macro_keys: Option<KeyMap<MacroKey>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::key_map"
    )]
    pub favorite_keys: Option<KeyMap<FavoriteKey>>,
}

impl HubAttributes {
    pub fn activities(&self) -> &[Activity] {
        self.activities.as_deref().unwrap_or(&[])
    }

    pub fn activity(&self, id: i64) -> Option<&Activity> {
        self.activities().iter().find(|a| a.id == id)
    }

    /// 列表顺序中第一个运行中的 activity
    pub fn running_activity(&self) -> Option<&Activity> {
        self.activities().iter().find(|a| a.is_on())
    }

    /// 该类别下是否已有此 activity 的条目（判断存在性，不判断是否为空）
    pub fn has_keys(&self, category: KeyCategory, activity_id: i64) -> bool {
        match category {
            KeyCategory::Assigned => contains(&self.assigned_keys, activity_id),
            KeyCategory::Macro => contains(&self.macro_keys, activity_id),
            KeyCategory::Favorite => contains(&self.favorite_keys, activity_id),
        }
    }

    pub fn assigned_for(&self, activity_id: i64) -> &[i64] {
        lookup(&self.assigned_keys, activity_id)
    }

    pub fn macros_for(&self, activity_id: i64) -> &[MacroKey] {
        lookup(&self.macro_keys, activity_id)
    }

    pub fn favorites_for(&self, activity_id: i64) -> &[FavoriteKey] {
        lookup(&self.favorite_keys, activity_id)
    }

    /// 该类别下此 activity 的按键数量（缺失按 0 计）
    pub fn key_count(&self, category: KeyCategory, activity_id: i64) -> usize {
        match category {
            KeyCategory::Assigned => self.assigned_for(activity_id).len(),
            KeyCategory::Macro => self.macros_for(activity_id).len(),
            KeyCategory::Favorite => self.favorites_for(activity_id).len(),
        }
    }
}

fn contains<T>(map: &Option<KeyMap<T>>, activity_id: i64) -> bool {
    map.as_ref().is_some_and(|m| m.contains_key(&activity_id))
}

fn lookup<T>(map: &Option<KeyMap<T>>, activity_id: i64) -> &[T] {
    map.as_ref()
        .and_then(|m| m.get(&activity_id))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// 实体快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub state: String,
    #[serde(default)]
    pub attributes: HubAttributes,
    pub last_updated: DateTime<Utc>,
}

impl EntitySnapshot {
    /// 是否为 Sofabaton hub 实体
    ///
    /// 只看声明过的属性集合：任一 hub 专属属性存在，或集成/设备类别/
    /// 友好名称能识别出 hub。
    pub fn is_hub_entity(&self) -> bool {
        let attrs = &self.attributes;
        attrs.activities.is_some()
            || attrs.devices.is_some()
            || attrs.current_activity_id.is_some()
            || attrs.assigned_keys.is_some()
            || attrs.macro_keys.is_some()
            || attrs.favorite_keys.is_some()
            || attrs.integration.as_deref() == Some(HUB_INTEGRATION)
            || attrs.device_class.as_deref() == Some(HUB_DEVICE_CLASS)
            || attrs
                .friendly_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(HUB_DEVICE_CLASS))
    }

    pub fn display_name(&self) -> &str {
        self.attributes
            .friendly_name
            .as_deref()
            .unwrap_or("Sofabaton Hub")
    }
}

/// 宽松反序列化
///
/// 集成写入的属性里可能出现 null（名称缺失、key_id 缺失等）。
/// 单个坏条目只丢弃该条目，不让整个快照解析失败。
mod lenient {
    use super::KeyMap;
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::collections::BTreeMap;
    use tracing::debug;

    /// null 视为空字符串
    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
    }

    fn items<T: DeserializeOwned>(values: Vec<Value>) -> Vec<T> {
        values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    debug!("Skipping malformed entry: {}", e);
                    None
                }
            })
            .collect()
    }

    /// 列表中无法解析的条目被跳过
    pub fn list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(Option::<Vec<Value>>::deserialize(deserializer)?.map(items))
    }

    /// activity_id -> 列表；非整数的键和 null 列表被跳过（视为未获取）
    pub fn key_map<'de, D, T>(deserializer: D) -> Result<Option<KeyMap<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let raw = Option::<BTreeMap<String, Option<Vec<Value>>>>::deserialize(deserializer)?;
        Ok(raw.map(|map| {
            map.into_iter()
                .filter_map(|(key, values)| {
                    let activity_id = key.trim().parse::<i64>().ok()?;
                    Some((activity_id, items(values?)))
                })
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> EntitySnapshot {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_home_assistant_state() {
        let snapshot = parse(json!({
            "entity_id": "remote.living_room_hub",
            "state": "on",
            "attributes": {
                "friendly_name": "Living Room Hub",
                "current_activity_id": 3,
                "activities": [
                    {"id": 3, "name": "Watch TV", "state": "on"},
                    {"id": 4, "name": "Music", "state": "off"}
                ],
                "assigned_keys": {"3": [174, 176]},
                "macro_keys": {"3": [{"id": 1, "name": "Power All"}]},
                "favorite_keys": {},
                "icon": "mdi:remote"
            },
            "last_changed": "2024-05-01T10:00:00.000000+00:00",
            "last_updated": "2024-05-01T10:00:01.500000+00:00"
        }));

        assert_eq!(snapshot.attributes.current_activity_id, Some(3));
        assert_eq!(snapshot.attributes.activities().len(), 2);
        assert_eq!(snapshot.attributes.assigned_for(3), &[174, 176]);
        assert_eq!(snapshot.attributes.macros_for(3)[0].name, "Power All");
        assert_eq!(snapshot.attributes.running_activity().map(|a| a.id), Some(3));
        assert!(snapshot.is_hub_entity());
    }

    #[test]
    fn test_absent_and_empty_are_different() {
        let snapshot = parse(json!({
            "entity_id": "remote.hub",
            "attributes": {"assigned_keys": {"7": []}},
            "last_updated": "2024-05-01T10:00:00+00:00"
        }));

        assert!(snapshot.attributes.has_keys(KeyCategory::Assigned, 7));
        assert_eq!(snapshot.attributes.key_count(KeyCategory::Assigned, 7), 0);
        assert!(!snapshot.attributes.has_keys(KeyCategory::Assigned, 8));
        // 整个映射缺失
        assert!(!snapshot.attributes.has_keys(KeyCategory::Macro, 7));
    }

    #[test]
    fn test_hub_predicate() {
        let plain = parse(json!({
            "entity_id": "remote.tv",
            "attributes": {"friendly_name": "TV Remote"},
            "last_updated": "2024-05-01T10:00:00+00:00"
        }));
        assert!(!plain.is_hub_entity());

        let by_name = parse(json!({
            "entity_id": "remote.x",
            "attributes": {"friendly_name": "My SofaBaton X2"},
            "last_updated": "2024-05-01T10:00:00+00:00"
        }));
        assert!(by_name.is_hub_entity());

        let by_integration = parse(json!({
            "entity_id": "remote.y",
            "attributes": {"integration": "sofabaton_hub"},
            "last_updated": "2024-05-01T10:00:00+00:00"
        }));
        assert!(by_integration.is_hub_entity());
    }

    #[test]
    fn test_null_fields_degrade() {
        let snapshot = parse(json!({
            "entity_id": "remote.hub",
            "state": null,
            "attributes": {
                "activities": [
                    {"id": 1, "name": null, "state": "on"},
                    {"id": null, "name": "Broken"}
                ],
                "assigned_keys": {"1": [174, null, 176], "2": null},
                "macro_keys": {"1": [{"id": 3, "name": null}, {"id": null, "name": "x"}]},
                "favorite_keys": {"1": [{"id": 9, "name": null, "device_id": null}]}
            },
            "last_updated": "2024-05-01T10:00:00+00:00"
        }));
        let attrs = &snapshot.attributes;

        assert_eq!(snapshot.state, "");
        assert_eq!(attrs.activities().len(), 1);
        assert_eq!(attrs.activities()[0].name, "");
        assert!(attrs.activities()[0].is_on());
        assert_eq!(attrs.assigned_for(1), &[174, 176]);
        // null 列表等同于未获取
        assert!(!attrs.has_keys(KeyCategory::Assigned, 2));
        assert!(attrs.has_keys(KeyCategory::Assigned, 1));
        assert_eq!(attrs.macros_for(1).len(), 1);
        assert_eq!(attrs.macros_for(1)[0].id, 3);
        assert_eq!(attrs.favorites_for(1)[0].device_id, None);
    }

    #[test]
    fn test_serialized_snapshot_parses_back() {
        let snapshot = parse(json!({
            "entity_id": "remote.hub",
            "attributes": {"assigned_keys": {"7": [174]}, "macro_keys": {"7": []}},
            "last_updated": "2024-05-01T10:00:00+00:00"
        }));
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(parse(value), snapshot);
    }

    #[test]
    fn test_page_navigation() {
        assert_eq!(KeyCategory::Assigned.next(), Some(KeyCategory::Macro));
        assert_eq!(KeyCategory::Favorite.next(), None);
        assert_eq!(KeyCategory::Assigned.prev(), None);
        assert_eq!(KeyCategory::Favorite.prev(), Some(KeyCategory::Macro));
        assert_eq!(KeyCategory::Macro.attribute_name(), "macro_keys");
    }
}
