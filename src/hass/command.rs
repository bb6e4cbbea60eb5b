//! `remote.send_command` 命令词汇
//!
//! 命令以 `key:value` 形式的字符串列表发送，例如
//! `["type:send_assigned_key", "activity_id:1", "key_id:5"]`。

use super::snapshot::KeyCategory;
use crate::error::CommandParseError;
use std::collections::BTreeMap;
use std::fmt;

/// 发往 hub 集成的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCommand {
    RequestAssignedKeys { activity_id: i64 },
    RequestMacroKeys { activity_id: i64 },
    RequestFavoriteKeys { activity_id: i64 },
    SendAssignedKey { activity_id: i64, key_id: i64 },
    SendMacroKey { activity_id: i64, key_id: i64 },
    SendFavoriteKey { activity_id: i64, key_id: i64, device_id: Option<i64> },
    StartActivity { activity_id: i64 },
    StopActivity { activity_id: i64 },
    ClearRequestingKeysFlag,
    RequestBasicData,
}

impl HubCommand {
    /// 请求某类按键数据
    pub fn request_keys(category: KeyCategory, activity_id: i64) -> Self {
        match category {
            KeyCategory::Assigned => Self::RequestAssignedKeys { activity_id },
            KeyCategory::Macro => Self::RequestMacroKeys { activity_id },
            KeyCategory::Favorite => Self::RequestFavoriteKeys { activity_id },
        }
    }

    /// 命令类型名（`type:` 之后的部分）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestAssignedKeys { .. } => "request_assigned_keys",
            Self::RequestMacroKeys { .. } => "request_macro_keys",
            Self::RequestFavoriteKeys { .. } => "request_favorite_keys",
            Self::SendAssignedKey { .. } => "send_assigned_key",
            Self::SendMacroKey { .. } => "send_macro_key",
            Self::SendFavoriteKey { .. } => "send_favorite_key",
            Self::StartActivity { .. } => "start_activity",
            Self::StopActivity { .. } => "stop_activity",
            Self::ClearRequestingKeysFlag => "clear_requesting_keys_flag",
            Self::RequestBasicData => "request_basic_data",
        }
    }

    /// 转换为服务调用使用的 token 列表
    pub fn to_tokens(&self) -> Vec<String> {
        let mut tokens = vec![format!("type:{}", self.kind())];
        match self {
            Self::RequestAssignedKeys { activity_id }
            | Self::RequestMacroKeys { activity_id }
            | Self::RequestFavoriteKeys { activity_id }
            | Self::StartActivity { activity_id }
            | Self::StopActivity { activity_id } => {
                tokens.push(format!("activity_id:{}", activity_id));
            }
            Self::SendAssignedKey { activity_id, key_id }
            | Self::SendMacroKey { activity_id, key_id } => {
                tokens.push(format!("activity_id:{}", activity_id));
                tokens.push(format!("key_id:{}", key_id));
            }
            Self::SendFavoriteKey {
                activity_id,
                key_id,
                device_id,
            } => {
                tokens.push(format!("activity_id:{}", activity_id));
                tokens.push(format!("key_id:{}", key_id));
                if let Some(id) = device_id {
                    tokens.push(format!("device_id:{}", id));
                }
            }
            Self::ClearRequestingKeysFlag | Self::RequestBasicData => {}
        }
        tokens
    }

    /// 解析 token 列表（集成端的解析规则：值能转成整数就按整数处理）
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CommandParseError> {
        let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
        for token in tokens {
            let token = token.as_ref();
            let (key, value) = token
                .split_once(':')
                .ok_or_else(|| CommandParseError::InvalidToken(token.to_string()))?;
            fields.insert(key, value);
        }

        let kind = fields
            .get("type")
            .copied()
            .ok_or(CommandParseError::MissingType)?;
        let int = |field: &'static str| -> Result<i64, CommandParseError> {
            fields
                .get(field)
                .and_then(|v| v.parse::<i64>().ok())
                .ok_or_else(|| CommandParseError::MissingField {
                    command: kind.to_string(),
                    field,
                })
        };

        let command = match kind {
            "request_assigned_keys" => Self::RequestAssignedKeys {
                activity_id: int("activity_id")?,
            },
            "request_macro_keys" => Self::RequestMacroKeys {
                activity_id: int("activity_id")?,
            },
            "request_favorite_keys" => Self::RequestFavoriteKeys {
                activity_id: int("activity_id")?,
            },
            "send_assigned_key" => Self::SendAssignedKey {
                activity_id: int("activity_id")?,
                key_id: int("key_id")?,
            },
            "send_macro_key" => Self::SendMacroKey {
                activity_id: int("activity_id")?,
                key_id: int("key_id")?,
            },
            "send_favorite_key" => Self::SendFavoriteKey {
                activity_id: int("activity_id")?,
                key_id: int("key_id")?,
                device_id: fields.get("device_id").and_then(|v| v.parse().ok()),
            },
            "start_activity" => Self::StartActivity {
                activity_id: int("activity_id")?,
            },
            "stop_activity" => Self::StopActivity {
                activity_id: int("activity_id")?,
            },
            "clear_requesting_keys_flag" => Self::ClearRequestingKeysFlag,
            "request_basic_data" => Self::RequestBasicData,
            other => return Err(CommandParseError::UnknownType(other.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for HubCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tokens().join(" "))
    }
}
