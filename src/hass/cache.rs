//! 实体状态缓存
//!
//! 本地保存每个实体最新的快照，并在快照变化时广播通知（推送通道）。

use super::snapshot::EntitySnapshot;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// 默认通知缓冲区大小
pub const DEFAULT_CHANGE_BUFFER: usize = 64;

/// 状态变化通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub entity_id: String,
    pub last_updated: DateTime<Utc>,
}

/// 实体状态缓存
pub struct StateCache {
    states: RwLock<HashMap<String, EntitySnapshot>>,
    changes: broadcast::Sender<StateChange>,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_BUFFER)
    }
}

impl StateCache {
    pub fn new(buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(buffer.max(1));
        Self {
            states: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// 读取实体快照（克隆）
    pub fn get(&self, entity_id: &str) -> Option<EntitySnapshot> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    /// 整体替换实体快照
    ///
    /// 内容有变化时返回 true 并广播通知；内容完全相同时不通知。
    pub fn replace(&self, snapshot: EntitySnapshot) -> bool {
        let change = StateChange {
            entity_id: snapshot.entity_id.clone(),
            last_updated: snapshot.last_updated,
        };

        let changed = {
            let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
            match states.get(&snapshot.entity_id) {
                Some(existing) if *existing == snapshot => false,
                _ => {
                    states.insert(snapshot.entity_id.clone(), snapshot);
                    true
                }
            }
        };

        if changed {
            debug!(
                "State replaced: {} (last_updated={})",
                change.entity_id, change.last_updated
            );
            // 没有订阅者时发送失败，忽略即可
            let _ = self.changes.send(change);
        }
        changed
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}
