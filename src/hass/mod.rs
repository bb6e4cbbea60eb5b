//! Home Assistant 宿主接口
//!
//! 对话框引擎只通过这里与共享状态存储打交道：
//! - 读取缓存中的最新快照（推送通道由缓存广播）
//! - 主动拉取刷新某个实体
//! - 发送即发即忘的 `remote.send_command` 命令

mod cache;
pub mod client;
pub mod command;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{StateCache, StateChange};
pub use client::{HassConfig, RestClient};
pub use command::HubCommand;
pub use snapshot::{Activity, EntitySnapshot, FavoriteKey, HubAttributes, KeyCategory, MacroKey};

use crate::error::HassResult;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 默认刷新等待（update_entity 之后、读取状态之前）
pub const DEFAULT_REFRESH_WAIT_MS: u64 = 300;

/// Home Assistant 服务接口
#[async_trait]
pub trait HassApi: Send + Sync {
    /// 读取单个实体的当前状态，实体不存在时返回 None
    async fn get_state(&self, entity_id: &str) -> HassResult<Option<EntitySnapshot>>;

    /// 调用服务
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> HassResult<()>;
}

/// 宿主存储门面：状态缓存 + 服务接口
pub struct Hass {
    api: Arc<dyn HassApi>,
    cache: StateCache,
    /// 正在刷新的实体，避免同一实体的刷新叠加
    refreshing: Mutex<HashSet<String>>,
    refresh_wait: Duration,
}

impl Hass {
    pub fn new(api: Arc<dyn HassApi>) -> Self {
        Self::with_refresh_wait(api, Duration::from_millis(DEFAULT_REFRESH_WAIT_MS))
    }

    pub fn with_refresh_wait(api: Arc<dyn HassApi>, refresh_wait: Duration) -> Self {
        Self {
            api,
            cache: StateCache::default(),
            refreshing: Mutex::new(HashSet::new()),
            refresh_wait,
        }
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// 订阅状态变化（推送通道）
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.cache.subscribe()
    }

    /// 读取最新快照
    ///
    /// 优先返回缓存中的实时数据，否则退回到调用方持有的快照。
    /// 两者都没有时返回 None。
    pub fn latest(
        &self,
        tracked_id: Option<&str>,
        fallback: Option<&EntitySnapshot>,
    ) -> Option<EntitySnapshot> {
        tracked_id
            .and_then(|id| self.cache.get(id))
            .or_else(|| fallback.cloned())
    }

    /// 推送一个新快照（宿主收到状态变化时调用）
    pub fn apply_state(&self, snapshot: EntitySnapshot) -> bool {
        self.cache.replace(snapshot)
    }

    /// 发送 hub 命令
    pub async fn send_command(&self, entity_id: &str, command: &HubCommand) -> HassResult<()> {
        debug!("send_command {} -> {}", entity_id, command);
        self.api
            .call_service(
                "remote",
                "send_command",
                json!({
                    "entity_id": entity_id,
                    "command": command.to_tokens(),
                }),
            )
            .await
    }

    /// 请求宿主重新轮询实体（homeassistant.update_entity）
    pub async fn update_entity(&self, entity_id: &str) -> HassResult<()> {
        self.api
            .call_service(
                "homeassistant",
                "update_entity",
                json!({ "entity_id": entity_id }),
            )
            .await
    }

    /// 从服务端读取实体并写入缓存
    ///
    /// 返回缓存内容是否发生变化。
    pub async fn sync_entity(&self, entity_id: &str) -> HassResult<bool> {
        match self.api.get_state(entity_id).await? {
            Some(snapshot) => Ok(self.cache.replace(snapshot)),
            None => {
                debug!("Entity {} not present on server", entity_id);
                Ok(false)
            }
        }
    }

    /// 强制刷新实体：update_entity，等待片刻，再读取最新状态
    ///
    /// 同一实体已有刷新在进行时直接返回 `Ok(false)`。
    pub async fn refresh_entity(&self, entity_id: &str) -> HassResult<bool> {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing, entity_id) else {
            debug!("Refresh already in progress for {}, skipping", entity_id);
            return Ok(false);
        };

        self.update_entity(entity_id).await?;
        tokio::time::sleep(self.refresh_wait).await;
        let changed = self.sync_entity(entity_id).await?;
        if changed {
            info!("Refreshed {} with newer state", entity_id);
        }
        Ok(true)
    }
}

/// 刷新占位，离开作用域时自动释放
struct RefreshGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    entity_id: String,
}

impl<'a> RefreshGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, entity_id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity_id.to_string());
        inserted.then(|| Self {
            set,
            entity_id: entity_id.to_string(),
        })
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.entity_id);
    }
}
