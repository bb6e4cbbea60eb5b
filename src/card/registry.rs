//! 对话框注册表
//!
//! 同一时间只保留一个详情对话框。打开新的之前先关闭旧的并等待其清理完成。

use super::bus::ActivityBus;
use super::dialog::{self, DialogHandle, DialogOptions, FetchConfig};
use crate::hass::{EntitySnapshot, Hass, KeyCategory};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// 是否应由详情对话框接管该实体的 more-info 请求
pub fn should_intercept(entity_id: &str, snapshot: &EntitySnapshot) -> bool {
    entity_id.starts_with("remote.") && snapshot.is_hub_entity()
}

pub struct DialogRegistry {
    hass: Arc<Hass>,
    bus: ActivityBus,
    config: FetchConfig,
    current: Mutex<Option<DialogHandle>>,
}

impl DialogRegistry {
    pub fn new(hass: Arc<Hass>, bus: ActivityBus, config: FetchConfig) -> Self {
        Self {
            hass,
            bus,
            config,
            current: Mutex::new(None),
        }
    }

    /// 打开对话框，已有的对话框先关闭
    pub async fn open(&self, options: DialogOptions) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            info!("Closing dialog {} before opening a new one", previous.id());
            previous.close().await;
        }
        *current = Some(dialog::open(
            self.hass.clone(),
            &self.bus,
            self.config.clone(),
            options,
        ));
    }

    /// more-info 请求入口
    ///
    /// 返回 true 表示已由详情对话框处理；否则调用方走默认流程。
    pub async fn open_more_info(
        &self,
        entity_id: &str,
        selected_activity_id: Option<i64>,
    ) -> bool {
        let Some(snapshot) = self.hass.latest(Some(entity_id), None) else {
            debug!("No state for {}, not intercepting", entity_id);
            return false;
        };
        if !should_intercept(entity_id, &snapshot) {
            return false;
        }

        let options = DialogOptions::new(entity_id)
            .with_fallback(snapshot)
            .with_selected_activity(selected_activity_id)
            .with_page(KeyCategory::Assigned);
        self.open(options).await;
        true
    }

    /// 关闭当前对话框
    pub async fn close(&self) -> bool {
        match self.current.lock().await.take() {
            Some(handle) => {
                handle.close().await;
                true
            }
            None => false,
        }
    }

    /// 当前对话框（持有期间不能打开或关闭对话框）
    pub async fn current(&self) -> MutexGuard<'_, Option<DialogHandle>> {
        self.current.lock().await
    }
}
