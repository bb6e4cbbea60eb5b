//! 测试替身：记录服务调用的内存 Home Assistant

use super::command::HubCommand;
use super::snapshot::EntitySnapshot;
use super::HassApi;
use crate::error::{HassError, HassResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: serde_json::Value,
}

#[derive(Default)]
pub(crate) struct MockHass {
    states: Mutex<HashMap<String, EntitySnapshot>>,
    calls: Mutex<Vec<ServiceCall>>,
    reject_commands: AtomicBool,
}

impl MockHass {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 设置服务端状态（下一次 get_state 可见）
    pub fn set_state(&self, snapshot: EntitySnapshot) {
        self.states
            .lock()
            .unwrap()
            .insert(snapshot.entity_id.clone(), snapshot);
    }

    /// 让 remote.send_command 调用失败
    pub fn reject_commands(&self, reject: bool) {
        self.reject_commands.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// 已发送的 hub 命令（按发送顺序）
    pub fn commands(&self) -> Vec<HubCommand> {
        self.calls()
            .into_iter()
            .filter(|c| c.domain == "remote" && c.service == "send_command")
            .map(|c| {
                let tokens: Vec<String> =
                    serde_json::from_value(c.data["command"].clone()).unwrap();
                HubCommand::parse(&tokens).unwrap()
            })
            .collect()
    }
}

#[async_trait]
impl HassApi for MockHass {
    async fn get_state(&self, entity_id: &str) -> HassResult<Option<EntitySnapshot>> {
        Ok(self.states.lock().unwrap().get(entity_id).cloned())
    }

    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> HassResult<()> {
        self.calls.lock().unwrap().push(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        });
        if domain == "remote" && self.reject_commands.load(Ordering::SeqCst) {
            return Err(HassError::Rejected("hub offline".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn ts(value: &str) -> DateTime<Utc> {
    value.parse().unwrap()
}

/// 没有属性的快照
pub(crate) fn snapshot_at(entity_id: &str, last_updated: &str) -> EntitySnapshot {
    hub_snapshot(entity_id, last_updated, serde_json::json!({}))
}

/// 由 JSON 属性构造快照
pub(crate) fn hub_snapshot(
    entity_id: &str,
    last_updated: &str,
    attributes: serde_json::Value,
) -> EntitySnapshot {
    serde_json::from_value(serde_json::json!({
        "entity_id": entity_id,
        "state": "on",
        "attributes": attributes,
        "last_updated": last_updated,
    }))
    .unwrap()
}
