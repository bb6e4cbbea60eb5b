//! 卡片间的 activity 变化通知
//!
//! 概览卡片选择了新的 activity 后发布通知，打开中的详情对话框据此刷新，
//! 两者之间不需要直接引用。

use tokio::sync::broadcast;
use tracing::debug;

pub const DEFAULT_BUS_CAPACITY: usize = 32;

/// activity 变化通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityChanged {
    /// 跟踪的实体 ID
    pub tracking_key: String,
    pub selected_activity_id: Option<i64>,
}

/// 进程内发布/订阅总线
#[derive(Debug, Clone)]
pub struct ActivityBus {
    sender: broadcast::Sender<ActivityChanged>,
}

impl Default for ActivityBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl ActivityBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布通知，返回收到通知的订阅者数量
    pub fn publish(&self, tracking_key: &str, selected_activity_id: Option<i64>) -> usize {
        debug!(
            "activity-changed: {} -> {:?}",
            tracking_key, selected_activity_id
        );
        self.sender
            .send(ActivityChanged {
                tracking_key: tracking_key.to_string(),
                selected_activity_id,
            })
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityChanged> {
        self.sender.subscribe()
    }
}
