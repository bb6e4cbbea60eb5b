//! 状态同步守护任务
//!
//! 通过 REST 定时拉取跟踪的实体并写入状态缓存。缓存内容变化时由缓存
//! 广播给所有打开的对话框，相当于宿主的推送通道。

use crate::hass::Hass;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// 同步间隔（毫秒）
const DEFAULT_SYNC_INTERVAL_MS: u64 = 2000;

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 同步间隔（毫秒）
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_MS
}

fn default_enabled() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            enabled: default_enabled(),
        }
    }
}

/// 同步任务状态
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub is_running: bool,
    pub is_paused: bool,
    /// 最近一次成功同步（Unix 毫秒）
    pub last_sync_time: Option<i64>,
    pub total_syncs: u64,
    pub total_changes: u64,
    pub consecutive_failures: u64,
}

#[derive(Debug, Default)]
struct SyncCounters {
    last_sync_time: AtomicI64,
    total_syncs: AtomicU64,
    total_changes: AtomicU64,
    consecutive_failures: AtomicU64,
}

/// 状态同步任务
pub struct StateSync {
    hass: Arc<Hass>,
    entity_id: String,
    config: SyncConfig,
    is_running: Arc<AtomicBool>,
    is_paused: Arc<AtomicBool>,
    counters: Arc<SyncCounters>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl StateSync {
    pub fn new(hass: Arc<Hass>, entity_id: impl Into<String>, config: SyncConfig) -> Self {
        Self {
            hass,
            entity_id: entity_id.into(),
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            is_paused: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(SyncCounters::default()),
            shutdown_tx: None,
        }
    }

    /// 启动同步任务
    pub fn start(&mut self) -> anyhow::Result<()> {
        if !self.config.enabled {
            info!("State sync is disabled");
            return Ok(());
        }

        if self.is_running.load(Ordering::SeqCst) {
            warn!("State sync is already running");
            return Ok(());
        }

        info!("Starting state sync for {}...", self.entity_id);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let is_running = self.is_running.clone();
        let is_paused = self.is_paused.clone();
        let counters = self.counters.clone();
        let hass = self.hass.clone();
        let entity_id = self.entity_id.clone();
        let interval_ms = self.config.interval_ms.max(1);

        is_running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(interval_ms));

            info!("State sync loop started (interval: {}ms)", interval_ms);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("State sync received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if is_paused.load(Ordering::SeqCst) {
                            debug!("State sync paused, skipping");
                            continue;
                        }

                        match hass.sync_entity(&entity_id).await {
                            Ok(changed) => {
                                counters.total_syncs.fetch_add(1, Ordering::SeqCst);
                                counters
                                    .last_sync_time
                                    .store(chrono::Utc::now().timestamp_millis(), Ordering::SeqCst);
                                counters.consecutive_failures.store(0, Ordering::SeqCst);
                                if changed {
                                    counters.total_changes.fetch_add(1, Ordering::SeqCst);
                                    debug!("{} changed", entity_id);
                                }
                            }
                            Err(e) => {
                                let failures =
                                    counters.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                                // 持续失败时只在第一次和每 30 次记录一次
                                if failures == 1 || failures % 30 == 0 {
                                    warn!("Failed to sync {} ({} in a row): {}", entity_id, failures, e);
                                }
                            }
                        }
                    }
                }
            }

            is_running.store(false, Ordering::SeqCst);
            info!("State sync loop stopped");
        });

        Ok(())
    }

    /// 停止同步任务
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        self.is_running.store(false, Ordering::SeqCst);
        info!("State sync stopped");
    }

    /// 暂停或恢复同步（任务继续运行，只是跳过拉取）
    pub fn set_paused(&self, paused: bool) {
        self.is_paused.store(paused, Ordering::SeqCst);
        info!("State sync paused: {}", paused);
    }

    pub fn status(&self) -> SyncStatus {
        let last = self.counters.last_sync_time.load(Ordering::SeqCst);
        SyncStatus {
            is_running: self.is_running.load(Ordering::SeqCst),
            is_paused: self.is_paused.load(Ordering::SeqCst),
            last_sync_time: (last > 0).then_some(last),
            total_syncs: self.counters.total_syncs.load(Ordering::SeqCst),
            total_changes: self.counters.total_changes.load(Ordering::SeqCst),
            consecutive_failures: self.counters.consecutive_failures.load(Ordering::SeqCst),
        }
    }
}
