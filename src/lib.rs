//! Sofabaton Card - Sofabaton hub 详情对话框引擎
//!
//! 核心库，提供 activity 解析、按键数据的请求/轮询/完成判定、渲染投影，
//! 以及基于 Home Assistant REST API 的状态同步。

pub mod card;
pub mod commands;
pub mod config;
pub mod error;
pub mod hass;
pub mod sync;

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub use card::{ActivityBus, DialogRegistry};
pub use config::AppConfig;
pub use error::{CommandParseError, HassError, HassResult};
pub use hass::{Hass, HassApi, RestClient};
pub use sync::StateSync;

/// 应用全局状态
pub struct AppState {
    /// 应用配置（TOML 文件）
    pub config: Arc<RwLock<AppConfig>>,
    /// 宿主状态存储
    pub hass: Arc<Hass>,
    /// activity 变化总线
    pub bus: ActivityBus,
    /// 当前打开的详情对话框
    pub dialogs: DialogRegistry,
    /// REST 状态同步任务
    pub sync: Arc<RwLock<StateSync>>,
}

impl AppState {
    /// 从默认配置文件创建，并连接 Home Assistant
    pub async fn new() -> anyhow::Result<Self> {
        // 加载配置（从文件，不存在则创建默认）
        let app_config = AppConfig::load()?;
        Self::connect(app_config).await
    }

    /// 使用给定配置连接 Home Assistant
    pub async fn connect(app_config: AppConfig) -> anyhow::Result<Self> {
        if app_config.hass.token.is_none() {
            warn!("No Home Assistant token configured, requests will likely be rejected");
        }

        let client = RestClient::new(app_config.hass.clone())?;
        if let Err(e) = client.check_connection().await {
            warn!("Home Assistant check failed: {}", e);
        }

        Ok(Self::with_api(app_config, Arc::new(client)))
    }

    /// 使用任意服务实现创建
    pub fn with_api(app_config: AppConfig, api: Arc<dyn HassApi>) -> Self {
        let hass = Arc::new(Hass::with_refresh_wait(api, app_config.fetch.refresh_wait()));
        let bus = ActivityBus::default();
        let dialogs = DialogRegistry::new(hass.clone(), bus.clone(), app_config.fetch.clone());
        let sync = StateSync::new(
            hass.clone(),
            app_config.hass.entity_id.clone(),
            app_config.sync.clone(),
        );

        info!("Tracking {}", app_config.hass.entity_id);

        Self {
            config: Arc::new(RwLock::new(app_config)),
            hass,
            bus,
            dialogs,
            sync: Arc::new(RwLock::new(sync)),
        }
    }

    /// 跟踪的实体
    pub async fn entity_id(&self) -> String {
        self.config.read().await.hass.entity_id.clone()
    }

    /// 启动状态同步任务
    pub async fn start_sync(&self) -> anyhow::Result<()> {
        let mut sync = self.sync.write().await;
        sync.start()
    }

    /// 停止状态同步任务
    pub async fn stop_sync(&self) {
        let mut sync = self.sync.write().await;
        sync.stop();
    }

    /// 关闭对话框并停止后台任务
    pub async fn shutdown(&self) {
        self.dialogs.close().await;
        self.stop_sync().await;
    }
}
