//! Home Assistant REST 客户端
//!
//! 通过 `/api/states` 读取实体状态，通过 `/api/services` 调用服务。
//! 使用长期访问令牌（Bearer）认证。

use super::snapshot::EntitySnapshot;
use super::HassApi;
use crate::error::{HassError, HassResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Home Assistant 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HassConfig {
    /// 实例地址（如 http://homeassistant.local:8123）
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 长期访问令牌
    #[serde(default)]
    pub token: Option<String>,
    /// 跟踪的 hub 实体
    #[serde(default = "default_entity_id")]
    pub entity_id: String,
    /// 单次请求超时（毫秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://homeassistant.local:8123".to_string()
}

fn default_entity_id() -> String {
    "remote.sofabaton_hub".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

impl Default for HassConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            entity_id: default_entity_id(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// REST 客户端
pub struct RestClient {
    config: HassConfig,
    client: reqwest::Client,
}

impl RestClient {
    /// 创建新的客户端
    pub fn new(config: HassConfig) -> HassResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.token {
            Some(ref token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    /// 验证实例可达且令牌有效
    pub async fn check_connection(&self) -> HassResult<()> {
        info!("Checking Home Assistant at {}", self.config.base_url);
        let response = self
            .authorize(self.client.get(self.url("/api/")))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Home Assistant API is reachable");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(HassError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl HassApi for RestClient {
    async fn get_state(&self, entity_id: &str) -> HassResult<Option<EntitySnapshot>> {
        let url = self.url(&format!("/api/states/{}", entity_id));
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url)).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("Entity {} not found", entity_id);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("State fetch failed: status={}, body={}", status, body);
            return Err(HassError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let snapshot: EntitySnapshot = serde_json::from_str(&body)?;
        Ok(Some(snapshot))
    }

    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> HassResult<()> {
        let url = self.url(&format!("/api/services/{}/{}", domain, service));
        debug!("POST {} {}", url, data);

        let start_time = Instant::now();
        let response = self
            .authorize(self.client.post(&url).json(&data))
            .send()
            .await?;
        let status = response.status();

        debug!(
            "Service {}.{} answered {} in {:.2}s",
            domain,
            service,
            status,
            start_time.elapsed().as_secs_f64()
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HassError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
