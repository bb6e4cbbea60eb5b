//! 配置管理模块
//!
//! 使用 TOML 文件存储配置，遵循 XDG 规范：
//! - Linux: ~/.config/sofabatoncard/config.toml
//! - macOS: ~/Library/Application Support/com.sofabaton.SofabatonCard/config.toml
//! - Windows: %APPDATA%\sofabaton\SofabatonCard\config\config.toml

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use crate::card::FetchConfig;
pub use crate::hass::HassConfig;
pub use crate::sync::SyncConfig;

/// 应用配置（顶层结构）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Home Assistant 连接
    #[serde(default)]
    pub hass: HassConfig,
    /// 状态同步
    #[serde(default)]
    pub sync: SyncConfig,
    /// 按键数据获取与轮询
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl AppConfig {
    /// 获取配置目录路径
    pub fn config_dir() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("com", "sofabaton", "SofabatonCard") {
            Ok(proj_dirs.config_dir().to_path_buf())
        } else {
            // 回退到 ~/.sofabaton-card
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot find home directory"))?;
            Ok(home.join(".sofabaton-card"))
        }
    }

    /// 获取配置文件完整路径
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// 从默认位置加载配置
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// 从指定文件加载配置
    ///
    /// 如果文件不存在，返回默认配置并创建文件
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from: {}", path.display());

        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content).map_err(|e| {
                warn!("Failed to parse config file: {}", e);
                e
            })?;
            info!("Config loaded from: {}", path.display());
            Ok(config)
        } else {
            info!("Config file not found, creating default at: {}", path.display());
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// 保存配置到指定文件
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let dir = path.parent().ok_or_else(|| anyhow!("Invalid config path"))?;

        // 确保目录存在
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            debug!("Created config directory: {}", dir.display());
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, &content)?;

        // 设置文件权限 (Unix only) - 令牌只允许本用户读写
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        info!("Config saved to: {}", path.display());
        Ok(())
    }
}
