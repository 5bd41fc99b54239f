//! 配置文件管理模块

use crate::core::models::AppConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// 配置管理器
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// 创建配置管理器
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// 获取默认配置路径
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("no", "oyna", "Oyna")
            .map(|d| d.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// 加载配置（文件不存在时使用默认值），并应用环境变量
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = self.load_file()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// 只读取配置文件，不应用环境变量
    pub fn load_file(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            let content = std::fs::read_to_string(&self.config_path)
                .with_context(|| format!("无法读取配置 {}", self.config_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("配置格式错误 {}", self.config_path.display()))
        } else {
            Ok(AppConfig::default())
        }
    }

    /// 保存配置
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        // 确保目录存在
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// 重置为默认配置
    pub fn reset(&self) -> Result<()> {
        self.save(&AppConfig::default())
    }
}

/// 环境变量只填补配置中为空的密钥
pub fn apply_env_overrides(config: &mut AppConfig, env: impl Fn(&str) -> Option<String>) {
    let fill = |slot: &mut String, key: &str| {
        if slot.is_empty() {
            if let Some(value) = env(key).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    };

    fill(&mut config.llm.api_key, "OPENAI_API_KEY");
    fill(&mut config.agent.home_assistant.token, "OYNA_HA_TOKEN");
    fill(&mut config.agent.influxdb.backend.token, "OYNA_INFLUX_TOKEN");
}
