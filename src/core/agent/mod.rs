//! 代理模块
//!
//! OynaAgent 是问答的中心编排器：
//! 推理器把问题变成计划，调度器执行计划，结果写入工作记忆和会话记录。

pub mod dispatcher;
pub mod reasoner;
pub mod state;
pub mod tools;

use crate::core::models::{AgentConfig, Episode};
use crate::core::validator::load_json;
use crate::storage::database::Database;
use anyhow::{Context, Result};
use dispatcher::{DispatchOutcome, Dispatcher};
use reasoner::Reasoner;
use serde_json::Value;
use state::StateManager;
use std::path::Path;

/// Øyna AI 代理
pub struct OynaAgent {
    /// 已加载的主清单
    manifest: Value,
    reasoner: Reasoner,
    dispatcher: Dispatcher,
    state: StateManager,
    /// 会话记录存储（可选）
    episodes: Option<Database>,
}

impl OynaAgent {
    /// 从清单文件创建代理
    pub fn new(manifest_path: &Path, config: &AgentConfig) -> Result<Self> {
        let manifest = load_json(manifest_path)
            .with_context(|| format!("无法加载主清单 {}", manifest_path.display()))?;
        tracing::info!("已加载主清单: {}", manifest_path.display());
        Ok(Self::from_manifest(manifest, config))
    }

    /// 从已解析的清单创建代理
    pub fn from_manifest(manifest: Value, config: &AgentConfig) -> Self {
        let reasoner = Reasoner::from_manifest(&manifest);
        let keywords: Vec<&str> = reasoner.routes().iter().map(|r| r.keyword.as_str()).collect();
        tracing::debug!("路由关键词: {:?}", keywords);

        Self {
            reasoner,
            dispatcher: Dispatcher::new(config),
            state: StateManager::new(),
            manifest,
            episodes: None,
        }
    }

    /// 启用会话记录
    pub fn with_episode_store(mut self, db: Database) -> Self {
        self.episodes = Some(db);
        self
    }

    pub fn manifest(&self) -> &Value {
        &self.manifest
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// 回答问题
    pub async fn ask(&mut self, query: &str) -> Result<DispatchOutcome> {
        let plan = self.reasoner.plan(query);
        tracing::info!("问题: {} -> {} 个步骤", query, plan.len());

        let outcome = self.dispatcher.execute_plan(&plan).await;
        let result = serde_json::to_value(&outcome)?;

        self.state.set("last_query", Value::String(query.to_string()));
        self.state.set("last_plan", serde_json::to_value(&plan)?);
        self.state.set("last_result", result.clone());

        if let Some(db) = &self.episodes {
            let episode = Episode::new(query.to_string(), plan, result);
            // 记录失败不影响回答
            if let Err(e) = db.save_episode(&episode) {
                tracing::warn!("保存会话记录失败: {:#}", e);
            }
        }

        Ok(outcome)
    }
}
