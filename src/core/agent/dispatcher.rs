//! 调度模块
//!
//! 把推理计划中的每一步交给对应工具执行。
//! 单步失败不会中断计划，失败原因作为该步结果返回。

use crate::core::agent::tools::{HomeAssistantTool, InfluxTool, NodeRedTool, Tool};
use crate::core::models::{AgentConfig, PlanStep};
use serde::Serialize;
use std::collections::HashMap;

/// 计划执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DispatchOutcome {
    /// 恰好一个步骤时直接返回其结果
    Single(String),
    /// 其余情况返回全部结果
    Many(Vec<String>),
}

impl DispatchOutcome {
    fn from_results(mut results: Vec<String>) -> Self {
        if results.len() == 1 {
            DispatchOutcome::Single(results.remove(0))
        } else {
            DispatchOutcome::Many(results)
        }
    }
}

impl std::fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchOutcome::Single(result) => f.write_str(result),
            DispatchOutcome::Many(results) => {
                for (i, result) in results.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}. {}", i + 1, result)?;
                }
                Ok(())
            }
        }
    }
}

/// 调度器
pub struct Dispatcher {
    tools: HashMap<&'static str, Box<dyn Tool>>,
}

impl Dispatcher {
    /// 创建空调度器
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// 按配置注册全部内置工具
    pub fn new(config: &AgentConfig) -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(Box::new(HomeAssistantTool::new(config.home_assistant.clone())));
        dispatcher.register(Box::new(NodeRedTool::new(
            config.nodered.clone(),
            config.nodered_flow_path.clone(),
        )));
        dispatcher.register(Box::new(InfluxTool::new(config.influxdb.clone())));
        tracing::debug!("已注册工具: {:?}", dispatcher.tool_names());
        dispatcher
    }

    /// 注册工具，同名工具会被替换
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// 已注册的工具名（排序后）
    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// 执行计划
    pub async fn execute_plan(&self, plan: &[PlanStep]) -> DispatchOutcome {
        let mut results = Vec::with_capacity(plan.len());

        for step in plan {
            let Some(tool) = self.tools.get(step.tool.as_str()) else {
                tracing::warn!("未知工具: {}", step.tool);
                results.push(format!("Unknown tool: {}", step.tool));
                continue;
            };

            match tool.execute(&step.action, &step.args).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::warn!("工具 {}.{} 执行失败: {}", step.tool, step.action, e);
                    results.push(format!("{}.{} failed: {}", step.tool, step.action, e));
                }
            }
        }

        DispatchOutcome::from_results(results)
    }
}
