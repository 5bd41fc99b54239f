//! 推理模块
//!
//! 把用户问题转换为工作计划。路由按优先级匹配关键词，
//! 没有命中时把问题交给 Node-RED 流程处理。

use crate::core::models::PlanStep;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// 内置路由的优先级
const BUILTIN_PRIORITY: u8 = 30;

fn default_priority() -> u8 {
    50
}

/// 关键词路由
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// 问题中需要包含的关键词（不区分大小写）
    pub keyword: String,
    /// 工具名称
    pub tool: String,
    /// 工具动作
    pub action: String,
    /// 动作参数，字符串中的 `{query}` 会替换为原始问题
    #[serde(default)]
    pub args: Map<String, Value>,
    /// 优先级（数字越大优先级越高，0-100）
    #[serde(default = "default_priority")]
    pub priority: u8,
}

impl Route {
    fn builtin(keyword: &str, tool: &str, action: &str, args: Value) -> Self {
        Self {
            keyword: keyword.to_string(),
            tool: tool.to_string(),
            action: action.to_string(),
            args: match args {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            priority: BUILTIN_PRIORITY,
        }
    }

    /// 根据问题渲染计划步骤
    fn render(&self, query: &str) -> PlanStep {
        let args = self
            .args
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => Value::String(s.replace("{query}", query)),
                    other => other.clone(),
                };
                (k.clone(), v)
            })
            .collect();
        PlanStep::new(&self.tool, &self.action, args)
    }
}

/// 推理器
pub struct Reasoner {
    /// 路由列表（按优先级排序）
    routes: Vec<Route>,
}

impl Default for Reasoner {
    fn default() -> Self {
        Self::new()
    }
}

impl Reasoner {
    /// 创建只含内置路由的推理器
    pub fn new() -> Self {
        let mut reasoner = Self { routes: Vec::new() };
        reasoner.load_builtin_routes();
        reasoner
    }

    /// 创建推理器并加载清单中 `agent.routes` 声明的路由
    pub fn from_manifest(manifest: &Value) -> Self {
        let mut reasoner = Self::new();

        let Some(routes) = manifest.pointer("/agent/routes").and_then(Value::as_array) else {
            return reasoner;
        };

        for raw in routes {
            match serde_json::from_value::<Route>(raw.clone()) {
                Ok(route) if route.keyword.trim().is_empty() => {
                    tracing::warn!("忽略关键词为空的路由: {}", raw);
                }
                Ok(route) => reasoner.add_route(route),
                Err(e) => tracing::warn!("忽略无效路由 {}: {}", raw, e),
            }
        }

        tracing::info!("已加载 {} 条路由", reasoner.routes.len());
        reasoner
    }

    /// 加载内置路由
    fn load_builtin_routes(&mut self) {
        self.routes.extend([
            Route::builtin(
                "pumpe",
                "home_assistant",
                "get_entity_state",
                json!({"entity_id": "switch.pressure_pump_contactor"}),
            ),
            Route::builtin(
                "vannforbruk",
                "influxdb",
                "query_latest",
                json!({"bucket": "haos-oyna-waterflow"}),
            ),
        ]);
        self.sort_routes();
    }

    /// 按优先级排序（稳定排序，同优先级保持声明顺序）
    fn sort_routes(&mut self) {
        self.routes.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// 添加路由
    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
        self.sort_routes();
    }

    /// 获取所有路由
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// 为问题生成计划
    pub fn plan(&self, query: &str) -> Vec<PlanStep> {
        let q = query.to_lowercase();

        for route in &self.routes {
            if q.contains(&route.keyword.to_lowercase()) {
                tracing::debug!("问题命中路由: {}", route.keyword);
                return vec![route.render(query)];
            }
        }

        let mut args = Map::new();
        args.insert("query".to_string(), Value::String(query.to_string()));
        vec![PlanStep::new("nodered", "invoke_flow", args)]
    }
}
