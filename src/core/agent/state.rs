//! 工作记忆
//!
//! 代理在一次运行内的键值上下文。

use serde_json::Value;
use std::collections::HashMap;

/// 状态管理器
#[derive(Debug, Default)]
pub struct StateManager {
    memory: HashMap<String, Value>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.memory.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.memory.get(key)
    }

    /// 取值，不存在时返回默认值
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.memory.get(key).cloned().unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}
