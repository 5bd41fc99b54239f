//! 核心数据模型定义
//!
//! 模型文件、清单、知识内容、代理计划以及配置的共享结构。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// 模型类型枚举
/// 每种类型对应 models/schemas 下的一个 JSON Schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// API 契约
    ApiContract,
    /// 数字孪生
    DigitalTwin,
    /// 知识图谱
    KnowledgeGraph,
    /// 主系统模型
    MasterSystemModel,
    /// AI 主清单
    Manifest,
}

impl ModelKind {
    /// 全部类型，顺序与识别优先级一致
    pub const ALL: [ModelKind; 5] = [
        ModelKind::ApiContract,
        ModelKind::DigitalTwin,
        ModelKind::KnowledgeGraph,
        ModelKind::MasterSystemModel,
        ModelKind::Manifest,
    ];

    /// 规范键名
    pub fn key(&self) -> &'static str {
        match self {
            ModelKind::ApiContract => "api_contract",
            ModelKind::DigitalTwin => "digital_twin",
            ModelKind::KnowledgeGraph => "knowledge_graph",
            ModelKind::MasterSystemModel => "master_system_model",
            ModelKind::Manifest => "manifest",
        }
    }

    /// 对应的 schema 文件名
    pub fn schema_file_name(&self) -> String {
        format!("{}_schema.json", self.key())
    }

    /// 根据文件名推断模型类型
    ///
    /// 命名约定：文件名（不含扩展名，小写）包含类型键名即可，
    /// 清单文件为 `ai_master_manifest*` 或包含 `manifest` 但不含 `schema`。
    pub fn detect(path: &Path) -> Option<ModelKind> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.contains("api_contract") {
            return Some(ModelKind::ApiContract);
        }
        if name.contains("digital_twin") {
            return Some(ModelKind::DigitalTwin);
        }
        if name.contains("knowledge_graph") {
            return Some(ModelKind::KnowledgeGraph);
        }
        if name.contains("master_system_model") {
            return Some(ModelKind::MasterSystemModel);
        }
        if name.contains("ai_master_manifest") || (name.contains("manifest") && !name.contains("schema")) {
            return Some(ModelKind::Manifest);
        }

        None
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// 清单条目 - 描述一个模型文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// 模型ID（保留源文件中的 JSON 类型）
    pub id: Value,
    /// 显示名称
    pub name: Value,
    /// 描述
    pub description: Value,
    /// 相对项目根目录的源文件路径
    pub source_file: String,
    /// 端点/工具/操作列表
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Value>,
    /// 模型附带的 schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// 汇总清单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// 清单格式版本
    pub version: u32,
    /// 生成时间
    pub generated_at: DateTime<Utc>,
    /// 模型数量
    pub model_count: usize,
    /// 模型条目
    pub models: Vec<ManifestEntry>,
}

impl Manifest {
    /// 当前清单格式版本
    pub const VERSION: u32 = 1;

    pub fn new(models: Vec<ManifestEntry>) -> Self {
        Self {
            version: Self::VERSION,
            generated_at: Utc::now(),
            model_count: models.len(),
            models,
        }
    }
}

/// 从原始文档中抽取的内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ExtractedContent {
    /// 纯文本
    Text(String),
    /// 图片（data URL）
    Image(String),
}

/// 代理计划中的单个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// 工具名称（home_assistant, nodered, influxdb）
    pub tool: String,
    /// 工具动作
    pub action: String,
    /// 动作参数
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl PlanStep {
    pub fn new(tool: &str, action: &str, args: Map<String, Value>) -> Self {
        Self {
            tool: tool.to_string(),
            action: action.to_string(),
            args,
        }
    }
}

/// 会话记录 - 代理的一次问答
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// 记录ID
    pub id: String,
    /// 提问时间
    pub asked_at: DateTime<Utc>,
    /// 用户问题
    pub query: String,
    /// 推理得到的计划
    pub plan: Vec<PlanStep>,
    /// 执行结果
    pub result: Value,
}

impl Episode {
    pub fn new(query: String, plan: Vec<PlanStep>, result: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asked_at: Utc::now(),
            query,
            plan,
            result,
        }
    }
}

/// 入库状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestionStatus {
    /// 模型返回了合法JSON
    Converted,
    /// 模型返回非法JSON，写入了兜底文档
    RawFallback,
    /// 调用失败，源文件保留在原处
    Failed,
}

/// 知识入库记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    /// 记录ID
    pub id: String,
    /// 处理时间
    pub processed_at: DateTime<Utc>,
    /// 源文件
    pub source_file: PathBuf,
    /// 源文件内容哈希（sha256前16字节）
    pub content_hash: String,
    /// 生成的知识文件
    pub knowledge_file: Option<PathBuf>,
    /// 状态
    pub status: IngestionStatus,
    /// 错误信息（如果有）
    pub error: Option<String>,
}

/// LLM配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API端点URL
    pub api_endpoint: String,
    /// API密钥
    pub api_key: String,
    /// 模型名称
    pub model_name: String,
    /// 最大token数
    pub max_tokens: u32,
    /// 温度参数
    pub temperature: f32,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model_name: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

/// 知识入库目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// 待处理原始文档
    pub raw_dir: PathBuf,
    /// 处理完成后的归档目录
    pub processed_dir: PathBuf,
    /// 知识JSON输出目录
    pub out_dir: PathBuf,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("ai-input/raw"),
            processed_dir: PathBuf::from("ai-input/processed"),
            out_dir: PathBuf::from("knowledge"),
        }
    }
}

/// 单个工具后端的连接配置
/// `base_url` 为空时使用模拟后端
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// 服务基地址
    pub base_url: String,
    /// 访问令牌
    pub token: String,
}

impl BackendConfig {
    pub fn is_live(&self) -> bool {
        !self.base_url.trim().is_empty()
    }
}

/// InfluxDB 后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// 连接信息
    #[serde(flatten)]
    pub backend: BackendConfig,
    /// 组织名
    pub org: String,
    /// 默认查询时间范围（Flux duration）
    pub default_range: String,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            org: "oyna".to_string(),
            default_range: "-1h".to_string(),
        }
    }
}

/// 代理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// 主清单路径
    pub manifest_path: PathBuf,
    /// Home Assistant
    pub home_assistant: BackendConfig,
    /// Node-RED
    pub nodered: BackendConfig,
    /// Node-RED 中接收代理问题的 HTTP-in 路径
    pub nodered_flow_path: String,
    /// InfluxDB
    pub influxdb: InfluxConfig,
    /// 是否把问答写入数据库
    pub record_episodes: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("models/v2/ai_master_manifest_v2.json"),
            home_assistant: BackendConfig::default(),
            nodered: BackendConfig::default(),
            nodered_flow_path: "oyna/agent".to_string(),
            influxdb: InfluxConfig::default(),
            record_episodes: true,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 项目根目录（models/、manifest.json 所在目录）
    pub project_root: PathBuf,
    /// LLM配置
    pub llm: LlmConfig,
    /// 知识入库配置
    pub knowledge: KnowledgeConfig,
    /// 代理配置
    pub agent: AgentConfig,
    /// 数据库路径（为空时使用平台数据目录）
    pub database_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            llm: LlmConfig::default(),
            knowledge: KnowledgeConfig::default(),
            agent: AgentConfig::default(),
            database_path: None,
        }
    }
}
