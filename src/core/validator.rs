//! 模型校验模块
//!
//! 按文件名推断模型类型，并用 models/schemas 下对应的 JSON Schema (2020-12)
//! 校验 models/v1 中的每个模型文件。

use crate::core::models::ModelKind;
use crate::core::scanner::find_json_files;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// 读取并解析 JSON 文件
pub fn load_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("无法读取 {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("JSON解析失败 {}", path.display()))
}

/// 已编译的 schema 索引
pub struct SchemaIndex {
    validators: HashMap<ModelKind, jsonschema::Validator>,
}

impl SchemaIndex {
    /// 从 schema 目录加载所有已知类型的 schema
    ///
    /// 缺失或无效的 schema 只记录日志并跳过。
    pub fn load(schemas_dir: &Path) -> Self {
        let mut validators = HashMap::new();

        for kind in ModelKind::ALL {
            let schema_path = schemas_dir.join(kind.schema_file_name());
            if !schema_path.exists() {
                tracing::warn!("缺少 '{}' 的 schema 文件: {}", kind, schema_path.display());
                continue;
            }

            let schema = match load_json(&schema_path) {
                Ok(schema) => schema,
                Err(e) => {
                    tracing::error!("{:#}", e);
                    continue;
                }
            };

            match jsonschema::draft202012::new(&schema) {
                Ok(validator) => {
                    tracing::info!("已加载 '{}' 的 schema: {}", kind, schema_path.display());
                    validators.insert(kind, validator);
                }
                Err(e) => {
                    tracing::error!("无效的 JSON Schema {}: {}", schema_path.display(), e);
                }
            }
        }

        Self { validators }
    }

    /// 是否已加载指定类型的 schema
    pub fn contains(&self, kind: ModelKind) -> bool {
        self.validators.contains_key(&kind)
    }

    /// 已加载的 schema 数量
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// 校验单个模型，返回错误消息列表（为空表示通过）
    pub fn validate(&self, kind: ModelKind, model: &Value) -> Vec<String> {
        let Some(validator) = self.validators.get(&kind) else {
            return vec![format!("No schema loaded for model_type='{}'", kind)];
        };

        let mut errors: Vec<(Vec<PathSegment>, String, String)> = validator
            .iter_errors(model)
            .map(|error| {
                let pointer = error.instance_path.to_string();
                (path_segments(&pointer), display_location(&pointer), error.to_string())
            })
            .collect();

        // 稳定排序，同一位置的错误保持校验器输出顺序
        errors.sort_by(|a, b| a.0.cmp(&b.0));
        errors
            .into_iter()
            .map(|(_, location, message)| format!("{}: {}", location, message))
            .collect()
    }
}

/// 错误位置的路径段，数组下标按数值比较
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PathSegment {
    Index(usize),
    Key(String),
}

fn path_segments(pointer: &str) -> Vec<PathSegment> {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| {
            let segment = segment.replace("~1", "/").replace("~0", "~");
            match segment.parse::<usize>() {
                Ok(index) => PathSegment::Index(index),
                Err(_) => PathSegment::Key(segment),
            }
        })
        .collect()
}

/// 把 JSON Pointer 转为 `a/0/b` 形式，根路径显示为 `<root>`
fn display_location(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        return "<root>".to_string();
    }
    trimmed
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join("/")
}

/// 单个模型文件的校验结果
#[derive(Debug, Clone)]
pub enum ModelOutcome {
    /// 校验通过
    Valid,
    /// 校验失败（错误消息）
    Invalid(Vec<String>),
    /// 无法读取或解析
    Unreadable(String),
    /// 无法从文件名推断类型，已跳过
    Skipped,
}

/// 单个模型文件的报告
#[derive(Debug, Clone)]
pub struct ModelReport {
    /// 相对项目根目录的路径
    pub path: PathBuf,
    /// 推断的类型
    pub kind: Option<ModelKind>,
    /// 结果
    pub outcome: ModelOutcome,
}

/// 校验汇总
#[derive(Debug, Default)]
pub struct ValidationSummary {
    /// 通过数量
    pub ok: usize,
    /// 失败数量
    pub failed: usize,
    /// 跳过数量
    pub skipped: usize,
    /// 逐文件报告
    pub reports: Vec<ModelReport>,
}

impl ValidationSummary {
    /// 是否全部通过
    pub fn is_all_valid(&self) -> bool {
        self.failed == 0
    }

    /// 渲染为终端报告
    pub fn render(&self, pretty: bool) -> String {
        let mut out = String::new();

        for report in &self.reports {
            let rel = report.path.display();
            let kind = report.kind.map(|k| k.key()).unwrap_or("unknown");
            match &report.outcome {
                ModelOutcome::Valid => {
                    let _ = writeln!(out, "[OK]    {}  (type: {})\n", rel, kind);
                }
                ModelOutcome::Invalid(errors) => {
                    let _ = writeln!(out, "[FAIL]  {}  (type: {})", rel, kind);
                    for msg in errors {
                        if pretty {
                            let _ = writeln!(out, "       • {}", msg);
                        } else {
                            let _ = writeln!(out, "       {}", msg);
                        }
                    }
                    out.push('\n');
                }
                ModelOutcome::Unreadable(reason) => {
                    let _ = writeln!(out, "[ERROR] {}  {}\n", rel, reason);
                }
                ModelOutcome::Skipped => {
                    let _ = writeln!(
                        out,
                        "[WARN] Skipping {} - could not infer model type from filename.",
                        rel
                    );
                }
            }
        }

        out.push_str("========== SUMMARY ==========\n");
        let _ = writeln!(out, "  Valid models  : {}", self.ok);
        let _ = writeln!(out, "  Invalid models: {}", self.failed);
        out.push_str("=============================\n");
        out
    }
}

/// 校验 `<project_root>/models/v1` 下的全部模型
pub fn run_validation(project_root: &Path) -> ValidationSummary {
    let models_dir = project_root.join("models").join("v1");
    let schemas_dir = project_root.join("models").join("schemas");

    tracing::info!("模型目录: {}", models_dir.display());
    tracing::info!("schema目录: {}", schemas_dir.display());

    let mut summary = ValidationSummary::default();

    let model_files = find_json_files(&models_dir, false);
    if model_files.is_empty() {
        tracing::warn!("models/v1 中没有模型文件");
        return summary;
    }

    let index = SchemaIndex::load(&schemas_dir);
    if index.is_empty() {
        tracing::warn!("没有可用的 schema，所有模型都将校验失败");
    } else {
        tracing::info!("已加载 {} 个 schema", index.len());
    }
    tracing::info!("发现 {} 个模型文件", model_files.len());

    for model_path in model_files {
        let rel = model_path
            .strip_prefix(project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| model_path.clone());

        let Some(kind) = ModelKind::detect(&model_path) else {
            tracing::warn!("跳过 {}：无法从文件名推断模型类型", rel.display());
            summary.skipped += 1;
            summary.reports.push(ModelReport {
                path: rel,
                kind: None,
                outcome: ModelOutcome::Skipped,
            });
            continue;
        };

        let outcome = match load_json(&model_path) {
            Ok(data) => {
                let errors = index.validate(kind, &data);
                if errors.is_empty() {
                    summary.ok += 1;
                    ModelOutcome::Valid
                } else {
                    summary.failed += 1;
                    ModelOutcome::Invalid(errors)
                }
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                summary.failed += 1;
                ModelOutcome::Unreadable(format!("{:#}", e))
            }
        };

        summary.reports.push(ModelReport {
            path: rel,
            kind: Some(kind),
            outcome,
        });
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_json(path: &Path, value: &Value) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn twin_schema() -> Value {
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "required": ["id", "assets"],
            "properties": {
                "id": {"type": "string"},
                "assets": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["tag"],
                        "properties": {"tag": {"type": "string"}}
                    }
                }
            }
        })
    }

    #[test]
    fn test_display_location() {
        assert_eq!(display_location(""), "<root>");
        assert_eq!(display_location("/assets/0/tag"), "assets/0/tag");
        assert_eq!(display_location("/a~1b"), "a/b");
    }

    #[test]
    fn test_validate_reports_locations() {
        let dir = tempdir().unwrap();
        write_json(
            &dir.path().join("digital_twin_schema.json"),
            &twin_schema(),
        );

        let index = SchemaIndex::load(dir.path());
        assert!(index.contains(ModelKind::DigitalTwin));
        assert_eq!(index.len(), 1);

        let valid = json!({"id": "oyna", "assets": [{"tag": "P-01"}]});
        assert!(index.validate(ModelKind::DigitalTwin, &valid).is_empty());

        let invalid = json!({"assets": [{"tag": 7}]});
        let errors = index.validate(ModelKind::DigitalTwin, &invalid);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("<root>: "));
        assert!(errors[0].contains("id"));
        assert!(errors[1].starts_with("assets/0/tag: "));
    }

    #[test]
    fn test_path_segments() {
        assert!(path_segments("").is_empty());
        assert_eq!(
            path_segments("/assets/10/a~1b"),
            vec![
                PathSegment::Key("assets".to_string()),
                PathSegment::Index(10),
                PathSegment::Key("a/b".to_string()),
            ]
        );
    }

    #[test]
    fn test_errors_sorted_by_numeric_index() {
        let dir = tempdir().unwrap();
        write_json(
            &dir.path().join("knowledge_graph_schema.json"),
            &json!({
                "$schema": "https://json-schema.org/draft/2020-12/schema",
                "type": "object",
                "properties": {"assets": {"type": "array", "items": {"type": "string"}}}
            }),
        );
        let index = SchemaIndex::load(dir.path());

        let mut assets: Vec<Value> = (0..11).map(|i| json!(format!("a{}", i))).collect();
        assets[2] = json!(2);
        assets[10] = json!(10);
        let errors = index.validate(ModelKind::KnowledgeGraph, &json!({"assets": assets}));

        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("assets/2: "));
        assert!(errors[1].starts_with("assets/10: "));
    }

    #[test]
    fn test_validate_without_schema() {
        let dir = tempdir().unwrap();
        let index = SchemaIndex::load(dir.path());
        assert!(index.is_empty());

        let errors = index.validate(ModelKind::Manifest, &json!({}));
        assert_eq!(errors, vec!["No schema loaded for model_type='manifest'"]);
    }

    #[test]
    fn test_invalid_schema_is_skipped() {
        let dir = tempdir().unwrap();
        write_json(
            &dir.path().join("api_contract_schema.json"),
            &json!({"type": 12}),
        );
        fs::write(dir.path().join("manifest_schema.json"), "{ not json").unwrap();

        let index = SchemaIndex::load(dir.path());
        assert!(index.is_empty());
    }

    #[test]
    fn test_run_validation_counts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_json(
            &root.join("models/schemas/digital_twin_schema.json"),
            &twin_schema(),
        );
        write_json(
            &root.join("models/v1/oyna_digital_twin_v1.json"),
            &json!({"id": "oyna", "assets": []}),
        );
        write_json(
            &root.join("models/v1/broken_digital_twin.json"),
            &json!({"id": 1, "assets": []}),
        );
        write_json(&root.join("models/v1/notes.json"), &json!({}));
        fs::write(root.join("models/v1/bad_knowledge_graph.json"), "[").unwrap();

        let summary = run_validation(root);
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.is_all_valid());

        let rendered = summary.render(true);
        assert!(rendered.contains("[OK]    models/v1/oyna_digital_twin_v1.json  (type: digital_twin)"));
        assert!(rendered.contains("[FAIL]  models/v1/broken_digital_twin.json  (type: digital_twin)"));
        assert!(rendered.contains("       • id: "));
        assert!(rendered.contains("  Invalid models: 2"));
    }

    #[test]
    fn test_run_validation_empty() {
        let dir = tempdir().unwrap();
        let summary = run_validation(dir.path());
        assert_eq!(summary.ok + summary.failed + summary.skipped, 0);
        assert!(summary.is_all_valid());
    }
}
