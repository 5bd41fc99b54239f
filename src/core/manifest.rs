//! 清单生成模块
//!
//! 扫描模型目录中的全部 JSON 文件，为每个文件提取一个条目，
//! 汇总为项目根目录下的 manifest.json。
//! 模型文件结构尚未统一，所以每个字段都有多个候选键。

use crate::core::models::{Manifest, ManifestEntry};
use crate::core::scanner::find_json_files;
use crate::core::validator::load_json;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// JSON 值是否为“真值”（null、false、0、空字符串、空数组、空对象为假）
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// 按顺序返回第一个真值字段
fn first_truthy<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find(|value| is_truthy(value))
}

/// 标量转为字符串（字符串不带引号）
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 从单个模型文件提取清单条目
pub fn extract_model_entry(path: &Path, data: &Value, project_root: &Path) -> ManifestEntry {
    let source_file = path
        .strip_prefix(project_root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let id = first_truthy(data, &["id", "model_id", "name"])
        .cloned()
        .unwrap_or(Value::String(stem));

    let name = first_truthy(data, &["name"])
        .cloned()
        .unwrap_or_else(|| id.clone());

    let description = first_truthy(data, &["description", "summary"])
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()));

    let endpoints = first_truthy(data, &["endpoints", "tools", "operations"]).cloned();
    let schema = first_truthy(data, &["schema", "json_schema", "openapi_schema"]).cloned();

    ManifestEntry {
        id,
        name,
        description,
        source_file,
        endpoints,
        schema,
    }
}

/// 扫描模型目录并构建清单
pub fn build_manifest(models_dir: &Path, project_root: &Path) -> Manifest {
    let files = find_json_files(models_dir, true);

    tracing::info!("模型目录: {}", models_dir.display());
    tracing::info!("发现 {} 个 JSON 文件", files.len());

    let mut models = Vec::with_capacity(files.len());
    for path in &files {
        let data = match load_json(path) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("{:#}", e);
                continue;
            }
        };

        let entry = extract_model_entry(path, &data, project_root);
        tracing::info!(
            "已添加模型: {} (来自 {})",
            scalar_to_string(&entry.id),
            entry.source_file
        );
        models.push(entry);
    }

    Manifest::new(models)
}

/// 写出清单文件
pub fn write_manifest(manifest: &Manifest, output: &Path, pretty: bool) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建目录 {}", parent.display()))?;
        }
    }

    let content = if pretty {
        serde_json::to_string_pretty(manifest)?
    } else {
        serde_json::to_string(manifest)?
    };

    fs::write(output, content).with_context(|| format!("无法写入 {}", output.display()))?;
    tracing::info!("清单已写入: {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_entry_prefers_id_then_model_id() {
        let root = Path::new("/project");
        let path = Path::new("/project/models/v1/twin.json");

        let entry = extract_model_entry(
            path,
            &json!({"model_id": "twin-1", "summary": "Vannverk", "tools": ["read"]}),
            root,
        );
        assert_eq!(entry.id, "twin-1");
        assert_eq!(entry.name, "twin-1");
        assert_eq!(entry.description, "Vannverk");
        assert_eq!(entry.source_file, "models/v1/twin.json");
        assert_eq!(entry.endpoints, Some(json!(["read"])));
        assert_eq!(entry.schema, None);
    }

    #[test]
    fn test_entry_falls_back_to_stem() {
        let entry = extract_model_entry(
            Path::new("/elsewhere/graph.json"),
            &json!({"id": "", "endpoints": [], "json_schema": {"type": "object"}}),
            Path::new("/project"),
        );
        assert_eq!(entry.id, "graph");
        assert_eq!(entry.name, "graph");
        assert_eq!(entry.description, "");
        assert_eq!(entry.source_file, "/elsewhere/graph.json");
        assert!(entry.endpoints.is_none());
        assert_eq!(entry.schema, Some(json!({"type": "object"})));
    }

    #[test]
    fn test_entry_keeps_json_types() {
        let entry = extract_model_entry(
            Path::new("/p/v1/twin.json"),
            &json!({"id": 42, "description": {"no": "Basseng"}}),
            Path::new("/p"),
        );
        assert_eq!(entry.id, json!(42));
        assert_eq!(entry.name, json!(42));
        assert_eq!(entry.description, json!({"no": "Basseng"}));

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["id"], json!(42));
    }

    #[test]
    fn test_entry_serialization_omits_empty_fields() {
        let entry = extract_model_entry(
            Path::new("/p/m.json"),
            &json!({"name": "Master"}),
            Path::new("/p"),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({"id": "Master", "name": "Master", "description": "", "source_file": "m.json"})
        );
    }

    #[test]
    fn test_build_and_write_manifest() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let models = root.join("models");
        fs::create_dir_all(models.join("v1")).unwrap();
        fs::write(models.join("v1/a.json"), r#"{"id":"a","description":"Pumpestasjon Øyna"}"#).unwrap();
        fs::write(models.join("b.json"), r#"{"name":"b"}"#).unwrap();
        fs::write(models.join("v1/broken.json"), "{").unwrap();

        let manifest = build_manifest(&models, root);
        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.model_count, 2);
        let ids: Vec<_> = manifest.models.iter().map(|m| m.id.as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let output = root.join("out/manifest.json");
        write_manifest(&manifest, &output, false).unwrap();
        let written = fs::read_to_string(&output).unwrap();
        assert!(written.contains("Pumpestasjon Øyna"));
        assert!(!written.contains('\n'));

        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["model_count"], 2);

        write_manifest(&manifest, &output, true).unwrap();
        let pretty = fs::read_to_string(&output).unwrap();
        assert!(pretty.contains("\n  \"version\": 1"));
    }
}
