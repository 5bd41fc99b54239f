//! 知识入库模块
//!
//! 扫描 ai-input/raw 下的原始文档，交给模型转换为结构化 JSON，
//! 写入 knowledge/ 后把源文件移到 ai-input/processed。
//!
//! 模型只负责转换：输出必须是纯 JSON，否则写入兜底文档保留原始输出。

use crate::core::extractor::extract_content;
use crate::core::llm::{ChatRequest, LlmClient};
use crate::core::models::{ExtractedContent, IngestionRecord, IngestionStatus, KnowledgeConfig};
use crate::core::scanner::FileScanner;
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const SYSTEM_PROMPT: &str = "
You are ØynaWaterworksDocAI.
Convert documents and images into structured JSON.
Rules:
- Output pure JSON only.
- No markdown.
- No code blocks.
- No commentary.
";

/// 去掉 ``` 包裹并校验 JSON，成功时返回两空格缩进的 JSON
pub fn clean_json_output(raw: &str) -> Option<String> {
    let mut text = raw.trim().to_string();

    if text.starts_with("```") {
        text = text.replace("```json", "").replace("```", "").trim().to_string();
    }

    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped.trim().to_string();
    }

    let parsed: Value = serde_json::from_str(&text).ok()?;
    serde_json::to_string_pretty(&parsed).ok()
}

/// 模型返回非法 JSON 时的兜底文档
pub fn raw_fallback_document(filename: &str, raw: &str) -> String {
    let doc = json!({
        "module_id": "raw_ai_output",
        "source_filename": filename,
        "error": "Model returned invalid JSON.",
        "raw_content": raw,
    });
    serde_json::to_string_pretty(&doc).unwrap_or_else(|_| doc.to_string())
}

/// 知识文件名：小写文件名主干，空格替换为下划线
pub fn knowledge_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    format!("{}.json", stem.replace(' ', "_"))
}

/// 移动文件，目标已存在时先删除
pub fn move_with_overwrite(src: &Path, dst: &Path) -> Result<()> {
    if dst.exists() {
        fs::remove_file(dst).with_context(|| format!("无法删除 {}", dst.display()))?;
    }

    if fs::rename(src, dst).is_err() {
        // 跨文件系统时 rename 会失败，退回复制后删除
        fs::copy(src, dst)
            .with_context(|| format!("无法移动 {} -> {}", src.display(), dst.display()))?;
        fs::remove_file(src).with_context(|| format!("无法删除 {}", src.display()))?;
    }
    Ok(())
}

/// 文件内容哈希（sha256前16字节）
fn content_hash(path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) => {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            hex::encode(&hasher.finalize()[..16])
        }
        Err(_) => String::new(),
    }
}

/// 单个文档的转换结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// 写入知识文件的 JSON 文本
    pub json: String,
    /// 模型输出是否为合法 JSON
    pub valid: bool,
}

/// 知识转换器
pub struct KnowledgeConverter {
    llm: LlmClient,
}

impl KnowledgeConverter {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// 把抽取出的内容转换为结构化 JSON
    pub async fn convert(&self, content: &ExtractedContent, filename: &str) -> Result<Conversion> {
        let (user_text, image) = match content {
            ExtractedContent::Image(data_url) => (
                format!("Filename: {}\nConvert image to structured JSON.", filename),
                Some(data_url.as_str()),
            ),
            ExtractedContent::Text(text) => (
                format!(
                    "Filename: {}\nDocument:\n{}\nConvert to structured JSON.",
                    filename, text
                ),
                None,
            ),
        };

        let raw = self
            .llm
            .chat(&ChatRequest {
                system: SYSTEM_PROMPT,
                user_text: &user_text,
                image_data_url: image,
            })
            .await?;

        Ok(match clean_json_output(&raw) {
            Some(json) => Conversion { json, valid: true },
            None => {
                tracing::warn!("模型对 {} 返回了非法JSON", filename);
                Conversion {
                    json: raw_fallback_document(filename, &raw),
                    valid: false,
                }
            }
        })
    }
}

/// 入库流程
pub struct KnowledgePipeline {
    converter: KnowledgeConverter,
    dirs: KnowledgeConfig,
}

/// 入库汇总
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// 逐文件记录
    pub records: Vec<IngestionRecord>,
}

impl PipelineReport {
    pub fn count(&self, status: IngestionStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// 获取摘要
    pub fn summary(&self) -> String {
        if self.records.is_empty() {
            return "No files found.".to_string();
        }
        format!(
            "Processed {} file(s): {} converted, {} raw fallback, {} failed",
            self.records.len(),
            self.count(IngestionStatus::Converted),
            self.count(IngestionStatus::RawFallback),
            self.count(IngestionStatus::Failed),
        )
    }
}

impl KnowledgePipeline {
    pub fn new(converter: KnowledgeConverter, dirs: KnowledgeConfig) -> Self {
        Self { converter, dirs }
    }

    /// 处理 raw 目录下的全部文件
    pub async fn run(&self) -> Result<PipelineReport> {
        fs::create_dir_all(&self.dirs.processed_dir)
            .with_context(|| format!("无法创建 {}", self.dirs.processed_dir.display()))?;
        fs::create_dir_all(&self.dirs.out_dir)
            .with_context(|| format!("无法创建 {}", self.dirs.out_dir.display()))?;

        tracing::info!(
            "扫描 {} ...（模型: {}）",
            self.dirs.raw_dir.display(),
            self.converter.llm.model_name()
        );
        let paths = FileScanner::new(self.dirs.raw_dir.clone())
            .include_hidden(true)
            .scan();

        let mut report = PipelineReport::default();
        if paths.is_empty() {
            tracing::info!("没有待处理的文件");
            return Ok(report);
        }

        for path in paths {
            report.records.push(self.process_file(&path).await);
        }

        Ok(report)
    }

    /// 处理单个文件
    ///
    /// 失败只记录到结果中，源文件留在 raw 目录等待下次处理
    async fn process_file(&self, path: &Path) -> IngestionRecord {
        tracing::info!("处理: {}", path.display());

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let hash = content_hash(path);
        let content = extract_content(path);

        let mut record = IngestionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            processed_at: Utc::now(),
            source_file: path.to_path_buf(),
            content_hash: hash,
            knowledge_file: None,
            status: IngestionStatus::Failed,
            error: None,
        };

        let conversion = match self.converter.convert(&content, &filename).await {
            Ok(conversion) => conversion,
            Err(e) => {
                tracing::error!("转换 {} 失败: {:#}", filename, e);
                record.error = Some(format!("{:#}", e));
                return record;
            }
        };

        match self.store(path, &filename, &conversion) {
            Ok(out_file) => {
                record.knowledge_file = Some(out_file);
                record.status = if conversion.valid {
                    IngestionStatus::Converted
                } else {
                    IngestionStatus::RawFallback
                };
            }
            Err(e) => {
                tracing::error!("保存 {} 失败: {:#}", filename, e);
                record.error = Some(format!("{:#}", e));
            }
        }
        record
    }

    /// 写入知识文件并把源文件移到 processed 目录
    fn store(&self, path: &Path, filename: &str, conversion: &Conversion) -> Result<PathBuf> {
        let out_file = self.dirs.out_dir.join(knowledge_file_name(path));
        fs::write(&out_file, &conversion.json)
            .with_context(|| format!("无法写入 {}", out_file.display()))?;
        tracing::info!("已写入知识文件: {}", out_file.display());

        let destination = self.dirs.processed_dir.join(filename);
        move_with_overwrite(path, &destination)?;
        tracing::info!("已移动到: {}", destination.display());
        Ok(out_file)
    }
}
