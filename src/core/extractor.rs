//! 文档内容抽取模块
//!
//! 把原始文档转换为可以发送给模型的文本或图片。
//! 抽取失败不会中断流程，而是把错误写进内容本身。

use crate::core::models::ExtractedContent;
use anyhow::{Context, Result};
use base64::Engine;
use regex::Regex;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

/// 按扩展名抽取文档内容
pub fn extract_content(path: &Path) -> ExtractedContent {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" | "jpg" | "jpeg" => match extract_image_data_url(path) {
            Ok(url) => ExtractedContent::Image(url),
            Err(e) => ExtractedContent::Text(format!("[IMAGE extraction error: {:#}]", e)),
        },
        "pdf" => ExtractedContent::Text(
            extract_text_pdf(path).unwrap_or_else(|e| format!("[PDF extraction error: {:#}]", e)),
        ),
        "docx" => ExtractedContent::Text(
            extract_text_docx(path).unwrap_or_else(|e| format!("[DOCX extraction error: {:#}]", e)),
        ),
        "txt" | "md" => ExtractedContent::Text(
            extract_text_generic(path)
                .unwrap_or_else(|e| format!("[TEXT extraction error: {:#}]", e)),
        ),
        _ => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            tracing::warn!("不支持的文件类型: {}", name);
            ExtractedContent::Text(format!("[UNSUPPORTED FILE TYPE: {}]", name))
        }
    }
}

/// 读取图片并编码为 data URL
pub fn extract_image_data_url(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("无法读取 {}", path.display()))?;
    let is_jpeg = path
        .extension()
        .map(|e| {
            let e = e.to_string_lossy().to_lowercase();
            e == "jpg" || e == "jpeg"
        })
        .unwrap_or(false);
    let mime = if is_jpeg { "image/jpeg" } else { "image/png" };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, encoded))
}

/// 抽取 PDF 全部页面的文本
pub fn extract_text_pdf(path: &Path) -> Result<String> {
    // pdf-extract 遇到个别字体编码会 panic，这里转为普通错误
    let result = std::panic::catch_unwind(|| pdf_extract::extract_text(path))
        .map_err(|_| anyhow::anyhow!("PDF解析器异常终止"))?;
    result.map_err(|e| anyhow::anyhow!("{}", e))
}

/// 抽取 DOCX 段落文本（段落之间用换行分隔）
pub fn extract_text_docx(path: &Path) -> Result<String> {
    let file = fs::File::open(path).with_context(|| format!("无法打开 {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut xml)?;
    Ok(docx_paragraphs(&xml).join("\n"))
}

/// 从 document.xml 中取出各段落的文本
fn docx_paragraphs(xml: &str) -> Vec<String> {
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
    static TEXT_RUN: OnceLock<Regex> = OnceLock::new();

    let paragraph = PARAGRAPH.get_or_init(|| {
        Regex::new(r"(?s)<w:p(?:\s[^>/]*)?>(.*?)</w:p>|<w:p(?:\s[^>]*)?/>").expect("valid regex")
    });
    let text_run = TEXT_RUN
        .get_or_init(|| Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").expect("valid regex"));

    paragraph
        .captures_iter(xml)
        .map(|caps| {
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            text_run
                .captures_iter(body)
                .filter_map(|run| run.get(1))
                .map(|m| unescape_xml(m.as_str()))
                .collect::<String>()
        })
        .collect()
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// 读取纯文本（非法UTF-8按替换字符处理）
pub fn extract_text_generic(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("无法读取 {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
