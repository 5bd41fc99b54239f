//! LLM 客户端模块
//!
//! 负责与 OpenAI 兼容接口或 Ollama 交互。
//! 调用方只提供系统提示、用户文本和可选图片，端点差异在这里消化。

use crate::core::models::LlmConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmApiKind {
    OllamaGenerate,
    OpenAIChatCompletions,
}

/// 一次对话请求
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    /// 系统提示
    pub system: &'a str,
    /// 用户文本
    pub user_text: &'a str,
    /// 图片（data URL）
    pub image_data_url: Option<&'a str>,
}

/// LLM 客户端
pub struct LlmClient {
    /// 配置
    config: LlmConfig,
    /// HTTP客户端
    client: reqwest::Client,
}

impl LlmClient {
    /// 创建新的客户端
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { config, client })
    }

    /// 当前使用的模型名
    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    /// 发送对话请求，返回模型输出的原始文本
    pub async fn chat(&self, request: &ChatRequest<'_>) -> Result<String> {
        let (kind, endpoint) = normalize_endpoint(&self.config.api_endpoint)?;
        tracing::debug!("调用LLM: {:?} {}", kind, endpoint);
        match kind {
            LlmApiKind::OllamaGenerate => self.call_ollama(request, &endpoint).await,
            LlmApiKind::OpenAIChatCompletions => {
                self.call_openai_chat_completions(request, &endpoint).await
            }
        }
    }

    /// 调用Ollama API
    async fn call_ollama(&self, request: &ChatRequest<'_>, endpoint: &str) -> Result<String> {
        #[derive(Serialize)]
        struct OllamaOptions {
            temperature: f32,
            num_predict: u32,
        }

        #[derive(Serialize)]
        struct OllamaRequest {
            model: String,
            system: String,
            prompt: String,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            images: Vec<String>,
            stream: bool,
            options: OllamaOptions,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            response: String,
        }

        // Ollama 只接受裸 base64，去掉 data URL 前缀
        let images = request
            .image_data_url
            .map(|url| url.split_once(',').map(|(_, b64)| b64).unwrap_or(url).to_string())
            .into_iter()
            .collect();

        let body = OllamaRequest {
            model: self.config.model_name.clone(),
            system: request.system.to_string(),
            prompt: request.user_text.to_string(),
            images,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self.client.post(endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM请求失败 ({}): {}", status, text));
        }

        Ok(response.json::<OllamaResponse>().await?.response)
    }

    /// 调用OpenAI兼容API（Chat Completions）
    async fn call_openai_chat_completions(
        &self,
        request: &ChatRequest<'_>,
        endpoint: &str,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct ImageUrl {
            url: String,
        }

        #[derive(Serialize)]
        #[serde(tag = "type", rename_all = "snake_case")]
        enum ContentPart {
            Text { text: String },
            ImageUrl { image_url: ImageUrl },
        }

        #[derive(Serialize)]
        #[serde(untagged)]
        enum MessageBody {
            Plain(String),
            Parts(Vec<ContentPart>),
        }

        #[derive(Serialize)]
        struct Message {
            role: &'static str,
            content: MessageBody,
        }

        #[derive(Serialize)]
        struct OpenAIRequest {
            model: String,
            messages: Vec<Message>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MessageContent,
        }

        #[derive(Deserialize)]
        struct MessageContent {
            #[serde(default)]
            content: Option<String>,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            choices: Vec<Choice>,
        }

        let mut parts = Vec::new();
        if let Some(url) = request.image_data_url {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: url.to_string(),
                },
            });
        }
        parts.push(ContentPart::Text {
            text: request.user_text.to_string(),
        });

        let body = OpenAIRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: MessageBody::Plain(request.system.to_string()),
                },
                Message {
                    role: "user",
                    content: MessageBody::Parts(parts),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut req = self.client.post(endpoint).json(&body);
        if !self.config.api_key.is_empty() {
            req = req.bearer_auth(&self.config.api_key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM请求失败 ({}): {}", status, text));
        }

        let parsed = response.json::<OpenAIResponse>().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| anyhow::anyhow!("LLM返回空响应"))
    }
}

/// 规范化端点地址，推断接口类型
pub fn normalize_endpoint(raw: &str) -> Result<(LlmApiKind, String)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow::anyhow!("LLM API端点为空"));
    }

    // 统一去掉尾部斜杠，避免后续拼接出现双斜杠
    let endpoint = raw.trim_end_matches('/').to_string();

    // Ollama: 允许只填 host（如 http://localhost:11434），自动补齐到 /api/generate
    if endpoint.contains("11434") || endpoint.contains("ollama") {
        if endpoint.contains("/api/generate") {
            return Ok((LlmApiKind::OllamaGenerate, endpoint));
        }
        return Ok((LlmApiKind::OllamaGenerate, format!("{}/api/generate", endpoint)));
    }

    if endpoint.contains("/chat/completions") {
        return Ok((LlmApiKind::OpenAIChatCompletions, endpoint));
    }

    // 常见的 OpenAI 兼容基地址（例如 .../v1）
    if endpoint.ends_with("/v1") {
        return Ok((
            LlmApiKind::OpenAIChatCompletions,
            format!("{}/chat/completions", endpoint),
        ));
    }

    if endpoint.contains("api.openai.com") && !endpoint.contains("/v1") {
        return Ok((
            LlmApiKind::OpenAIChatCompletions,
            format!("{}/v1/chat/completions", endpoint),
        ));
    }

    // 兜底：认为填写的是完整 OpenAI 兼容接口路径
    Ok((LlmApiKind::OpenAIChatCompletions, endpoint))
}
