//! 嵌入 API：供检索工具与文档导入使用，调用 OpenAI 兼容的 /embeddings 端点

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::AppConfig;
use crate::core::AgentError;

/// 嵌入提供方：文本 -> 固定维度向量
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError>;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key.unwrap_or("sk-placeholder").to_string();

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    /// 从应用配置创建：端点优先用 [embedding].base_url，否则沿用 [llm].base_url；密钥与 LLM 共用
    pub fn from_config(cfg: &AppConfig) -> Self {
        let base_url = cfg
            .embedding
            .base_url
            .as_deref()
            .or(cfg.llm.base_url.as_deref());
        let key = cfg.llm.resolved_api_key();
        Self::new(base_url, &cfg.embedding.model, key.as_deref())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| AgentError::ProtocolViolation(e.to_string()))?;
        let response = self.client.embeddings().create(request).await?;
        let vec = response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| AgentError::Transport("embedding response without data".into()))?;
        tracing::debug!(dims = vec.len(), "embedded text");
        Ok(vec)
    }
}
