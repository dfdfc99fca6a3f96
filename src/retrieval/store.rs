//! 向量库抽象
//!
//! 检索工具只依赖 VectorStore：query 按相似度降序返回前 K 条段落；upsert / delete_prefix 供文档导入写入与清理旧块。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, VectorStoreProvider};
use crate::core::AgentError;
use crate::retrieval::{LocalVectorStore, PineconeVectorStore};

/// 元数据（与 Pinecone metadata 一致的扁平 JSON 对象）
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// 待写入的向量记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// 检索结果：段落原文、相似度与元数据
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 返回与 vector 最相近的至多 k 条段落，按相似度降序
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Passage>, AgentError>;

    /// 写入（同 id 覆盖），返回写入条数
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, AgentError>;

    /// 删除 id 以 prefix 开头的全部记录，返回删除条数
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, AgentError>;
}

/// 从元数据中取段落原文
pub(crate) fn passage_text(metadata: &Metadata, text_field: &str) -> String {
    match metadata.get(text_field).and_then(|v| v.as_str()) {
        Some(t) => t.to_string(),
        None => {
            tracing::warn!(field = text_field, "passage metadata has no text field");
            String::new()
        }
    }
}

/// 余弦相似度
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 根据 [vector_store] 段创建后端
pub fn create_vector_store(cfg: &AppConfig) -> Result<Arc<dyn VectorStore>, AgentError> {
    let section = &cfg.vector_store;
    match section.provider {
        VectorStoreProvider::Local => {
            tracing::info!(path = %section.path.display(), "Using local vector store");
            Ok(Arc::new(LocalVectorStore::open(&section.path, &section.text_field)?))
        }
        VectorStoreProvider::Pinecone => {
            tracing::info!("Using Pinecone vector store");
            Ok(Arc::new(PineconeVectorStore::from_config(section)?))
        }
    }
}
