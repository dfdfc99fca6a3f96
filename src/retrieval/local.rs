//! 本地向量库：内存中按余弦相似度检索，可选 JSON 快照文件持久化

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::AgentError;
use crate::retrieval::store::{cosine_similarity, passage_text};
use crate::retrieval::{Passage, VectorRecord, VectorStore};

pub struct LocalVectorStore {
    entries: RwLock<Vec<VectorRecord>>,
    /// 快照路径；None 表示纯内存
    path: Option<PathBuf>,
    text_field: String,
}

impl LocalVectorStore {
    /// 纯内存实例
    pub fn in_memory(text_field: &str) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            path: None,
            text_field: text_field.to_string(),
        }
    }

    /// 打开快照文件；文件不存在时从空库开始，首次 upsert 时创建
    pub fn open(path: &Path, text_field: &str) -> Result<Self, AgentError> {
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<Vec<VectorRecord>>(&raw).map_err(|e| {
                AgentError::ConfigError(format!("corrupt index {}: {}", path.display(), e))
            })?
        } else {
            Vec::new()
        };
        tracing::debug!(entries = entries.len(), path = %path.display(), "opened local index");
        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path.to_path_buf()),
            text_field: text_field.to_string(),
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn save(&self, entries: &[VectorRecord]) -> Result<(), AgentError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string(entries)
            .map_err(|e| AgentError::ConfigError(format!("serialize index: {}", e)))?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Passage>, AgentError> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &VectorRecord)> = entries
            .iter()
            .map(|r| (cosine_similarity(vector, &r.values), r))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, r)| Passage {
                id: r.id.clone(),
                text: passage_text(&r.metadata, &self.text_field),
                score,
                metadata: r.metadata.clone(),
            })
            .collect())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, AgentError> {
        let mut entries = self.entries.write().await;
        let n = records.len();
        for record in records {
            match entries.iter_mut().find(|e| e.id == record.id) {
                Some(existing) => *existing = record,
                None => entries.push(record),
            }
        }
        self.save(&entries).await?;
        Ok(n)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, AgentError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !e.id.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            self.save(&entries).await?;
        }
        Ok(removed)
    }
}
