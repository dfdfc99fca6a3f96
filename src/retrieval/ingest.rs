//! 文档导入：读取 .txt / .md 文件（目录则递归遍历）-> 分块 -> 嵌入 -> 写入向量库

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::core::AgentError;
use crate::llm::EmbeddingProvider;
use crate::retrieval::{Chunker, Metadata, VectorRecord, VectorStore};

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// 导入统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    pub skipped: Vec<PathBuf>,
}

pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chunker: Chunker,
    text_field: String,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>, text_field: &str) -> Self {
        Self {
            embedder,
            store,
            chunker: Chunker::default(),
            text_field: text_field.to_string(),
        }
    }

    /// 导入单个文件或整个目录
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport, AgentError> {
        let mut report = IngestReport::default();
        for file in collect_files(path, &mut report.skipped)? {
            let n = self.ingest_file(&file).await?;
            report.files += 1;
            report.chunks += n;
        }
        Ok(report)
    }

    async fn ingest_file(&self, path: &Path) -> Result<usize, AgentError> {
        let text = tokio::fs::read_to_string(path).await?;
        let source = path.display().to_string();
        let doc_id = doc_id_for(path);
        let indexed_at = chrono::Utc::now().to_rfc3339();

        let mut records = Vec::new();
        for chunk in self.chunker.split(&text) {
            let values = self.embedder.embed(&chunk.text).await?;
            if values.is_empty() {
                continue;
            }
            let mut metadata = Metadata::new();
            metadata.insert(self.text_field.clone(), chunk.text.into());
            metadata.insert("source".into(), source.clone().into());
            metadata.insert("chunk".into(), chunk.index.into());
            metadata.insert("offset".into(), chunk.offset.into());
            metadata.insert("indexed_at".into(), indexed_at.clone().into());
            records.push(VectorRecord {
                id: format!("{}_{}", doc_id, chunk.index),
                values,
                metadata,
            });
        }

        // 文档 ID 不含 '_'，前缀只会匹配本文档的块；先清掉旧版本多出来的块
        let stale = self.store.delete_prefix(&format!("{}_", doc_id)).await?;
        if stale > 0 {
            tracing::debug!(file = %source, stale, "removed previous chunks");
        }
        let n = if records.is_empty() {
            0
        } else {
            self.store.upsert(records).await?
        };
        tracing::info!(file = %source, chunks = n, "ingested document");
        Ok(n)
    }
}

fn collect_files(path: &Path, skipped: &mut Vec<PathBuf>) -> Result<Vec<PathBuf>, AgentError> {
    if !path.exists() {
        return Err(AgentError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| AgentError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let p = entry.into_path();
        if is_supported(&p) {
            files.push(p);
        } else {
            tracing::debug!(file = %p.display(), "skipping unsupported file");
            skipped.push(p);
        }
    }
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// 由路径生成稳定的文档 ID（只含 ASCII 字母数字与 '-'；重复导入同一文件会替换旧块）
fn doc_id_for(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}
