//! Pinecone 向量库（REST 数据面）
//!
//! - 检索：POST {host}/query，includeMetadata = true
//! - 写入：POST {host}/vectors/upsert，每批至多 100 条
//! - 按前缀删除：GET {host}/vectors/list?prefix= 分页列出 id，再 POST {host}/vectors/delete
//! 非 2xx 响应一律视为 Transport 失败。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::VectorStoreSection;
use crate::core::AgentError;
use crate::retrieval::store::passage_text;
use crate::retrieval::{Metadata, Passage, VectorRecord, VectorStore};

const API_VERSION: &str = "2024-07";
const UPSERT_BATCH: usize = 100;
const DELETE_BATCH: usize = 1000;

pub struct PineconeVectorStore {
    client: reqwest::Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
    text_field: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedVector>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct ListedVector {
    id: String,
}

#[derive(Deserialize)]
struct Pagination {
    next: Option<String>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

impl PineconeVectorStore {
    pub fn new(host: &str, api_key: &str, namespace: Option<String>, text_field: &str, timeout_secs: u64) -> Result<Self, AgentError> {
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AgentError::ConfigError(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            host,
            api_key: api_key.to_string(),
            namespace,
            text_field: text_field.to_string(),
        })
    }

    pub fn from_config(section: &VectorStoreSection) -> Result<Self, AgentError> {
        let host = section
            .host
            .as_deref()
            .ok_or_else(|| AgentError::ConfigError("vector_store.host is required for pinecone".into()))?;
        let api_key = section.resolved_api_key().ok_or_else(|| {
            AgentError::ConfigError("vector_store.api_key / PINECONE_API_KEY is not set".into())
        })?;
        Self::new(
            host,
            &api_key,
            section.namespace.clone(),
            &section.text_field,
            section.timeout_secs,
        )
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, AgentError> {
        let request = self.client.post(format!("{}{}", self.host, path)).json(body);
        self.send(path, request).await
    }

    async fn get<R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, AgentError> {
        let request = self.client.get(format!("{}{}", self.host, path)).query(query);
        self.send(path, request).await
    }

    async fn send<R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<R, AgentError> {
        let response = request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Transport(format!(
                "pinecone {} returned {}: {}",
                path,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Passage>, AgentError> {
        let request = QueryRequest {
            vector,
            top_k: k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let response: QueryResponse = self.post("/query", &request).await?;
        tracing::debug!(matches = response.matches.len(), "pinecone query");
        Ok(response
            .matches
            .into_iter()
            .map(|m| {
                let metadata = m.metadata.unwrap_or_default();
                Passage {
                    id: m.id,
                    text: passage_text(&metadata, &self.text_field),
                    score: m.score,
                    metadata,
                }
            })
            .collect())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, AgentError> {
        let mut total = 0;
        for batch in records.chunks(UPSERT_BATCH) {
            let request = UpsertRequest {
                vectors: batch,
                namespace: self.namespace.as_deref(),
            };
            let response: UpsertResponse = self.post("/vectors/upsert", &request).await?;
            total += response.upserted_count;
        }
        Ok(total)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, AgentError> {
        let mut ids = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query = vec![("prefix", prefix)];
            if let Some(ns) = self.namespace.as_deref() {
                query.push(("namespace", ns));
            }
            if let Some(t) = token.as_deref() {
                query.push(("paginationToken", t));
            }
            let page: ListResponse = self.get("/vectors/list", &query).await?;
            ids.extend(page.vectors.into_iter().map(|v| v.id));
            token = page.pagination.and_then(|p| p.next);
            if token.is_none() {
                break;
            }
        }

        for batch in ids.chunks(DELETE_BATCH) {
            let request = DeleteRequest {
                ids: batch,
                namespace: self.namespace.as_deref(),
            };
            let _: serde_json::Value = self.post("/vectors/delete", &request).await?;
        }
        tracing::debug!(prefix, deleted = ids.len(), "pinecone delete by prefix");
        Ok(ids.len())
    }
}
