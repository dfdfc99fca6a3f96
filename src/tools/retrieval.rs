//! 检索工具：嵌入 -> 向量库取 Top-K 段落 -> 模型以 temperature 0 中性摘要
//!
//! 每次调用都完整执行（无缓存）。任何外部调用失败都原样返回 Transport 错误，绝不编造结果。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::config::RetrievalSection;
use crate::core::AgentError;
use crate::llm::{ChatOptions, EmbeddingProvider, LlmClient};
use crate::memory::Message;
use crate::retrieval::VectorStore;
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::Tool;

pub const RETRIEVAL_TOOL_NAME: &str = "retrieval";

/// 输入为空或未检索到任何段落时的摘要
pub const EMPTY_RESULT_SUMMARY: &str = "No relevant passages found.";

/// 检索工具参数
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalArgs {
    /// Free-text question or keywords to look up in the indexed documents
    pub user_input: String,
}

pub struct RetrievalTool {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
    top_k: usize,
    instruction: String,
}

impl RetrievalTool {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmClient>,
        settings: &RetrievalSection,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            top_k: settings.top_k.max(1),
            instruction: settings.instruction.clone(),
        }
    }

    /// 执行检索与摘要
    pub async fn retrieve(&self, input: &str) -> Result<String, AgentError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(EMPTY_RESULT_SUMMARY.to_string());
        }

        let vector = self.embedder.embed(input).await?;
        let passages = self.store.query(&vector, self.top_k).await?;
        tracing::debug!(hits = passages.len(), top_k = self.top_k, "retrieved passages");
        if passages.is_empty() {
            return Ok(EMPTY_RESULT_SUMMARY.to_string());
        }

        // 保持向量库返回的相似度顺序
        let context = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let messages = [
            Message::system(format!("{}\n\nContext:\n{}", self.instruction, context)),
            Message::human(input),
        ];
        let summary = self
            .llm
            .complete(&messages, &ChatOptions::deterministic())
            .await?;
        Ok(summary.content)
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        RETRIEVAL_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the indexed documents for passages related to the input and return a neutral, \
         factual summary of what they say. Use this before answering any question about the documents."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<RetrievalArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let args: RetrievalArgs = parse_args(RETRIEVAL_TOOL_NAME, args)?;
        self.retrieve(&args.user_input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{HashEmbedder, ScriptedLlmClient, ScriptedReply};
    use crate::memory::Role;
    use crate::retrieval::{LocalVectorStore, Metadata, VectorRecord};

    async fn seeded_store(embedder: &HashEmbedder, texts: &[&str]) -> Arc<LocalVectorStore> {
        let store = Arc::new(LocalVectorStore::in_memory("text"));
        let mut records = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let mut metadata = Metadata::new();
            metadata.insert("text".into(), (*text).into());
            records.push(VectorRecord {
                id: format!("p{}", i),
                values: embedder.embed(text).await.unwrap(),
                metadata,
            });
        }
        store.upsert(records).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_empty_input_returns_degenerate_summary() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let tool = RetrievalTool::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(LocalVectorStore::in_memory("text")),
            llm.clone(),
            &RetrievalSection::default(),
        );
        let out = tool.execute(serde_json::json!({"userInput": "   "})).await.unwrap();
        assert_eq!(out, EMPTY_RESULT_SUMMARY);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_synthesis_request_uses_ranked_passages() {
        let embedder = HashEmbedder::default();
        let store = seeded_store(&embedder, &["A shield grants +2 AC.", "Plate armor is AC 18."]).await;
        let llm = Arc::new(ScriptedLlmClient::new(vec![ScriptedReply::text("A shield grants +2 AC.")]));
        let tool = RetrievalTool::new(Arc::new(embedder), store, llm.clone(), &RetrievalSection::default());

        let out = tool
            .execute(serde_json::json!({"userInput": "A shield grants +2 AC."}))
            .await
            .unwrap();
        assert_eq!(out, "A shield grants +2 AC.");

        let received = llm.received();
        assert_eq!(received.len(), 1);
        let request = &received[0];
        assert_eq!(request[0].role, Role::System);
        assert!(request[0].content.contains("using only the supplied text"));
        // 最相似的段落排在最前
        let context = request[0].content.split("Context:\n").nth(1).unwrap();
        assert!(context.starts_with("A shield grants +2 AC.\n"));
        assert_eq!(request[1].role, Role::Human);
        assert_eq!(request[1].content, "A shield grants +2 AC.");

        let options = &llm.received_options()[0];
        assert_eq!(options.temperature, Some(0.0));
        assert!(options.tools.is_empty());
    }

    /// 固定查询向量，让排序只由存入的向量决定
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_only_top_five_passages_reach_context() {
        let store = Arc::new(LocalVectorStore::in_memory("text"));
        // 逆序写入；与 [1, 0] 的相似度随 i 增大而降低
        let records = (0..7)
            .rev()
            .map(|i| {
                let mut metadata = Metadata::new();
                metadata.insert("text".into(), format!("passage {}", i).into());
                VectorRecord {
                    id: format!("p{}", i),
                    values: vec![1.0, i as f32],
                    metadata,
                }
            })
            .collect();
        store.upsert(records).await.unwrap();

        let llm = Arc::new(ScriptedLlmClient::new(vec![ScriptedReply::text("summary")]));
        let tool = RetrievalTool::new(
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            store,
            llm.clone(),
            &RetrievalSection::default(),
        );
        tool.retrieve("anything").await.unwrap();

        let system = &llm.received()[0][0].content;
        let context = system.split("Context:\n").nth(1).unwrap();
        assert_eq!(
            context,
            "passage 0\npassage 1\npassage 2\npassage 3\npassage 4"
        );
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_protocol_violation() {
        let tool = RetrievalTool::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(LocalVectorStore::in_memory("text")),
            Arc::new(ScriptedLlmClient::new(vec![])),
            &RetrievalSection::default(),
        );
        let err = tool.execute(serde_json::json!({"query": "shield"})).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let embedder = HashEmbedder::default();
        let store = seeded_store(&embedder, &["A shield grants +2 AC."]).await;
        let llm = Arc::new(ScriptedLlmClient::new(vec![ScriptedReply::Fail("503".into())]));
        let tool = RetrievalTool::new(Arc::new(embedder), store, llm, &RetrievalSection::default());
        let err = tool.retrieve("shield").await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
    }

    #[test]
    fn test_schema_names_user_input() {
        let tool = RetrievalTool::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(LocalVectorStore::in_memory("text")),
            Arc::new(ScriptedLlmClient::new(vec![])),
            &RetrievalSection::default(),
        );
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"][0], "userInput");
    }
}
