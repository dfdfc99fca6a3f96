//! Agent 组件构建
//!
//! 由 AppConfig 一次性构建 LLM 客户端、嵌入、向量库、检索工具与执行器；
//! 之后组件只通过参数拿到配置，不再读取环境。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{EmbeddingProvider, LlmClient, OpenAiClient, OpenAiEmbedder};
use crate::react::SentimentClassifier;
use crate::retrieval::{create_vector_store, VectorStore};
use crate::tools::{RetrievalTool, ToolExecutor, ToolRegistry};

/// 预构建的 Agent 组件：模型客户端、工具执行器、可选情绪分类
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub executor: ToolExecutor,
    pub sentiment: Option<SentimentClassifier>,
}

impl AgentComponents {
    /// 由已构建的后端组装（测试可注入 Mock）
    pub fn assemble(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let registry = build_tool_registry(cfg, llm.clone(), embedder, store);
        let sentiment = cfg
            .sentiment
            .enabled
            .then(|| SentimentClassifier::new(llm.clone()));
        Self {
            llm,
            executor: ToolExecutor::new(registry, cfg.tools.tool_timeout_secs),
            sentiment,
        }
    }
}

/// 工具注册表：目前只暴露检索工具
pub fn build_tool_registry(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(RetrievalTool::new(embedder, store, llm, &cfg.retrieval));
    tools
}

/// 按配置创建真实后端（OpenAI 兼容模型 + 嵌入 + 向量库）
pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::from_config(&cfg.llm));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedder::from_config(cfg));
    let store = create_vector_store(cfg)?;
    Ok(AgentComponents::assemble(cfg, llm, embedder, store))
}
