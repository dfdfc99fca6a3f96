//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TOME__*` 覆盖（双下划线表示嵌套，如 `TOME__LLM__MODEL=gpt-4o`）。
//! 启动时构建一次，之后按引用传给各组件；组件内部不再读取全局环境。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub vector_store: VectorStoreSection,
    pub retrieval: RetrievalSection,
    pub tools: ToolsSection,
    pub sentiment: SentimentSection,
}

/// [app] 段：系统提示词、退出关键字、单轮工具循环上限、详细输出
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub system_prompt: String,
    pub exit_keyword: String,
    /// 单轮内最多调用模型的次数（含工具往返）
    pub max_tool_rounds: usize,
    /// 显示工具调用框与情绪标签
    pub verbose: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            exit_keyword: "exit".to_string(),
            max_tool_rounds: 8,
            verbose: false,
        }
    }
}

fn default_system_prompt() -> String {
    "You are a helpful assistant answering questions about the indexed rulebooks. \
     Use the `retrieval` tool to look up facts before answering. \
     If retrieval fails, tell the user it failed and do not guess."
        .to_string()
}

/// [llm] 段：模型、端点、密钥、是否流式与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时回退到 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub stream: bool,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            stream: true,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 120,
        }
    }
}

/// [embedding] 段：嵌入模型与端点（密钥与 llm 共用）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            base_url: None,
        }
    }
}

/// 向量库后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreProvider {
    /// 本地 JSON 快照 + 余弦相似度
    #[default]
    Local,
    Pinecone,
}

/// [vector_store] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreSection {
    pub provider: VectorStoreProvider,
    /// local：快照文件路径
    pub path: PathBuf,
    /// pinecone：索引 host，如 https://my-index-abc123.svc.us-east-1.pinecone.io
    pub host: Option<String>,
    /// 未设置时回退到 PINECONE_API_KEY
    pub api_key: Option<String>,
    pub namespace: Option<String>,
    /// 元数据中存放段落原文的字段名
    pub text_field: String,
    pub timeout_secs: u64,
}

impl Default for VectorStoreSection {
    fn default() -> Self {
        Self {
            provider: VectorStoreProvider::Local,
            path: PathBuf::from("data/index.json"),
            host: None,
            api_key: None,
            namespace: None,
            text_field: "text".to_string(),
            timeout_secs: 30,
        }
    }
}

/// [retrieval] 段：检索条数与摘要指令
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub top_k: usize,
    pub instruction: String,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: 5,
            instruction: "Summarize neutrally and factually, using only the supplied text. \
                          Do not add information that is not present in it."
                .to_string(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 60,
        }
    }
}

/// [sentiment] 段：情绪标签仅供展示，不参与控制流
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SentimentSection {
    pub enabled: bool,
}

impl LlmSection {
    /// 配置中的密钥优先，否则回退到 OPENAI_API_KEY
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

impl VectorStoreSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("PINECONE_API_KEY").ok())
    }
}

/// 从 config 目录加载配置，环境变量 TOME__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在，可覆盖前面的键）
/// 3. 最后叠加环境变量 TOME__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    // 显式指定的文件必须存在，缺失时报错而不是静默回退到默认值
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TOME")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
