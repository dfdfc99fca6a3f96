//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / 脚本化 Mock）实现 LlmClient：complete（非流式）、complete_stream（流式片段）。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::{Message, ToolCallRequest};

/// 工具 schema：名称（唯一）、描述、参数 JSON Schema，供模型决定是否发起工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// 单次模型调用的选项
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// 暴露给模型的工具；为空则不允许工具调用
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
}

impl ChatOptions {
    pub fn with_tools(tools: Vec<ToolSchema>) -> Self {
        Self {
            tools,
            temperature: None,
        }
    }

    /// 确定性调用（temperature = 0）
    pub fn deterministic() -> Self {
        Self {
            tools: Vec::new(),
            temperature: Some(0.0),
        }
    }
}

/// 流式回复的一个片段：增量文本；仅最后一个片段携带完整的工具调用列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: String::new(),
            tool_calls,
        }
    }
}

/// 有限、单向、不可重放的片段流
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, AgentError>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成（返回片段流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回完整的 assistant 消息
    async fn complete(&self, messages: &[Message], options: &ChatOptions) -> Result<Message, AgentError>;

    /// 流式完成
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<FragmentStream, AgentError>;
}
