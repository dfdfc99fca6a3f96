//! 脚本化 Mock 客户端（用于测试，无需 API）
//!
//! 按顺序回放预设回复，并记录每次收到的完整消息列表与调用选项，便于断言模型「看到了什么」。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream;

use crate::core::AgentError;
use crate::llm::{ChatOptions, EmbeddingProvider, Fragment, FragmentStream, LlmClient};
use crate::memory::{Message, ToolCallRequest};

/// 一次预设回复
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// 以这些片段流式返回
    Fragments(Vec<Fragment>),
    /// 调用失败（Transport）
    Fail(String),
}

impl ScriptedReply {
    /// 纯文本回复，按字符数切成若干片段
    pub fn text(content: &str) -> Self {
        let chars: Vec<char> = content.chars().collect();
        let fragments = chars
            .chunks(8)
            .map(|c| Fragment::text(c.iter().collect::<String>()))
            .collect();
        ScriptedReply::Fragments(fragments)
    }

    /// 工具调用回复：无文本，最后一个片段携带工具调用
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        ScriptedReply::Fragments(vec![Fragment::tool_calls(calls)])
    }
}

/// 脚本化客户端
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    received: Mutex<Vec<Vec<Message>>>,
    options: Mutex<Vec<ChatOptions>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            received: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用收到的消息列表（按调用顺序）
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 每次调用的选项（温度、工具列表），与 received 一一对应
    pub fn received_options(&self) -> Vec<ChatOptions> {
        self.options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn next_reply(&self, messages: &[Message], options: &ChatOptions) -> Result<Vec<Fragment>, AgentError> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        self.options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options.clone());
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match reply {
            Some(ScriptedReply::Fragments(f)) => Ok(f),
            Some(ScriptedReply::Fail(reason)) => Err(AgentError::Transport(reason)),
            None => Err(AgentError::Transport("scripted replies exhausted".into())),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message], options: &ChatOptions) -> Result<Message, AgentError> {
        let fragments = self.next_reply(messages, options)?;
        let content: String = fragments.iter().map(|f| f.text.as_str()).collect();
        let tool_calls = fragments.last().map(|f| f.tool_calls.clone()).unwrap_or_default();
        Ok(Message::assistant_with_tools(content, tool_calls))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<FragmentStream, AgentError> {
        let fragments = self.next_reply(messages, options)?;
        Ok(Box::pin(stream::iter(fragments.into_iter().map(Ok))))
    }
}

/// 确定性嵌入：按字节累加到固定维度，便于测试无需外部服务
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let mut v = vec![0.0f32; self.dims];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let slot = word.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            v[slot % self.dims] += 1.0;
        }
        Ok(v)
    }
}
