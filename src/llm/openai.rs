//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url），支持工具定义、工具调用与流式输出。
//! 流式时把 delta 转成 Fragment：每段文本一个片段，按 index 累积的工具调用在流结束时以一个无文本片段给出。

use std::collections::BTreeMap;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCallChunk,
    ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionResponseStream, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, FunctionCall,
    FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::time::timeout;

use crate::config::LlmSection;
use crate::core::AgentError;
use crate::llm::{ChatOptions, Fragment, FragmentStream, LlmClient};
use crate::memory::{Message, Role, ToolCallRequest};

/// OpenAI 兼容客户端：持有 Client、model 名与超时
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl OpenAiClient {
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
            request_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(120),
        }
    }

    /// 从 [llm] 段构建
    pub fn from_config(llm: &LlmSection) -> Self {
        let key = llm.resolved_api_key();
        if key.is_none() {
            tracing::warn!("no LLM api key configured (llm.api_key / OPENAI_API_KEY)");
        }
        let mut client = Self::new(llm.base_url.as_deref(), &llm.model, key.as_deref());
        client.request_timeout = Duration::from_secs(llm.timeouts.request);
        client.stream_timeout = Duration::from_secs(llm.timeouts.stream);
        client
    }

    fn build_request(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<CreateChatCompletionRequest, AgentError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(to_openai_messages(messages)?);
        if !options.tools.is_empty() {
            let mut tools = Vec::with_capacity(options.tools.len());
            for schema in &options.tools {
                let function = FunctionObjectArgs::default()
                    .name(&schema.name)
                    .description(&schema.description)
                    .parameters(schema.parameters.clone())
                    .build()
                    .map_err(|e| AgentError::ProtocolViolation(e.to_string()))?;
                tools.push(ChatCompletionTools::Function(ChatCompletionTool { function }));
            }
            args.tools(tools);
        }
        if let Some(t) = options.temperature {
            args.temperature(t);
        }
        args.build()
            .map_err(|e| AgentError::ProtocolViolation(e.to_string()))
    }
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, AgentError> {
    let invalid = |e: async_openai::error::OpenAIError| AgentError::ProtocolViolation(e.to_string());
    messages
        .iter()
        .map(|m| {
            let msg: ChatCompletionRequestMessage = match m.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map_err(invalid)?
                    .into(),
                Role::Human => ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map_err(invalid)?
                    .into(),
                Role::Assistant => {
                    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                    if !m.content.is_empty() || m.tool_calls.is_empty() {
                        builder.content(m.content.clone());
                    }
                    if m.has_tool_calls() {
                        let calls: Vec<ChatCompletionMessageToolCalls> = m
                            .tool_calls
                            .iter()
                            .map(|tc| {
                                ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                                    id: tc.id.clone(),
                                    function: FunctionCall {
                                        name: tc.name.clone(),
                                        arguments: tc.arguments.to_string(),
                                    },
                                })
                            })
                            .collect();
                        builder.tool_calls(calls);
                    }
                    builder.build().map_err(invalid)?.into()
                }
                Role::Tool => {
                    let id = m.tool_call_id.clone().ok_or_else(|| {
                        AgentError::ProtocolViolation("tool message without tool_call_id".into())
                    })?;
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(m.content.clone())
                        .tool_call_id(id)
                        .build()
                        .map_err(invalid)?
                        .into()
                }
            };
            Ok(msg)
        })
        .collect()
}

/// 解析工具参数字符串；空串视为无参数，非法 JSON 为协议错误
fn parse_arguments(name: &str, raw: &str) -> Result<serde_json::Value, AgentError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| {
        AgentError::ProtocolViolation(format!("malformed arguments for tool {}: {}", name, e))
    })
}

/// 流式工具调用的累积状态（按 chunk.index）
#[derive(Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

struct DeltaState {
    inner: ChatCompletionResponseStream,
    idle_timeout: Duration,
    partial: BTreeMap<u32, PartialToolCall>,
    finished: bool,
}

impl DeltaState {
    fn absorb(&mut self, chunk: ChatCompletionMessageToolCallChunk) {
        let entry = self.partial.entry(chunk.index).or_default();
        if let Some(id) = chunk.id {
            entry.id = Some(id);
        }
        if let Some(f) = chunk.function {
            if let Some(name) = f.name {
                entry.name.push_str(&name);
            }
            if let Some(args) = f.arguments {
                entry.arguments.push_str(&args);
            }
        }
    }

    fn take_tool_calls(&mut self) -> Result<Vec<ToolCallRequest>, AgentError> {
        std::mem::take(&mut self.partial)
            .into_values()
            .map(|p| {
                if p.name.is_empty() {
                    return Err(AgentError::ProtocolViolation(
                        "streamed tool call without a name".into(),
                    ));
                }
                let arguments = parse_arguments(&p.name, &p.arguments)?;
                let id = p
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                Ok(ToolCallRequest::new(id, p.name, arguments))
            })
            .collect()
    }
}

fn delta_stream(inner: ChatCompletionResponseStream, idle_timeout: Duration) -> FragmentStream {
    let state = DeltaState {
        inner,
        idle_timeout,
        partial: BTreeMap::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }
        loop {
            let next = match timeout(st.idle_timeout, st.inner.next()).await {
                Ok(n) => n,
                Err(_) => {
                    st.finished = true;
                    return Some((Err(AgentError::Transport("model stream timed out".into())), st));
                }
            };
            match next {
                Some(Ok(chunk)) => {
                    let mut text = String::new();
                    for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
                        if let Some(content) = choice.delta.content {
                            text.push_str(&content);
                        }
                        for call in choice.delta.tool_calls.unwrap_or_default() {
                            st.absorb(call);
                        }
                    }
                    if !text.is_empty() {
                        return Some((Ok(Fragment::text(text)), st));
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(AgentError::from(e)), st));
                }
                None => {
                    st.finished = true;
                    if st.partial.is_empty() {
                        return None;
                    }
                    let calls = st.take_tool_calls().map(Fragment::tool_calls);
                    return Some((calls, st));
                }
            }
        }
    }))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message], options: &ChatOptions) -> Result<Message, AgentError> {
        let request = self.build_request(messages, options)?;

        let response = timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| AgentError::Transport("model request timed out".into()))??;

        let Some(choice) = response.choices.into_iter().next() else {
            return Ok(Message::assistant(""));
        };

        let mut tool_calls = Vec::new();
        for call in choice.message.tool_calls.unwrap_or_default() {
            match call {
                ChatCompletionMessageToolCalls::Function(f) => {
                    let arguments = parse_arguments(&f.function.name, &f.function.arguments)?;
                    tool_calls.push(ToolCallRequest::new(f.id, f.function.name, arguments));
                }
                other => {
                    return Err(AgentError::ProtocolViolation(format!(
                        "unsupported tool call kind: {:?}",
                        other
                    )))
                }
            }
        }

        Ok(Message::assistant_with_tools(
            choice.message.content.unwrap_or_default(),
            tool_calls,
        ))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<FragmentStream, AgentError> {
        let request = self.build_request(messages, options)?;
        let inner = timeout(self.request_timeout, self.client.chat().create_stream(request))
            .await
            .map_err(|_| AgentError::Transport("model request timed out".into()))??;
        Ok(delta_stream(inner, self.stream_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolSchema;
    use async_openai::error::OpenAIError;
    use async_openai::types::chat::CreateChatCompletionStreamResponse;
    use serde_json::{json, Value};

    fn chunk(delta: Value) -> Result<CreateChatCompletionStreamResponse, OpenAIError> {
        Ok(serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 0,
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": delta, "finish_reason": null}]
        }))
        .unwrap())
    }

    fn upstream(
        items: Vec<Result<CreateChatCompletionStreamResponse, OpenAIError>>,
    ) -> ChatCompletionResponseStream {
        Box::pin(stream::iter(items))
    }

    async fn collect(items: Vec<Result<CreateChatCompletionStreamResponse, OpenAIError>>) -> Vec<Result<Fragment, AgentError>> {
        delta_stream(upstream(items), Duration::from_secs(5))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_delta_text_then_accumulated_tool_call() {
        let out = collect(vec![
            chunk(json!({"role": "assistant", "content": "Let me "})),
            chunk(json!({"content": "check."})),
            chunk(json!({"tool_calls": [{"index": 0, "id": "call_9", "type": "function",
                "function": {"name": "retrieval", "arguments": ""}}]})),
            chunk(json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"userInput\""}}]})),
            chunk(json!({"tool_calls": [{"index": 0, "function": {"arguments": ":\"shield\"}"}}]})),
        ])
        .await;

        let fragments: Vec<Fragment> = out.into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].text, "Let me ");
        assert_eq!(fragments[1].text, "check.");
        let last = &fragments[2];
        assert!(last.text.is_empty());
        assert_eq!(
            last.tool_calls,
            vec![ToolCallRequest::new("call_9", "retrieval", json!({"userInput": "shield"}))]
        );
    }

    #[tokio::test]
    async fn test_delta_tool_calls_keep_index_order() {
        let out = collect(vec![
            chunk(json!({"tool_calls": [{"index": 1, "id": "b", "function": {"name": "retrieval", "arguments": "{}"}}]})),
            chunk(json!({"tool_calls": [{"index": 0, "id": "a", "function": {"name": "retrieval", "arguments": "{}"}}]})),
        ])
        .await;
        assert_eq!(out.len(), 1);
        let ids: Vec<String> = out[0].as_ref().unwrap().tool_calls.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delta_malformed_arguments() {
        let out = collect(vec![chunk(json!({"tool_calls": [{"index": 0, "id": "c1",
            "function": {"name": "retrieval", "arguments": "{\"userInput\":"}}]}))])
        .await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(AgentError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn test_delta_tool_call_without_name() {
        let out = collect(vec![chunk(json!({"tool_calls": [{"index": 0, "id": "c1",
            "function": {"arguments": "{}"}}]}))])
        .await;
        assert!(matches!(out[0], Err(AgentError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn test_delta_missing_id_gets_generated() {
        let out = collect(vec![chunk(json!({"tool_calls": [{"index": 0,
            "function": {"name": "retrieval", "arguments": "{}"}}]}))])
        .await;
        let calls = &out[0].as_ref().unwrap().tool_calls;
        assert!(calls[0].id.starts_with("call_"));
    }

    #[tokio::test]
    async fn test_delta_upstream_error_ends_stream() {
        let out = collect(vec![
            chunk(json!({"content": "partial"})),
            Err(OpenAIError::InvalidArgument("connection reset".into())),
            chunk(json!({"content": "never seen"})),
        ])
        .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().text, "partial");
        assert!(matches!(out[1], Err(AgentError::Transport(_))));
    }

    #[tokio::test]
    async fn test_delta_plain_text_has_no_trailing_fragment() {
        let out = collect(vec![chunk(json!({"content": "A shield grants +2 AC."}))]).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].as_ref().unwrap().tool_calls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delta_idle_timeout() {
        let inner: ChatCompletionResponseStream = Box::pin(stream::pending());
        let out: Vec<_> = delta_stream(inner, Duration::from_secs(1)).collect().await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(AgentError::Transport(_))));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("retrieval", "").unwrap(), serde_json::json!({}));
        assert_eq!(
            parse_arguments("retrieval", r#"{"userInput":"shield"}"#).unwrap()["userInput"],
            "shield"
        );
        assert!(matches!(
            parse_arguments("retrieval", "{\"userInput\":"),
            Err(AgentError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_build_request_with_tools() {
        let client = OpenAiClient::new(Some("http://localhost:1"), "gpt-4o-mini", Some("sk-test"));
        let mut messages = vec![Message::system("sys"), Message::human("q")];
        messages.push(Message::assistant_with_tools(
            "",
            vec![ToolCallRequest::new("call_1", "retrieval", serde_json::json!({"userInput": "q"}))],
        ));
        messages.push(Message::tool_result("call_1", "summary"));
        let options = ChatOptions {
            tools: vec![ToolSchema {
                name: "retrieval".into(),
                description: "look things up".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            temperature: Some(0.0),
        };
        let request = client.build_request(&messages, &options).unwrap();
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.tools.as_ref().map(|t| t.len()), Some(1));
        assert_eq!(request.temperature, Some(0.0));
    }

    #[test]
    fn test_tool_message_requires_call_id() {
        let mut msg = Message::tool_result("x", "y");
        msg.tool_call_id = None;
        assert!(matches!(
            to_openai_messages(&[msg]),
            Err(AgentError::ProtocolViolation(_))
        ));
    }
}
