//! 单轮驱动
//!
//! 调用模型（流式则经 StreamAssembler 边回显边组装）-> 追加 assistant 消息 -> TurnRouter 路由；
//! 需要工具则按列出顺序逐个执行并追加结果消息，再次调用模型；否则本轮结束。
//! 一次只发出一个外部调用，不并行执行工具。

use std::io::Write;

use crate::core::AgentError;
use crate::llm::{ChatOptions, LlmClient};
use crate::memory::{Message, MessageStore};
use crate::react::{Route, StreamAssembler, TurnRouter};
use crate::tools::ToolExecutor;
use crate::ui::Console;

/// 单轮驱动器：借用模型客户端与工具执行器
pub struct TurnRunner<'a> {
    llm: &'a dyn LlmClient,
    executor: &'a ToolExecutor,
    router: TurnRouter,
    assembler: StreamAssembler,
    max_rounds: usize,
    stream: bool,
}

impl<'a> TurnRunner<'a> {
    pub fn new(llm: &'a dyn LlmClient, executor: &'a ToolExecutor) -> Self {
        Self {
            llm,
            executor,
            router: TurnRouter::new(),
            assembler: StreamAssembler::new(),
            max_rounds: 8,
            stream: true,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// 驱动一轮直到得到最终回复；调用前 store 末尾应为待处理的 human 消息
    pub async fn run<W: Write>(
        &self,
        store: &mut MessageStore,
        console: &mut Console<W>,
    ) -> Result<Message, AgentError> {
        let options = ChatOptions::with_tools(self.executor.schemas());

        for round in 0..self.max_rounds {
            tracing::debug!(round, messages = store.len(), "invoking model");
            let assistant = self.invoke(store, &options, console).await?;
            store.push(assistant);

            match self.router.route(store.messages())? {
                Route::ContinueWithTool(calls) => {
                    tracing::debug!(count = calls.len(), "executing tool calls");
                    for call in &calls {
                        // 结果先入日志再显示：显示失败不能留下未应答的工具调用
                        let result = self.executor.execute(call).await?;
                        let content = result.content.clone();
                        store.push(result);
                        display(console.tool_call(call));
                        display(console.tool_result(&call.name, &content));
                    }
                }
                Route::Terminate(final_msg) => {
                    if !self.stream {
                        console.assistant_box(&final_msg.content)?;
                    }
                    return Ok(final_msg);
                }
            }
        }

        Err(AgentError::MaxStepsExceeded(self.max_rounds))
    }

    async fn invoke<W: Write>(
        &self,
        store: &MessageStore,
        options: &ChatOptions,
        console: &mut Console<W>,
    ) -> Result<Message, AgentError> {
        if !self.stream {
            return self.llm.complete(store.messages(), options).await;
        }
        let stream = self.llm.complete_stream(store.messages(), options).await?;
        let assembled = self.assembler.assemble(stream, console).await;
        console.end_assistant()?;
        assembled
    }
}

/// 工具框只是展示，写终端失败记日志后继续
fn display(result: std::io::Result<()>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to render tool box");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ScriptedLlmClient, ScriptedReply};
    use crate::memory::{Role, ToolCallRequest};
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct RulesTool;

    #[async_trait]
    impl Tool for RulesTool {
        fn name(&self) -> &str {
            "retrieval"
        }

        fn description(&self) -> &str {
            "rules lookup"
        }

        async fn execute(&self, args: Value) -> Result<String, AgentError> {
            Ok(format!("rules for {}", args["userInput"].as_str().unwrap_or_default()))
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(RulesTool);
        ToolExecutor::new(registry, 5)
    }

    fn store_with_question() -> MessageStore {
        let mut store = MessageStore::new("sys");
        store.push(Message::human("q"));
        store
    }

    #[tokio::test]
    async fn test_multiple_tool_calls_run_in_order() {
        let llm = ScriptedLlmClient::new(vec![
            ScriptedReply::tool_calls(vec![
                ToolCallRequest::new("c1", "retrieval", json!({"userInput": "shield"})),
                ToolCallRequest::new("c2", "retrieval", json!({"userInput": "plate"})),
            ]),
            ScriptedReply::text("done"),
        ]);
        let exec = executor();
        let mut store = store_with_question();
        let mut console = Console::plain(Vec::new(), false);

        let final_msg = TurnRunner::new(&llm, &exec)
            .run(&mut store, &mut console)
            .await
            .unwrap();
        assert_eq!(final_msg.content, "done");

        let roles: Vec<Role> = store.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::Human, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
        );
        assert_eq!(store.messages()[3].content, "rules for shield");
        assert_eq!(store.messages()[4].content, "rules for plate");
        assert!(store.pending_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_round_limit() {
        let call = || ToolCallRequest::new("c", "retrieval", json!({"userInput": "x"}));
        let llm = ScriptedLlmClient::new(vec![
            ScriptedReply::tool_calls(vec![call()]),
            ScriptedReply::tool_calls(vec![call()]),
        ]);
        let exec = executor();
        let mut store = store_with_question();
        let mut console = Console::plain(Vec::new(), false);

        let err = TurnRunner::new(&llm, &exec)
            .with_max_rounds(2)
            .run(&mut store, &mut console)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MaxStepsExceeded(2)));
        assert!(store.pending_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_stream_mode_prints_box() {
        let llm = ScriptedLlmClient::new(vec![ScriptedReply::text("A shield grants +2 AC.")]);
        let exec = executor();
        let mut store = store_with_question();
        let mut console = Console::plain(Vec::new(), false);

        TurnRunner::new(&llm, &exec)
            .with_stream(false)
            .run(&mut store, &mut console)
            .await
            .unwrap();
        let out = String::from_utf8(console.into_inner()).unwrap();
        assert!(out.contains("╭─ Assistant"));
        assert!(out.contains("A shield grants +2 AC."));
    }

    /// 输出中出现 marker 时失败一次
    struct FailOnceWriter {
        buf: Vec<u8>,
        marker: &'static str,
        failed: bool,
    }

    impl Write for FailOnceWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.failed && String::from_utf8_lossy(buf).contains(self.marker) {
                self.failed = true;
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"));
            }
            self.buf.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tool_box_write_failure_still_answers_call() {
        let llm = ScriptedLlmClient::new(vec![
            ScriptedReply::tool_calls(vec![ToolCallRequest::new(
                "c1",
                "retrieval",
                json!({"userInput": "shield"}),
            )]),
            ScriptedReply::text("done"),
        ]);
        let exec = executor();
        let mut store = store_with_question();
        let writer = FailOnceWriter {
            buf: Vec::new(),
            marker: "Tool ·",
            failed: false,
        };
        let mut console = Console::plain(writer, true);

        let final_msg = TurnRunner::new(&llm, &exec)
            .run(&mut store, &mut console)
            .await
            .unwrap();
        assert_eq!(final_msg.content, "done");
        assert!(console.into_inner().failed);
        assert!(store.pending_tool_calls().is_empty());
        assert_eq!(store.messages()[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(store.messages()[3].content, "rules for shield");
    }

    #[tokio::test]
    async fn test_model_failure_leaves_no_assistant_message() {
        let llm = ScriptedLlmClient::new(vec![ScriptedReply::Fail("502 bad gateway".into())]);
        let exec = executor();
        let mut store = store_with_question();
        let mut console = Console::plain(Vec::new(), false);

        let err = TurnRunner::new(&llm, &exec)
            .run(&mut store, &mut console)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
        assert_eq!(store.len(), 2);
    }
}
