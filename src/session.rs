//! 会话主循环
//!
//! 状态机：AwaitingInput -> ProcessingTurn -> AwaitingInput ... -> Terminated。
//! - 退出关键字（去空白、忽略大小写）或输入结束：直接 Terminated，不写入消息
//! - 空行：重新提示
//! - 其他输入：追加 human 消息并驱动一轮
//! 外部调用失败打印错误横幅后继续等待输入；协议错误为致命错误，结束会话并向上返回。

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::agent::AgentComponents;
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::memory::{Message, MessageStore};
use crate::react::{Sentiment, TurnRunner};
use crate::ui::Console;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingInput,
    ProcessingTurn,
    Terminated,
}

/// 会话状态：只在两轮之间由 Session 修改
#[derive(Debug, Clone)]
pub struct SessionState {
    pub store: MessageStore,
    /// 最近一次的情绪标签（仅展示）
    pub last_sentiment: Option<Sentiment>,
}

pub struct Session {
    components: AgentComponents,
    exit_keyword: String,
    max_tool_rounds: usize,
    stream: bool,
    state: SessionState,
    phase: SessionPhase,
}

impl Session {
    pub fn new(components: AgentComponents, cfg: &AppConfig) -> Self {
        Self {
            components,
            exit_keyword: cfg.app.exit_keyword.trim().to_string(),
            max_tool_rounds: cfg.app.max_tool_rounds,
            stream: cfg.llm.stream,
            state: SessionState {
                store: MessageStore::new(cfg.app.system_prompt.clone()),
                last_sentiment: None,
            },
            phase: SessionPhase::AwaitingInput,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.components.executor.tool_names()
    }

    fn is_exit(&self, line: &str) -> bool {
        line.trim().eq_ignore_ascii_case(&self.exit_keyword)
    }

    /// 处理一行输入，返回处理后的状态
    pub async fn handle_line<W: Write>(
        &mut self,
        line: &str,
        console: &mut Console<W>,
    ) -> Result<SessionPhase, AgentError> {
        if self.phase == SessionPhase::Terminated {
            return Ok(self.phase);
        }
        if self.is_exit(line) {
            tracing::info!("exit requested");
            self.phase = SessionPhase::Terminated;
            return Ok(self.phase);
        }
        let input = line.trim();
        if input.is_empty() {
            return Ok(self.phase);
        }

        self.update_sentiment(input, console).await?;
        self.state.store.push(Message::human(input));
        self.phase = SessionPhase::ProcessingTurn;

        let runner = TurnRunner::new(self.components.llm.as_ref(), &self.components.executor)
            .with_max_rounds(self.max_tool_rounds)
            .with_stream(self.stream);
        match runner.run(&mut self.state.store, console).await {
            Ok(final_msg) => {
                tracing::debug!(chars = final_msg.content.len(), "turn complete");
                self.phase = SessionPhase::AwaitingInput;
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "fatal error, ending session");
                console.error_banner(&e)?;
                self.phase = SessionPhase::Terminated;
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                console.error_banner(&e)?;
                self.phase = SessionPhase::AwaitingInput;
            }
        }
        Ok(self.phase)
    }

    async fn update_sentiment<W: Write>(
        &mut self,
        input: &str,
        console: &mut Console<W>,
    ) -> Result<(), AgentError> {
        let Some(classifier) = &self.components.sentiment else {
            return Ok(());
        };
        match classifier.classify(input).await {
            Ok(label) => {
                self.state.last_sentiment = Some(label);
                console.note(&format!("sentiment: {}", label))?;
            }
            Err(e) => tracing::warn!(error = %e, "sentiment classification failed"),
        }
        Ok(())
    }

    /// 交互主循环：逐行读取输入直到退出或输入结束
    pub async fn run<R, W>(&mut self, input: R, console: &mut Console<W>) -> Result<(), AgentError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        while self.phase != SessionPhase::Terminated {
            console.prompt()?;
            match lines.next_line().await? {
                Some(line) => {
                    self.handle_line(&line, console).await?;
                }
                None => {
                    tracing::info!("input closed");
                    self.phase = SessionPhase::Terminated;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::{HashEmbedder, ScriptedLlmClient, ScriptedReply};
    use crate::memory::Role;
    use crate::retrieval::LocalVectorStore;

    fn session(llm: Arc<ScriptedLlmClient>, cfg: &AppConfig) -> Session {
        let components = AgentComponents::assemble(
            cfg,
            llm,
            Arc::new(HashEmbedder::default()),
            Arc::new(LocalVectorStore::in_memory("text")),
        );
        Session::new(components, cfg)
    }

    #[tokio::test]
    async fn test_exit_keyword_any_case_terminates_without_message() {
        for input in ["exit", "  EXIT  ", "Exit\t"] {
            let llm = Arc::new(ScriptedLlmClient::new(vec![]));
            let mut s = session(llm.clone(), &AppConfig::default());
            let mut console = Console::plain(Vec::new(), false);
            let phase = s.handle_line(input, &mut console).await.unwrap();
            assert_eq!(phase, SessionPhase::Terminated);
            assert_eq!(s.state().store.len(), 1);
            assert_eq!(llm.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_blank_line_reprompts() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let mut s = session(llm.clone(), &AppConfig::default());
        let mut console = Console::plain(Vec::new(), false);
        assert_eq!(
            s.handle_line("   ", &mut console).await.unwrap(),
            SessionPhase::AwaitingInput
        );
        assert_eq!(s.state().store.len(), 1);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_reports_and_continues() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            ScriptedReply::Fail("upstream 503".into()),
            ScriptedReply::text("second try works"),
        ]));
        let mut s = session(llm, &AppConfig::default());
        let mut console = Console::plain(Vec::new(), false);

        let input: &[u8] = b"first\nsecond\nexit\n";
        s.run(input, &mut console).await.unwrap();

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert!(out.contains("transport failure: upstream 503"));
        assert!(out.contains("second try works"));
        assert_eq!(s.phase(), SessionPhase::Terminated);
        let last = s.state().store.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_protocol_violation_is_fatal() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![ScriptedReply::tool_calls(vec![
            crate::memory::ToolCallRequest::new("c1", "no_such_tool", serde_json::json!({})),
        ])]));
        let mut s = session(llm, &AppConfig::default());
        let mut console = Console::plain(Vec::new(), false);

        let input: &[u8] = b"hello\nnever read\n";
        let err = s.run(input, &mut console).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(s.phase(), SessionPhase::Terminated);
    }

    #[tokio::test]
    async fn test_eof_terminates() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let mut s = session(llm, &AppConfig::default());
        let mut console = Console::plain(Vec::new(), false);
        let input: &[u8] = b"";
        s.run(input, &mut console).await.unwrap();
        assert_eq!(s.phase(), SessionPhase::Terminated);
    }

    #[tokio::test]
    async fn test_sentiment_is_advisory() {
        let mut cfg = AppConfig::default();
        cfg.sentiment.enabled = true;
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            ScriptedReply::text("positive"),
            ScriptedReply::text("Glad to help."),
        ]));
        let mut s = session(llm.clone(), &cfg);
        let mut console = Console::plain(Vec::new(), false);
        s.handle_line("thanks, this is great", &mut console).await.unwrap();

        assert_eq!(s.state().last_sentiment, Some(Sentiment::Positive));
        // 情绪分类请求不进入会话消息日志
        let roles: Vec<Role> = s.state().store.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Human, Role::Assistant]);
        assert_eq!(llm.call_count(), 2);
    }
}
