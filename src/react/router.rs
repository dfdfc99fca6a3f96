//! 回合路由：只看最新一条消息，决定继续执行工具还是结束本轮
//!
//! 判定只依据工具调用列表是否非空，不检查参数内容。

use crate::core::AgentError;
use crate::memory::{Message, Role, ToolCallRequest};

/// 路由结果
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// 按列出顺序执行这些工具调用
    ContinueWithTool(Vec<ToolCallRequest>),
    /// 本轮结束，携带最终 assistant 消息
    Terminate(Message),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TurnRouter;

impl TurnRouter {
    pub fn new() -> Self {
        Self
    }

    /// 最新消息必须是 assistant；否则说明上游模型调用层已损坏，返回致命的 ProtocolViolation
    pub fn route(&self, messages: &[Message]) -> Result<Route, AgentError> {
        let last = messages
            .last()
            .ok_or_else(|| AgentError::ProtocolViolation("no message to route".into()))?;
        match last.role {
            Role::Assistant if last.has_tool_calls() => {
                Ok(Route::ContinueWithTool(last.tool_calls.clone()))
            }
            Role::Assistant => Ok(Route::Terminate(last.clone())),
            other => Err(AgentError::ProtocolViolation(format!(
                "expected an assistant message to route, got {:?}",
                other
            ))),
        }
    }
}
