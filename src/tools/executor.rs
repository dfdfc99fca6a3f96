//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，把一次 ToolCallRequest 解析为一条 tool 结果消息：
//! 成功写入工具输出；Transport / 超时 / 执行失败写入 "<tool> failed: <reason>"，让模型下一轮看到失败而不是编造结果；
//! 协议错误（未知工具、参数不符）向上返回。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolSchema;
use crate::memory::{Message, ToolCallRequest};
use crate::tools::ToolRegistry;

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一次工具调用，返回对应的 tool 结果消息
    pub async fn execute(&self, call: &ToolCallRequest) -> Result<Message, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&call.arguments);
        let result = match timeout(
            self.timeout,
            self.registry.execute(&call.name, call.arguments.clone()),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(AgentError::ToolTimeout(call.name.clone())),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AgentError::ToolTimeout(_)) => "timeout",
            Err(e) if e.is_fatal() => "protocol_violation",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(content) => Ok(Message::tool_result(&call.id, content)),
            Err(e) if e.is_tool_failure() => {
                tracing::warn!(tool = %call.name, error = %e, "tool failed");
                Ok(Message::tool_result(&call.id, failure_notice(&call.name, &e)))
            }
            Err(e) => Err(e),
        }
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

/// 工具失败时回写给模型的说明
pub fn failure_notice(tool: &str, error: &AgentError) -> String {
    format!("{} failed: {}", tool, error.reason())
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
