//! Agent 错误类型
//!
//! 三类错误：外部调用失败（Transport，可恢复，打印错误横幅后继续）、
//! 上游契约破坏（ProtocolViolation，致命）、工具层失败（转为工具结果消息回写对话）。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（网络、协议、工具、配置等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型 / 嵌入 / 向量库任一外部调用失败或超时
    #[error("transport failure: {0}")]
    Transport(String),

    /// 收到无法识别的消息形态（未知角色、非法 tool call 负载、未注册的工具名）
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 单轮内模型调用次数超过上限（所有已请求的工具均已回写结果）
    #[error("Max tool rounds exceeded ({0})")]
    MaxStepsExceeded(usize),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// 是否为致命错误：协议破坏说明上游模型调用层已损坏，不应继续交互循环
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::ProtocolViolation(_))
    }

    /// 是否可作为工具结果回写（而非中止本轮）
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            AgentError::Transport(_)
                | AgentError::ToolExecutionFailed(_)
                | AgentError::ToolTimeout(_)
        )
    }

    /// 去掉分类前缀的原因文本，用于拼接 "<tool> failed: <reason>"
    pub fn reason(&self) -> String {
        match self {
            AgentError::Transport(r)
            | AgentError::ProtocolViolation(r)
            | AgentError::ToolExecutionFailed(r)
            | AgentError::ConfigError(r) => r.clone(),
            AgentError::ToolTimeout(tool) => format!("{} timed out", tool),
            other => other.to_string(),
        }
    }
}

impl From<async_openai::error::OpenAIError> for AgentError {
    fn from(e: async_openai::error::OpenAIError) -> Self {
        AgentError::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::Transport(e.to_string())
    }
}
