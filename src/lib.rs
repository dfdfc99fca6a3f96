//! Tome - 检索增强的命令行对话助手
//!
//! 模块划分：
//! - **agent**: 按配置构建模型客户端、向量库、检索工具与执行器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: LLM / 嵌入抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话消息日志
//! - **react**: 回合路由、流式组装、单轮驱动、情绪标签
//! - **retrieval**: 向量库（本地 / Pinecone）、分块与导入
//! - **session**: 交互主循环状态机
//! - **tools**: 工具注册表、检索工具与执行器
//! - **ui**: 终端渲染

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod retrieval;
pub mod session;
pub mod tools;
pub mod ui;

pub use session::{Session, SessionPhase};
