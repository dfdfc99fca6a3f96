//! 核心类型

pub mod error;

pub use error::AgentError;
