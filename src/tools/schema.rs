//! 工具参数 JSON Schema 生成（schemars）
//!
//! 参数结构体派生 JsonSchema，生成的 schema 作为 function parameters 交给模型；
//! 同一结构体也用于反序列化模型给出的参数，保证两者一致。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::AgentError;

/// 生成参数 schema（去掉 $schema / title 等模型不需要的顶层字段）
pub fn args_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 按参数结构体解析模型给出的参数；不符合即协议错误
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, AgentError> {
    serde_json::from_value(args).map_err(|e| {
        AgentError::ProtocolViolation(format!("invalid arguments for {}: {}", tool, e))
    })
}
