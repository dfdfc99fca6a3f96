//! 工具层：Tool trait、注册表、参数 schema、检索工具与执行器

pub mod executor;
pub mod registry;
pub mod retrieval;
pub mod schema;

pub use executor::{failure_notice, ToolExecutor};
pub use registry::{Tool, ToolRegistry};
pub use retrieval::{RetrievalArgs, RetrievalTool, EMPTY_RESULT_SUMMARY, RETRIEVAL_TOOL_NAME};
pub use schema::{args_schema, parse_args};
