//! 流式回复组装
//!
//! 逐个消费片段：非空文本立即写到输出并缓冲；无论内容是否为空都记住最后一个片段，
//! 因为工具调用可能挂在无文本的末尾片段上。流结束后按到达顺序拼接文本，
//! 工具调用取自最后一个片段。零片段是合法的：空内容、空工具列表。

use std::io::Write;

use futures_util::StreamExt;

use crate::core::AgentError;
use crate::llm::{Fragment, FragmentStream};
use crate::memory::Message;

#[derive(Debug, Default, Clone, Copy)]
pub struct StreamAssembler;

impl StreamAssembler {
    pub fn new() -> Self {
        Self
    }

    /// 消费整个片段流，边回显边组装出一条 assistant 消息
    pub async fn assemble<W: Write + ?Sized>(
        &self,
        mut stream: FragmentStream,
        out: &mut W,
    ) -> Result<Message, AgentError> {
        let mut buffer: Vec<String> = Vec::new();
        let mut last: Option<Fragment> = None;

        while let Some(item) = stream.next().await {
            let fragment = item?;
            if !fragment.text.is_empty() {
                out.write_all(fragment.text.as_bytes())?;
                out.flush()?;
                buffer.push(fragment.text.clone());
            }
            last = Some(fragment);
        }

        let tool_calls = last.map(|f| f.tool_calls).unwrap_or_default();
        Ok(Message::assistant_with_tools(buffer.concat(), tool_calls))
    }
}
