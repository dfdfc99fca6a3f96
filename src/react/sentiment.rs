//! 情绪标签（仅供展示）
//!
//! 对每条用户输入做一次 temperature 0 的分类；结果只写入会话状态并在 verbose 模式下显示，不参与控制流。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::{ChatOptions, LlmClient};
use crate::memory::Message;

const CLASSIFY_PROMPT: &str = "Classify the sentiment of the user's message. \
Answer with exactly one word: positive, neutral or negative.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        };
        f.write_str(s)
    }
}

impl FromStr for Sentiment {
    type Err = String;

    /// 取回复中第一个可识别的标签词（模型常带标点或多余说明）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(|c: char| !c.is_alphabetic())
            .find_map(|w| match w.to_lowercase().as_str() {
                "positive" => Some(Sentiment::Positive),
                "neutral" => Some(Sentiment::Neutral),
                "negative" => Some(Sentiment::Negative),
                _ => None,
            })
            .ok_or_else(|| format!("unrecognized sentiment label: {}", s.trim()))
    }
}

pub struct SentimentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl SentimentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 无法识别的回复按 neutral 处理；调用失败原样返回
    pub async fn classify(&self, text: &str) -> Result<Sentiment, AgentError> {
        let messages = [Message::system(CLASSIFY_PROMPT), Message::human(text)];
        let reply = self
            .llm
            .complete(&messages, &ChatOptions::deterministic())
            .await?;
        Ok(reply.content.parse().unwrap_or_else(|e: String| {
            tracing::debug!(error = %e, "falling back to neutral sentiment");
            Sentiment::Neutral
        }))
    }
}
