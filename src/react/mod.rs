//! 对话控制层：回合路由、流式组装、单轮驱动、情绪标签

pub mod loop_;
pub mod router;
pub mod sentiment;
pub mod stream;

pub use loop_::TurnRunner;
pub use router::{Route, TurnRouter};
pub use sentiment::{Sentiment, SentimentClassifier};
pub use stream::StreamAssembler;
