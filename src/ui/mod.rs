//! UI 层：终端彩色方框与流式回显

pub mod render;

pub use render::{truncate_for_display, wrap_text, Console};
