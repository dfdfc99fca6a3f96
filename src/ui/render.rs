//! 终端渲染
//!
//! Console 包装输出流：彩色方框（用户、助手、工具、错误）、输入提示符，
//! 以及流式回显（实现 Write，首个字节前自动打印助手标签）。

use std::io::{self, IsTerminal, Write};

use crossterm::style::{Color, Stylize};

use crate::core::AgentError;
use crate::memory::ToolCallRequest;

/// 方框内容最大宽度（字符数）
const BOX_WIDTH: usize = 76;
/// 工具结果在方框中显示的最大字符数，超出折叠
const MAX_TOOL_DISPLAY_CHARS: usize = 280;

/// 对过长内容做折叠：保留前 N 字 + 省略提示
pub fn truncate_for_display(content: &str, limit: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= limit {
        return content.to_string();
    }
    let head: String = chars.iter().take(limit).collect();
    format!("{}\n... [{} chars total]", head, chars.len())
}

/// 按宽度换行，按字符计数，避免在 UTF-8 中间截断
pub fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let mut line = String::new();
        for ch in para.chars() {
            if line.chars().count() >= width {
                lines.push(std::mem::take(&mut line));
            }
            line.push(ch);
        }
        lines.push(line);
    }
    lines
}

/// 终端输出
pub struct Console<W: Write> {
    out: W,
    color: bool,
    verbose: bool,
    assistant_open: bool,
}

impl Console<io::Stdout> {
    /// 标准输出；重定向到管道或文件时不输出颜色转义
    pub fn stdout(verbose: bool) -> Self {
        let out = io::stdout();
        let color = out.is_terminal();
        Self::new(out, color, verbose)
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W, color: bool, verbose: bool) -> Self {
        Self {
            out,
            color,
            verbose,
            assistant_open: false,
        }
    }

    /// 无颜色输出（测试 / 管道）
    pub fn plain(out: W, verbose: bool) -> Self {
        Self::new(out, false, verbose)
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn paint(&self, s: &str, color: Color) -> String {
        if self.color {
            format!("{}", s.with(color))
        } else {
            s.to_string()
        }
    }

    /// 画一个带标题的方框
    pub fn boxed(&mut self, title: &str, body: &str, color: Color) -> io::Result<()> {
        let lines = wrap_text(body, BOX_WIDTH);
        let inner = lines
            .iter()
            .map(|l| l.chars().count())
            .chain(std::iter::once(title.chars().count() + 2))
            .max()
            .unwrap_or(0);
        let top = format!(
            "╭─ {} {}╮",
            title,
            "─".repeat(inner.saturating_sub(title.chars().count() + 1))
        );
        let bottom = format!("╰{}╯", "─".repeat(inner + 2));
        writeln!(self.out, "{}", self.paint(&top, color))?;
        for line in &lines {
            let pad = inner - line.chars().count();
            let side = self.paint("│", color);
            writeln!(self.out, "{} {}{} {}", side, line, " ".repeat(pad), side)?;
        }
        writeln!(self.out, "{}", self.paint(&bottom, color))?;
        self.out.flush()
    }

    pub fn prompt(&mut self) -> io::Result<()> {
        let p = self.paint("> ", Color::Cyan);
        write!(self.out, "{}", p)?;
        self.out.flush()
    }

    pub fn welcome(&mut self, exit_keyword: &str, tools: &[String]) -> io::Result<()> {
        let body = format!(
            "Ask a question about the indexed documents.\nTools: {}\nType `{}` to quit.",
            tools.join(", "),
            exit_keyword
        );
        self.boxed("tome", &body, Color::Cyan)
    }

    /// 非流式模式下的最终回复
    pub fn assistant_box(&mut self, content: &str) -> io::Result<()> {
        self.boxed("Assistant", content, Color::Green)
    }

    /// 流式回显结束：若已输出过内容则换行
    pub fn end_assistant(&mut self) -> io::Result<()> {
        if self.assistant_open {
            self.assistant_open = false;
            writeln!(self.out)?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn tool_call(&mut self, call: &ToolCallRequest) -> io::Result<()> {
        if !self.verbose {
            return Ok(());
        }
        let title = format!("Tool · {}", call.name);
        self.boxed(&title, &call.arguments.to_string(), Color::Yellow)
    }

    pub fn tool_result(&mut self, tool: &str, content: &str) -> io::Result<()> {
        if !self.verbose {
            return Ok(());
        }
        let title = format!("Result · {}", tool);
        let body = truncate_for_display(content, MAX_TOOL_DISPLAY_CHARS);
        self.boxed(&title, &body, Color::Yellow)
    }

    pub fn note(&mut self, text: &str) -> io::Result<()> {
        if !self.verbose {
            return Ok(());
        }
        let line = self.paint(text, Color::DarkGrey);
        writeln!(self.out, "{}", line)?;
        self.out.flush()
    }

    pub fn error_banner(&mut self, err: &AgentError) -> io::Result<()> {
        self.end_assistant()?;
        self.boxed("Error", &err.to_string(), Color::Red)
    }
}

impl<W: Write> Write for Console<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.assistant_open && !buf.is_empty() {
            self.assistant_open = true;
            let label = self.paint("Assistant: ", Color::Green);
            write!(self.out, "{}", label)?;
        }
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
