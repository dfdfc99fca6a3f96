//! 文档分块
//!
//! 每块最多 chunk_size 个字符；未到文末时在窗口内最后一个分隔符（按优先级）之后断开，
//! 下一块从上一块末尾回退 chunk_overlap 个字符开始。直接在 &str 上按字节位置切片，
//! 所有切点都落在字符边界上。

/// 一个文本块；id 与来源元数据由导入方生成
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 在文档中的序号（只计非空块）
    pub index: usize,
    /// 去掉首尾空白后的文本
    pub text: String,
    /// text 在原文中的字节偏移
    pub offset: usize,
}

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 块大小上限（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: ["\n\n", "\n", ". ", "! ", "? ", " "]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

/// s 中前 n 个字符的字节长度
fn prefix_len(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// 窗口内的断点：优先级最高且出现过的分隔符，取其最后一次出现之后
    fn break_point(&self, window: &str) -> Option<usize> {
        self.config
            .separators
            .iter()
            .filter(|sep| !sep.is_empty())
            .find_map(|sep| window.rfind(sep.as_str()).map(|pos| pos + sep.len()))
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let size = self.config.chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let rest = &text[start..];
            let window = prefix_len(rest, size);
            let end = if window == rest.len() {
                window
            } else {
                self.break_point(&rest[..window]).unwrap_or(window)
            };

            let piece = &rest[..end];
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                let lead = piece.len() - piece.trim_start().len();
                chunks.push(Chunk {
                    index: chunks.len(),
                    text: trimmed.to_string(),
                    offset: start + lead,
                });
            }
            if end == rest.len() {
                break;
            }

            // 回退 overlap 个字符；回退后不前进时直接从块尾继续
            let piece_chars = piece.chars().count();
            let keep = piece_chars - self.config.chunk_overlap.min(piece_chars);
            let next = start + prefix_len(piece, keep);
            start = if next > start { next } else { start + end };
        }

        chunks
    }
}
