//! 代码分块与相似度
//!
//! 按文件扩展名选择分隔符优先级（Python / JS-TS / HTML / 通用），在分隔符处断块并保留重叠。

use std::path::Path;

/// 文档块
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 块 ID：<source>#<序号>
    pub id: String,
    pub text: String,
    /// 来源文件（code 目录下的相对路径）
    pub source: String,
    /// 在原文中的字节偏移
    pub offset: usize,
}

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            separators: generic_separators(),
        }
    }
}

impl ChunkingConfig {
    /// 按文件扩展名选择分隔符
    pub fn for_file(file_path: &str, chunk_size: usize, chunk_overlap: usize) -> Self {
        let ext = Path::new(file_path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let separators = match ext.as_str() {
            "py" => to_strings(&["\nclass ", "\ndef ", "\n\tdef ", "\n    def ", "\n\n", "\n", " "]),
            "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => to_strings(&[
                "\nfunction ",
                "\nconst ",
                "\nlet ",
                "\nexport ",
                "\nclass ",
                "\nif ",
                "\n\n",
                "\n",
                " ",
            ]),
            "html" | "htm" => to_strings(&[
                "<body", "<div", "<section", "<p", "<ul", "<table", "<script", "\n\n", "\n", " ",
            ]),
            _ => generic_separators(),
        };
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
            separators,
        }
    }
}

fn generic_separators() -> Vec<String> {
    to_strings(&["\n\n", "\n", ". ", " "])
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// 文档分块器
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// 在 [start, end) 内最靠后的高优先级分隔符处断开；找不到时硬切
    fn break_point(&self, chars: &[char], start: usize, end: usize) -> usize {
        if end >= chars.len() {
            return end;
        }
        let window: String = chars[start..end].iter().collect();
        self.config
            .separators
            .iter()
            .filter_map(|sep| window.rfind(sep.as_str()))
            .map(|byte_pos| window[..byte_pos].chars().count())
            .find(|&n| n > 0)
            .map(|n| start + n)
            .unwrap_or(end)
    }

    /// 切分单个文件；块文本去首尾空白，空块丢弃，序号只计非空块
    pub fn chunk(&self, source: &str, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let size = self.config.chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut byte_offset = 0;

        while start < chars.len() {
            let end = self
                .break_point(&chars, start, (start + size).min(chars.len()))
                .max(start + 1);
            let body: String = chars[start..end].iter().collect();
            let trimmed = body.trim();
            if !trimmed.is_empty() {
                chunks.push(Chunk {
                    id: format!("{}#{}", source, chunks.len()),
                    text: trimmed.to_string(),
                    source: source.to_string(),
                    offset: byte_offset,
                });
            }
            if end >= chars.len() {
                break;
            }

            let overlap = self.config.chunk_overlap.min(end - start);
            let next = if end - overlap > start { end - overlap } else { end };
            byte_offset += chars[start..next].iter().map(|c| c.len_utf8()).sum::<usize>();
            start = next;
        }
        chunks
    }
}

/// 余弦相似度
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
