//! 代码分词
//!
//! 按非标识符字符切分，标识符整体保留并额外拆出 snake_case / camelCase 片段，统一小写。
//! 用于语义代码记忆在无嵌入模型时的关键词检索。

use std::collections::HashSet;

/// 将文本切分为小写 token（长度 ≥ 2）
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if word.chars().count() < 2 {
            continue;
        }
        let lower = word.to_lowercase();
        let parts = split_identifier(word);
        tokens.push(lower.clone());
        if parts.len() > 1 {
            tokens.extend(parts.into_iter().filter(|p| p.chars().count() >= 2 && *p != lower));
        }
    }
    tokens
}

/// snake_case 与 camelCase 拆分
fn split_identifier(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in word.split('_').filter(|p| !p.is_empty()) {
        let mut current = String::new();
        let mut prev_lower = false;
        for c in piece.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                parts.push(current.to_lowercase());
                current.clear();
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current.to_lowercase());
        }
    }
    parts
}

/// 分词并返回词集合（用于相似度计算）
pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 计算查询词在文档中的覆盖率（命中数 / 查询词数）
pub fn coverage_score(query: &HashSet<String>, doc: &HashSet<String>) -> f32 {
    if query.is_empty() || doc.is_empty() {
        return 0.0;
    }
    query.intersection(doc).count() as f32 / query.len() as f32
}
