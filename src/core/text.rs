//! 文本工具：去 Markdown 代码围栏、按字符截断（保头 / 保尾）

/// 若整段回复被 ``` 围栏包裹（可带语言标记），取出围栏内的内容；否则原样返回
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return text.to_string();
    }
    let after_open = match trimmed.find('\n') {
        Some(i) => &trimmed[i + 1..],
        None => return String::new(),
    };
    let body = match after_open.rfind("```") {
        Some(end) => &after_open[..end],
        None => after_open,
    };
    let mut out = body.trim_end().to_string();
    out.push('\n');
    out
}

/// 保留前 max 个字符，超出部分以 `...[truncated]` 标记
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        text.chars().take(max).collect::<String>() + "\n...[truncated]"
    } else {
        text.to_string()
    }
}

/// 保留末尾 max 个字符（日志尾部最有信息量）
pub fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count > max {
        let tail: String = text.chars().skip(count - max).collect();
        format!("...{}", tail)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```python\nprint('hi')\n```"), "print('hi')\n");
        assert_eq!(strip_code_fences("```\na = 1\n```\n"), "a = 1\n");
        assert_eq!(strip_code_fences("plain = True\n"), "plain = True\n");
        assert_eq!(strip_code_fences("```js\nconst x = 1;"), "const x = 1;\n");
    }

    #[test]
    fn test_truncate_and_tail() {
        assert_eq!(truncate_chars("abcdef", 3), "abc\n...[truncated]");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(tail_chars("abcdef", 2), "...ef");
        assert_eq!(tail_chars("日志尾部", 10), "日志尾部");
    }
}
