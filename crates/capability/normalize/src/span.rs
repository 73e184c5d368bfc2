//! 宽松 key/value 定位
//!
//! 语法（刻意宽松，不是完整 JSON）：
//!
//! ```text
//! key-ref   := key | '"' key '"' | '\'' key '\''
//! pair      := key-ref ws* ':' ws* value
//! value     := '"' ... '"'  |  '\'' ... '\''  |  bare
//! bare      := 直到下一个 ',' 或 '}'（不含）或文本结尾
//! ```
//!
//! - key 前一个字符为字母、数字或 `_` 时不算命中（避免短 key 命中长 key 的后缀）
//! - 只取第一个满足语法的出现位置，重复 key 不合并、不覆盖
//! - 不支持嵌套对象/数组、转义字符；值里未加引号的 `,`/`}` 会被截断，
//!   引号内的值在第一个同类引号处结束

use std::ops::Range;

/// payload 中的候选值区间（字节偏移，左闭右开）。
///
/// 区间可能带前后空白与引号，尚未裁剪。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSpan {
    pub begin: usize,
    pub end: usize,
}

impl ValueSpan {
    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// 取出区间对应的原文。区间边界总落在 ASCII 分隔符上，因此是合法字符边界。
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.range()]
    }
}

/// 在 `text` 中查找 `key` 的值区间；找不到或语法不满足时返回 `None`。
pub fn find_value_span(text: &str, key: &str) -> Option<ValueSpan> {
    let bytes = text.as_bytes();
    let needle = key.as_bytes();
    if needle.is_empty() || needle.len() > bytes.len() {
        return None;
    }

    let mut from = 0;
    while let Some(start) = find_from(bytes, needle, from) {
        from = start + 1;
        let prev = start.checked_sub(1).map(|idx| bytes[idx]);
        if prev.is_some_and(is_ident_byte) {
            continue;
        }

        let mut cursor = start + needle.len();
        if let Some(quote) = prev.filter(|byte| is_quote(*byte)) {
            if bytes.get(cursor) == Some(&quote) {
                cursor += 1;
            }
        }
        cursor = skip_space(bytes, cursor);
        if bytes.get(cursor) != Some(&b':') {
            continue;
        }

        let begin = skip_space(bytes, cursor + 1);
        let end = value_end(bytes, begin);
        return Some(ValueSpan { begin, end });
    }
    None
}

fn value_end(bytes: &[u8], begin: usize) -> usize {
    match bytes.get(begin) {
        Some(&quote) if is_quote(quote) => {
            match bytes[begin + 1..].iter().position(|byte| *byte == quote) {
                Some(offset) => begin + 1 + offset + 1,
                None => bytes.len(),
            }
        }
        _ => bytes[begin..]
            .iter()
            .position(|byte| matches!(byte, b',' | b'}'))
            .map(|offset| begin + offset)
            .unwrap_or(bytes.len()),
    }
}

fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn skip_space(bytes: &[u8], mut cursor: usize) -> usize {
    while cursor < bytes.len() && is_space(bytes[cursor]) {
        cursor += 1;
    }
    cursor
}

/// 与 C 语言 `isspace` 一致（含 `\v`、`\f`）。
pub(crate) fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

pub(crate) fn is_quote(byte: u8) -> bool {
    byte == b'"' || byte == b'\''
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
