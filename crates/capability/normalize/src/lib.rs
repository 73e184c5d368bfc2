//! 宽松字段提取：在不保证格式正确的文本中按 key 取值，并解析为数值或文本。
//!
//! 每次调用相互独立，只读输入文本，不持有跨字段状态。

mod span;

use domain::{FieldKey, FieldKind, FieldValue};

pub use span::{ValueSpan, find_value_span};

/// 文本字段缓冲区默认长度（含结尾哨兵字节）。
pub const DEFAULT_TEXT_MAX_LEN: usize = 128;

/// 规范化错误。
///
/// 均为可预期的逐字段失败，不影响其他字段。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("invalid number for {key}: {token:?}")]
    InvalidNumber { key: String, token: String },
}

/// 取值并解析为 f64。
///
/// 裁剪空白、去掉一层成对引号后，整段 token 必须被数值语法完整消费，
/// 例如 `"12a"` 失败；引号内的前导空白被跳过（`" 5"` 为 5）。结果必须是有限值。
pub fn parse_number(text: &str, key: &str) -> Result<f64, NormalizeError> {
    let token = located_token(text, key)?.trim_start_matches(is_ascii_space);
    if !is_numeric_literal(token) {
        return Err(NormalizeError::InvalidNumber {
            key: key.to_string(),
            token: token.to_string(),
        });
    }
    match token.parse::<f64>() {
        // 指数溢出（如 1e999）得到 inf，视为非法值
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(NormalizeError::InvalidNumber {
            key: key.to_string(),
            token: token.to_string(),
        }),
    }
}

/// 取值并按有界缓冲区语义复制到 `out`。
///
/// 最多复制 `out.len() - 1` 字节，之后写入 `0` 哨兵；超长内容静默截断。
/// 返回复制的字节数（不含哨兵）。`out` 为空时不写入任何字节。
pub fn parse_text_into(text: &str, key: &str, out: &mut [u8]) -> Result<usize, NormalizeError> {
    let token = located_token(text, key)?;
    let Some(capacity) = out.len().checked_sub(1) else {
        return Ok(0);
    };
    let copied = token.len().min(capacity);
    out[..copied].copy_from_slice(&token.as_bytes()[..copied]);
    out[copied] = 0;
    Ok(copied)
}

/// 取值并返回不超过 `max_len - 1` 字节的字符串。
///
/// 截断点回退到最近的 UTF-8 字符边界，保证结果合法。
pub fn parse_text(text: &str, key: &str, max_len: usize) -> Result<String, NormalizeError> {
    let token = located_token(text, key)?;
    let mut cut = token.len().min(max_len.saturating_sub(1));
    while !token.is_char_boundary(cut) {
        cut -= 1;
    }
    Ok(token[..cut].to_string())
}

/// 按字段词表中的类型解析。
pub fn parse_field(
    text: &str,
    key: FieldKey,
    text_max_len: usize,
) -> Result<FieldValue, NormalizeError> {
    match key.kind() {
        FieldKind::Number => parse_number(text, key.as_str()).map(FieldValue::Number),
        FieldKind::Text => parse_text(text, key.as_str(), text_max_len).map(FieldValue::Text),
    }
}

fn located_token<'a>(text: &'a str, key: &str) -> Result<&'a str, NormalizeError> {
    let span = find_value_span(text, key).ok_or_else(|| NormalizeError::NotFound(key.to_string()))?;
    Ok(strip_quotes(trim_space(span.slice(text))))
}

fn trim_space(value: &str) -> &str {
    value.trim_matches(is_ascii_space)
}

fn is_ascii_space(ch: char) -> bool {
    ch.is_ascii() && span::is_space(ch as u8)
}

/// 去掉一层成对的单/双引号。
fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && span::is_quote(bytes[0]) && bytes[bytes.len() - 1] == bytes[0] {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// `[+-]? (digits ['.' digits?] | '.' digits) ([eE] [+-]? digits)?`
fn is_numeric_literal(token: &str) -> bool {
    let bytes = token.as_bytes();
    let mut idx = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        idx += 1;
    }
    let int_digits = count_digits(&bytes[idx..]);
    idx += int_digits;
    let mut frac_digits = 0;
    if bytes.get(idx) == Some(&b'.') {
        idx += 1;
        frac_digits = count_digits(&bytes[idx..]);
        idx += frac_digits;
    }
    if int_digits == 0 && frac_digits == 0 {
        return false;
    }
    if matches!(bytes.get(idx), Some(b'e' | b'E')) {
        idx += 1;
        if matches!(bytes.get(idx), Some(b'+' | b'-')) {
            idx += 1;
        }
        let exp_digits = count_digits(&bytes[idx..]);
        if exp_digits == 0 {
            return false;
        }
        idx += exp_digits;
    }
    idx == bytes.len()
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|byte| byte.is_ascii_digit()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_literal_grammar() {
        for ok in ["0", "-1", "+2", "3.", ".5", "1e3", "-1.2E-3", "10e+2"] {
            assert!(is_numeric_literal(ok), "{ok}");
        }
        for bad in ["", "-", ".", "e3", "1e", "12a", "inf", "NaN", "0x10", "1 2", "--1"] {
            assert!(!is_numeric_literal(bad), "{bad}");
        }
    }

    #[test]
    fn strip_quotes_removes_one_matching_layer() {
        assert_eq!(strip_quotes("\"\"ok\"\""), "\"ok\"");
        assert_eq!(strip_quotes("'ok'"), "ok");
        assert_eq!(strip_quotes("'ok\""), "'ok\"");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[test]
    fn parse_field_uses_key_kind() {
        let payload = r#"{"status":"1","temp":"1"}"#;
        assert_eq!(
            parse_field(payload, FieldKey::Status, DEFAULT_TEXT_MAX_LEN),
            Ok(FieldValue::Text("1".to_string()))
        );
        assert_eq!(
            parse_field(payload, FieldKey::Temp, DEFAULT_TEXT_MAX_LEN),
            Ok(FieldValue::Number(1.0))
        );
    }
}
