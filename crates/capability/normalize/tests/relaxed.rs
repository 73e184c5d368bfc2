use bridge_normalize::{
    DEFAULT_TEXT_MAX_LEN, NormalizeError, find_value_span, parse_number, parse_text,
    parse_text_into,
};
use domain::FieldKey;

/// 宽松写法与严格 JSON 文档应得到相同的值。
#[test]
fn relaxed_forms_match_strict_reference() {
    let strict = r#"{"currentQty":5,"setQty":-10.5,"temp":2.25e1,"status":"OK","deviceID":"esp-01"}"#;
    let reference: serde_json::Value = serde_json::from_str(strict).expect("reference");
    let relaxed = [
        strict,
        "{currentQty:5, setQty : -10.5 ,temp: 2.25e1, status:'OK', deviceID : \"esp-01\"}",
        "{ 'currentQty' : '5', \"setQty\":\"-10.5\",\n temp:22.5,status : OK ,deviceID:esp-01}",
    ];

    for payload in relaxed {
        for key in ["currentQty", "setQty", "temp"] {
            let expected = reference[key].as_f64().expect("number");
            assert_eq!(parse_number(payload, key), Ok(expected), "{key} in {payload}");
        }
        for key in ["status", "deviceID"] {
            let expected = reference[key].as_str().expect("text");
            assert_eq!(
                parse_text(payload, key, DEFAULT_TEXT_MAX_LEN).as_deref(),
                Ok(expected),
                "{key} in {payload}"
            );
        }
    }
}

#[test]
fn number_with_trailing_garbage_fails() {
    let err = parse_number(r#"{"temp":"12a"}"#, "temp").expect_err("trailing garbage");
    assert_eq!(
        err,
        NormalizeError::InvalidNumber {
            key: "temp".to_string(),
            token: "12a".to_string(),
        }
    );
    assert!(parse_number(r#"{"temp":12 3}"#, "temp").is_err());
    assert!(parse_number(r#"{"temp":}"#, "temp").is_err());
    assert!(parse_number(r#"{"temp":"inf"}"#, "temp").is_err());
    assert!(parse_number(r#"{"temp":1e999}"#, "temp").is_err());
}

#[test]
fn number_tolerates_whitespace_and_quotes() {
    assert_eq!(parse_number("{temp:  7 }", "temp"), Ok(7.0));
    assert_eq!(parse_number("{temp:' -0.5 '}", "temp"), Err(NormalizeError::InvalidNumber {
        key: "temp".to_string(),
        token: "-0.5 ".to_string(),
    }));
    assert_eq!(parse_number("{temp:'-0.5'}", "temp"), Ok(-0.5));
}

#[test]
fn number_skips_leading_space_inside_quotes() {
    assert_eq!(parse_number(r#"{"temp":" 5"}"#, "temp"), Ok(5.0));
    assert_eq!(parse_number("{temp:'\t2.5'}", "temp"), Ok(2.5));
    assert!(parse_number(r#"{"temp":"5 "}"#, "temp").is_err());
}

#[test]
fn missing_key_is_not_found() {
    assert_eq!(
        parse_number(r#"{"foo":1}"#, "temp"),
        Err(NormalizeError::NotFound("temp".to_string()))
    );
    assert!(parse_text(r#"{"foo":1}"#, "status", 16).is_err());
}

#[test]
fn text_into_never_writes_past_buffer() {
    let long = "x".repeat(300);
    let payload = format!(r#"{{"status":"{long}"}}"#);
    for len in 0..40 {
        let mut buf = vec![0xAAu8; len + 8];
        let copied = parse_text_into(&payload, "status", &mut buf[..len]).expect("found");
        assert!(copied < len.max(1));
        assert!(buf[len..].iter().all(|byte| *byte == 0xAA), "wrote past {len}");
        if len > 0 {
            assert_eq!(copied, len - 1);
            assert_eq!(buf[copied], 0);
        }
    }
}

#[test]
fn text_truncates_silently_on_char_boundary() {
    let payload = r#"{"status":"溫度過高"}"#;
    // 每个汉字 3 字节：上限 7 字节 → 只能放下两个字
    assert_eq!(parse_text(payload, "status", 8).as_deref(), Ok("溫度"));
    assert_eq!(parse_text(payload, "status", 1).as_deref(), Ok(""));
    assert_eq!(parse_text(payload, "status", 0).as_deref(), Ok(""));
}

#[test]
fn text_strips_exactly_one_quote_layer() {
    assert_eq!(parse_text(r#"{s:"'a'"}"#, "s", 16).as_deref(), Ok("'a'"));
    assert_eq!(parse_text("{s: plain text }", "s", 16).as_deref(), Ok("plain text"));
}

/// 对词表中任意两个 key：若 A 是 B 的子串，只含 B 的 payload 不能取到 A。
#[test]
fn key_boundary_holds_for_substring_keys() {
    let mut keys: Vec<&str> = FieldKey::ALL.iter().map(|key| key.as_str()).collect();
    keys.extend(["Qty", "Time", "ID", "code"]);
    for a in &keys {
        for b in &keys {
            if a == b || !b.contains(a) {
                continue;
            }
            for payload in [format!(r#"{{"{b}":1}}"#), format!("{{{b}:1}}")] {
                assert!(find_value_span(&payload, a).is_none(), "{a} matched in {payload}");
            }
        }
    }
}

#[test]
fn unquoted_key_single_quoted_value_matches_double_quoted_form() {
    let relaxed = "{status:'RUN'}";
    let strict = r#"{"status":"RUN"}"#;
    assert_eq!(
        parse_text(relaxed, "status", DEFAULT_TEXT_MAX_LEN),
        parse_text(strict, "status", DEFAULT_TEXT_MAX_LEN)
    );
    assert_eq!(parse_number("{temp:'4'}", "temp"), parse_number(r#"{"temp":"4"}"#, "temp"));
}

#[test]
fn unquoted_delimiters_cut_values() {
    // 已知限制：裸值遇到 ',' 或 '}' 即结束
    assert_eq!(parse_text("{s:a,b}", "s", 16).as_deref(), Ok("a"));
    assert_eq!(parse_text(r#"{s:"a}b"}"#, "s", 16).as_deref(), Ok("a}b"));
}
