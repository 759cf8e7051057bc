//! Flat tag scanner for DA payloads.
//!
//! Payloads are XML-shaped but not always well formed (device templates contain
//! stray quote characters), so values are pulled out by plain text search:
//! first `<name>`, then the first `</name>` after it. Nested or repeated tags
//! with the same name are not handled; the first match wins.

/// Return the text between the first `<name>` and the following `</name>`,
/// or an empty string if either tag is missing.
pub fn field<'a>(payload: &'a str, name: &str) -> &'a str {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);

    let Some(start) = payload.find(&open) else {
        return "";
    };
    let value_start = start + open.len();
    match payload[value_start..].find(&close) {
        Some(len) => &payload[value_start..value_start + len],
        None => "",
    }
}

/// Parse hexadecimal text as reported by the device (`0x1000`, `1000`, `0`).
pub fn parse_hex_u64(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_basic() {
        assert_eq!(field("<a><x>1</x><y>2</y></a>", "x"), "1");
        assert_eq!(field("<a><x>1</x><y>2</y></a>", "y"), "2");
        assert_eq!(field("<a></a>", "z"), "");
    }

    #[test]
    fn test_field_missing_close() {
        assert_eq!(field("<a><x>1</a>", "x"), "");
    }

    #[test]
    fn test_field_first_match_wins() {
        assert_eq!(field("<pt><name>a</name></pt><pt><name>b</name></pt>", "name"), "a");
    }

    #[test]
    fn test_field_tolerates_malformed_markup() {
        let payload = r#"<ufs><lua2_size>0xee5800000</lua2_size><lua3_size>0</lua3_size"><id>4D54</id></ufs>"#;
        assert_eq!(field(payload, "lua2_size"), "0xee5800000");
        assert_eq!(field(payload, "id"), "4D54");
        // The close tag is mangled by the device, so the value is unavailable.
        assert_eq!(field(payload, "lua3_size"), "");
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u64("0x1000"), Some(0x1000));
        assert_eq!(parse_hex_u64("0X50C78"), Some(0x50C78));
        assert_eq!(parse_hex_u64("0"), Some(0));
        assert_eq!(parse_hex_u64(" 0x10 "), Some(0x10));
        assert_eq!(parse_hex_u64(""), None);
        assert_eq!(parse_hex_u64("0x"), None);
        assert_eq!(parse_hex_u64("zz"), None);
    }
}
