//! Inbound body decoding.
//!
//! An inbound body becomes a [`JsonRpcMessage`] only if its media type is
//! `application/json`, it decodes in the declared charset (UTF-8 when none
//! is given), it parses as JSON, and it passes message validation. Nothing
//! is published otherwise.

use std::borrow::Cow;

use encoding_rs::{Encoding, REPLACEMENT, UTF_8};
use relay_rpc::JsonRpcMessage;
use serde_json::Value;

use crate::errors::DecodeError;

/// Decode a raw request body.
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<JsonRpcMessage, DecodeError> {
    let content_type = content_type.ok_or(DecodeError::MissingContentType)?;
    let encoding = body_encoding(content_type)?;
    let text = decode_text(encoding, body)?;
    Ok(JsonRpcMessage::from_json(&text)?)
}

/// Decode a body the HTTP layer already parsed as JSON.
pub fn decode_value(value: Value) -> Result<JsonRpcMessage, DecodeError> {
    Ok(JsonRpcMessage::from_value(value)?)
}

/// Check the media type and resolve the declared charset.
fn body_encoding(content_type: &str) -> Result<&'static Encoding, DecodeError> {
    let mut parts = content_type.split(';');
    let media = parts.next().unwrap_or_default().trim();
    if !media.eq_ignore_ascii_case("application/json") {
        return Err(DecodeError::UnsupportedContentType(content_type.to_owned()));
    }
    for param in parts {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("charset") {
            let charset = value.trim().trim_matches('"');
            return match Encoding::for_label(charset.as_bytes()) {
                Some(encoding) if encoding != REPLACEMENT => Ok(encoding),
                _ => Err(DecodeError::UnsupportedCharset(charset.to_owned())),
            };
        }
    }
    Ok(UTF_8)
}

fn decode_text<'a>(encoding: &'static Encoding, body: &'a [u8]) -> Result<Cow<'a, str>, DecodeError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or(DecodeError::InvalidEncoding(encoding.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use relay_rpc::MessageError;
    use serde_json::json;

    const PING: &[u8] = br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

    #[test]
    fn accepts_plain_json() {
        let msg = decode_body(Some("application/json"), PING).unwrap();
        assert_eq!(msg.method(), Some("ping"));
    }

    #[test]
    fn accepts_charset_variants() {
        for ct in [
            "application/json; charset=utf-8",
            "application/json;charset=UTF-8",
            "Application/JSON; charset=\"utf8\"",
            "application/json; boundary=x",
        ] {
            assert!(decode_body(Some(ct), PING).is_ok(), "{ct}");
        }
    }

    #[test]
    fn rejects_missing_content_type() {
        assert_matches!(decode_body(None, PING), Err(DecodeError::MissingContentType));
    }

    #[test]
    fn rejects_text_plain() {
        assert_matches!(
            decode_body(Some("text/plain"), PING),
            Err(DecodeError::UnsupportedContentType(ct)) if ct == "text/plain"
        );
    }

    #[test]
    fn decodes_latin1_body() {
        let body = b"{\"jsonrpc\":\"2.0\",\"method\":\"note\",\"params\":{\"t\":\"caf\xe9\"}}";
        let msg = decode_body(Some("application/json; charset=iso-8859-1"), body).unwrap();
        assert_matches!(msg, JsonRpcMessage::Notification { params: Some(ref p), .. } if p["t"] == "café");
    }

    #[test]
    fn decodes_utf16_bodies() {
        let text = r#"{"jsonrpc":"2.0","id":"u","method":"ping","params":{"t":"✓"}}"#;
        let le: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let be: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();

        for (charset, body) in [("utf-16le", le), ("UTF-16BE", be)] {
            let msg = decode_body(Some(&format!("application/json; charset={charset}")), &body).unwrap();
            assert_matches!(msg, JsonRpcMessage::Request { params: Some(ref p), .. } if p["t"] == "✓");
        }
    }

    #[test]
    fn rejects_unknown_charset() {
        assert_matches!(
            decode_body(Some("application/json; charset=x-klingon"), PING),
            Err(DecodeError::UnsupportedCharset(cs)) if cs == "x-klingon"
        );
        assert_matches!(
            decode_body(Some("application/json; charset=iso-2022-kr"), PING),
            Err(DecodeError::UnsupportedCharset(_))
        );
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_matches!(
            decode_body(Some("application/json"), &[0xff, 0xfe]),
            Err(DecodeError::InvalidEncoding("UTF-8"))
        );
    }

    #[test]
    fn rejects_bytes_invalid_in_declared_charset() {
        assert_matches!(
            decode_body(Some("application/json; charset=shift_jis"), &[0x81, 0x20]),
            Err(DecodeError::InvalidEncoding("Shift_JIS"))
        );
    }

    #[test]
    fn rejects_invalid_json() {
        assert_matches!(
            decode_body(Some("application/json"), b"{not json"),
            Err(DecodeError::Message(MessageError::Json(_)))
        );
    }

    #[test]
    fn rejects_schema_violations() {
        assert_matches!(
            decode_body(Some("application/json"), br#"{"jsonrpc":"1.0","method":"x"}"#),
            Err(DecodeError::Message(MessageError::InvalidVersion))
        );
        assert_matches!(
            decode_body(Some("application/json"), b"[1,2]"),
            Err(DecodeError::Message(MessageError::NotAnObject))
        );
    }

    #[test]
    fn pre_parsed_value_skips_media_check() {
        let msg = decode_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).unwrap();
        assert_eq!(msg.id(), None);
        assert!(decode_value(json!({"method": "x"})).is_err());
    }
}
