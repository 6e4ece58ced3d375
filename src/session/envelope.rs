//! Inbound envelope of the evaluation engine.
//!
//! Every server frame looks like
//! `{"header": {"code": 0, "message": "success", "sid": ...}, "payload": {...}}`.
//! A result frame carries `payload.result.text`, which is base64 of a JSON
//! document.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ProxyError, Result};

/// `data.status` of the first frame of a session.
pub const STATUS_START: u8 = 0;
/// `data.status` of the last frame of a session.
pub const STATUS_END: u8 = 2;

#[derive(Debug, Deserialize)]
struct Envelope {
    header: Header,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Header {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    sid: Option<String>,
}

/// Classify one text frame.
///
/// `Ok(Some(result))` settles the session, `Ok(None)` means keep waiting.
pub fn interpret(text: &str) -> Result<Option<Value>> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| ProxyError::Parse(format!("malformed frame: {}", e)))?;

    if envelope.header.code != 0 {
        return Err(ProxyError::VendorRejected {
            code: envelope.header.code,
            message: envelope.header.message,
        });
    }

    let Some(encoded) = envelope
        .payload
        .as_ref()
        .and_then(|p| p.pointer("/result/text"))
        .and_then(Value::as_str)
    else {
        debug!(sid = ?envelope.header.sid, "intermediate frame without result");
        return Ok(None);
    };

    let decoded = BASE64.decode(encoded.trim())?;
    let result = serde_json::from_slice(&decoded)
        .map_err(|e| ProxyError::Parse(format!("result text is not JSON: {}", e)))?;
    Ok(Some(result))
}

/// Wrap a JSON result the way the engine does. Used to script vendor replies.
pub fn encode_result_frame(result: &Value) -> String {
    serde_json::json!({
        "header": {"code": 0, "message": "success", "sid": "ise000001", "status": STATUS_END},
        "payload": {"result": {"status": STATUS_END, "text": BASE64.encode(result.to_string())}}
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn success_frame_is_decoded() {
        let frame = encode_result_frame(&json!({"overall": 82}));
        let result = interpret(&frame).unwrap().unwrap();
        assert_eq!(result["overall"], 82);
    }

    #[test]
    fn frame_without_result_keeps_waiting() {
        let frame = r#"{"header":{"code":0,"message":"success","sid":"s1","status":1}}"#;
        assert!(interpret(frame).unwrap().is_none());
    }

    #[test]
    fn nonzero_code_is_vendor_rejected_with_message() {
        let frame = r#"{"header":{"code":11201,"message":"licc limit","sid":"s1"}}"#;
        let err = interpret(frame).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VendorRejected);
        assert!(err.to_string().contains("licc limit"));
    }

    #[test]
    fn garbage_is_parse_error() {
        assert_eq!(
            interpret("not json").unwrap_err().kind(),
            ErrorKind::ParseError
        );
        assert_eq!(
            interpret(r#"{"payload":{}}"#).unwrap_err().kind(),
            ErrorKind::ParseError
        );
    }

    #[test]
    fn bad_base64_or_json_in_result_is_parse_error() {
        let bad_b64 = r#"{"header":{"code":0},"payload":{"result":{"text":"@@@"}}}"#;
        assert_eq!(interpret(bad_b64).unwrap_err().kind(), ErrorKind::ParseError);

        let not_json = format!(
            r#"{{"header":{{"code":0}},"payload":{{"result":{{"text":"{}"}}}}}}"#,
            BASE64.encode("<xml/>")
        );
        assert_eq!(
            interpret(&not_json).unwrap_err().kind(),
            ErrorKind::ParseError
        );
    }
}
