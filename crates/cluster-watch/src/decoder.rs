use crate::event::WatchEvent;

/// Reason a framed line could not be decoded into a `WatchEvent`.
///
/// Decode failures never end a session; the session logs and drops the line.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty line")]
    Empty,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line is not a JSON object")]
    NotAnObject,
    #[error("line has no string `type` member")]
    MissingType,
}

/// Decodes one framed line (boundary bytes already stripped).
pub fn decode_line(line: &[u8]) -> Result<WatchEvent, DecodeError> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }
    let raw: serde_json::Value = serde_json::from_slice(line)?;
    let Some(fields) = raw.as_object() else {
        return Err(DecodeError::NotAnObject);
    };
    let event_type = fields
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(DecodeError::MissingType)?
        .to_string();
    let object = fields
        .get("object")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    Ok(WatchEvent {
        event_type,
        object,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_type_object_and_raw() {
        let event = decode_line(br#"{"type":"ADDED","object":{"id":1},"extra":true}"#)
            .expect("decode");
        assert_eq!(event.event_type, "ADDED");
        assert_eq!(event.object, serde_json::json!({"id": 1}));
        assert_eq!(
            event.raw.get("extra").and_then(|v| v.as_bool()),
            Some(true)
        );
    }

    #[test]
    fn missing_object_decodes_as_null() {
        let event = decode_line(br#"{"type":"BOOKMARK"}"#).expect("decode");
        assert!(event.object.is_null());
    }

    #[test]
    fn empty_and_blank_lines_fail() {
        assert!(matches!(decode_line(b""), Err(DecodeError::Empty)));
        assert!(matches!(decode_line(b"  \t"), Err(DecodeError::Empty)));
    }

    #[test]
    fn malformed_lines_fail_without_panicking() {
        assert!(matches!(
            decode_line(br#"{"type":"ADD"#),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(decode_line(b"[1,2]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(
            decode_line(br#"{"object":{}}"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(
            decode_line(br#"{"type":5}"#),
            Err(DecodeError::MissingType)
        ));
    }
}
