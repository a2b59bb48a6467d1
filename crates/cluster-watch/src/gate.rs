use std::time::Duration;

use futures::StreamExt as _;
use reqwest::StatusCode;
use serde_json::Value;

use crate::errors::WatchError;
use crate::transport::{ByteStream, PendingResponse};

// Rejected bodies are read for diagnostics only, up to this many bytes.
const MAX_DIAGNOSTIC_BODY_BYTES: usize = 64 * 1024;
// A rejected body left open by the server is abandoned after this long.
const DIAGNOSTIC_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Status gate between the "headers received" and "body stream" stages.
pub struct ResponseGate;

impl ResponseGate {
    /// Releases the body for a `200 OK` response.
    ///
    /// Any other status becomes `WatchError::Status`; its body is read (bounded
    /// in size and time) for a diagnostic message and never forwarded.
    pub async fn admit(pending: PendingResponse) -> Result<ByteStream, WatchError> {
        let PendingResponse { status, body } = pending;
        if status == StatusCode::OK {
            return Ok(body);
        }
        let message = diagnostic_message(status, body).await;
        Err(WatchError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

async fn diagnostic_message(status: StatusCode, mut body: ByteStream) -> String {
    let mut buf = Vec::new();
    // On timeout `buf` keeps whatever arrived before the deadline.
    let _ = tokio::time::timeout(
        DIAGNOSTIC_READ_TIMEOUT,
        read_diagnostic_body(&mut body, &mut buf),
    )
    .await;
    buf.truncate(MAX_DIAGNOSTIC_BODY_BYTES);

    let from_body = match leading_value(&buf) {
        Some(Ok(value)) => value
            .get("message")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(ToOwned::to_owned),
        _ => None,
    };
    from_body
        .or_else(|| status.canonical_reason().map(ToOwned::to_owned))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

/// Reads until the first JSON value is complete, the body is clearly not
/// JSON, the size cap is hit or the body ends.
async fn read_diagnostic_body(body: &mut ByteStream, buf: &mut Vec<u8>) {
    while buf.len() < MAX_DIAGNOSTIC_BODY_BYTES {
        match leading_value(buf) {
            Some(Ok(_)) => return,
            Some(Err(err)) if !err.is_eof() => return,
            _ => {}
        }
        match body.next().await {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Some(Err(_)) | None => return,
        }
    }
}

// Error bodies may be followed by more data (an NDJSON stream, for one), so
// only the first value counts.
fn leading_value(buf: &[u8]) -> Option<Result<Value, serde_json::Error>> {
    serde_json::Deserializer::from_slice(buf)
        .into_iter::<Value>()
        .next()
}
