//! Classifies raw wire frames into tagged stream events.
//!
//! Frames are JSON envelopes of the form
//! `{ "type": "log" | "status" | "error" | "end", "timestamp": ..., "data": ... }`.
//! Extraction is tolerant: unknown envelope fields are ignored and the `data`
//! payload is accepted in both its bare-string and object forms. A frame
//! that cannot be classified is an error for the caller to discard, never a
//! reason to tear the session down.

use crate::errors::ClassifyError;
use crate::status::{DeployState, StatusSnapshot};

/// One classified wire message from the live stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// One line of raw subject output (may contain ANSI escapes).
    Log { line: String },
    /// Lifecycle snapshot for the subject.
    Status { snapshot: StatusSnapshot },
    /// Upstream-reported error; the session stays alive.
    Error { message: String },
    /// The server is closing the stream; the session shuts down without
    /// reconnecting.
    End { message: Option<String> },
}

/// Classifies one raw frame.
pub fn classify(raw: &str) -> Result<StreamEvent, ClassifyError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ClassifyError::malformed(format!("invalid JSON frame: {e}")))?;
    let Some(kind) = value.get("type").and_then(|v| v.as_str()) else {
        return Err(ClassifyError::malformed("frame has no type field"));
    };
    let data = value.get("data");

    match kind {
        "log" => text_payload(data, "line")
            .map(|line| StreamEvent::Log { line })
            .ok_or_else(|| ClassifyError::malformed("log frame has no line payload")),
        "status" => status_snapshot(data).map(|snapshot| StreamEvent::Status { snapshot }),
        "error" => Ok(StreamEvent::Error {
            message: text_payload(data, "message")
                .unwrap_or_else(|| "unspecified upstream error".to_string()),
        }),
        "end" => Ok(StreamEvent::End {
            message: text_payload(data, "message"),
        }),
        other => Err(ClassifyError::unknown_kind(other)),
    }
}

/// Reads a text payload that may be a bare string or `{ "<field>": ... }`.
fn text_payload(data: Option<&serde_json::Value>, field: &str) -> Option<String> {
    let data = data?;
    if let Some(text) = data.as_str() {
        return Some(text.to_string());
    }
    data.get(field)
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
}

fn status_snapshot(data: Option<&serde_json::Value>) -> Result<StatusSnapshot, ClassifyError> {
    let Some(data) = data.filter(|v| v.is_object()) else {
        return Err(ClassifyError::malformed("status frame has no object payload"));
    };
    let status: DeployState = data
        .get("status")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or_else(|| ClassifyError::malformed("status frame has no recognized status"))?;

    Ok(StatusSnapshot {
        status,
        stage: data
            .get("stage")
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned),
        progress: data
            .get("progress")
            .and_then(|v| v.as_f64())
            .map(StatusSnapshot::clamp_progress)
            .unwrap_or(0),
        error_message: data
            .get("errorMessage")
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned),
        duration_seconds: data.get("durationSeconds").and_then(|v| v.as_u64()),
    })
}
