//! Stored-outcome lookup over the panel's REST API.

use reqwest::StatusCode;

use super::config::RemoteConfig;
use crate::errors::TransportError;
use crate::status::{DeployState, StatusSnapshot};
use crate::subject::Subject;
use crate::transport::{FinishedRecord, HistoricalOutcome};

/// Wire shape of a finished-subject response.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishedPayload {
    status: DeployState,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    duration_seconds: Option<u64>,
    #[serde(default)]
    logs: String,
}

/// Fetches the stored outcome for a subject.
///
/// The panel answers 202 while the subject is still running, which maps to
/// [`HistoricalOutcome::InProgress`]; any other non-success status is a
/// backend error.
pub(super) async fn fetch_finished(
    client: &reqwest::Client,
    config: &RemoteConfig,
    subject: &Subject,
) -> Result<HistoricalOutcome, TransportError> {
    let url = config.history_url(subject);
    let mut request = client.get(&url);
    if let Some(token) = config.token() {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .map_err(|err| TransportError::io(err.to_string()))?;

    if response.status() == StatusCode::ACCEPTED {
        return Ok(HistoricalOutcome::InProgress);
    }
    if !response.status().is_success() {
        let status_code = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("history request failed with status {status_code}")
        } else {
            body
        };
        return Err(TransportError::backend(message, Some(status_code)));
    }

    let payload: FinishedPayload = response
        .json()
        .await
        .map_err(|err| TransportError::backend(format!("invalid history payload: {err}"), None))?;
    Ok(HistoricalOutcome::Finished(record_from(payload)))
}

fn record_from(payload: FinishedPayload) -> FinishedRecord {
    // Older panels omit progress on finished records.
    let progress = match payload.progress {
        Some(raw) => StatusSnapshot::clamp_progress(raw),
        None if payload.status == DeployState::Success => 100,
        None => 0,
    };
    FinishedRecord {
        status: StatusSnapshot {
            status: payload.status,
            stage: payload.stage,
            progress,
            error_message: payload.error_message,
            duration_seconds: payload.duration_seconds,
        },
        logs: payload.logs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(value: serde_json::Value) -> FinishedPayload {
        serde_json::from_value(value).expect("payload deserializes")
    }

    #[test]
    fn full_payload_maps_onto_a_record() {
        let record = record_from(payload(serde_json::json!({
            "status": "failed",
            "stage": "docker build",
            "progress": 62.4,
            "errorMessage": "exit code 1",
            "durationSeconds": 91,
            "logs": "line one\nline two"
        })));

        assert_eq!(record.status.status, DeployState::Failed);
        assert_eq!(record.status.stage.as_deref(), Some("docker build"));
        assert_eq!(record.status.progress, 62);
        assert_eq!(record.status.error_message.as_deref(), Some("exit code 1"));
        assert_eq!(record.status.duration_seconds, Some(91));
        assert_eq!(record.logs, "line one\nline two");
    }

    #[test]
    fn missing_progress_defaults_by_status() {
        let success = record_from(payload(serde_json::json!({"status": "success"})));
        assert_eq!(success.status.progress, 100);
        assert_eq!(success.logs, "");

        let failed = record_from(payload(serde_json::json!({"status": "failed"})));
        assert_eq!(failed.status.progress, 0);
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        let record = record_from(payload(serde_json::json!({
            "status": "success",
            "progress": 150.0
        })));
        assert_eq!(record.status.progress, 100);
    }
}
