//! Connectivity Diagnostics
//!
//! Classifies failed backend calls into a closed set of issues with
//! actionable messages. Probing the backend is opt-in: `test_connection`
//! only runs when the user asks for it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::backend::client::StamperClient;

/// Transport-level reason a call got no response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportReason {
    ConnectionRefused,
    CorsRejected,
    TimedOut,
    Other,
}

/// What a probe or failed operation observed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    /// Whether any HTTP response came back
    pub responded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<TransportReason>,
    /// Server-supplied message, or the transport error text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Base URL the call was aimed at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ProbeOutcome {
    pub fn responded(status: u16) -> Self {
        Self {
            responded: true,
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn no_response(reason: TransportReason, message: impl Into<String>) -> Self {
        Self {
            responded: false,
            reason: Some(reason),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    fn target_or_default(&self) -> &str {
        self.target.as_deref().unwrap_or("the configured address")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
    None,
    BackendNotRunning,
    CorsConfiguration,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub issue: Issue,
    pub message: String,
    pub raw_details: Value,
}

/// True when an error text points at a cross-origin policy rejection
pub fn mentions_cross_origin(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("cors")
        || lower.contains("cross-origin")
        || lower.contains("access-control-allow-origin")
}

fn is_cross_origin(outcome: &ProbeOutcome) -> bool {
    outcome.reason == Some(TransportReason::CorsRejected)
        || outcome.message.as_deref().is_some_and(mentions_cross_origin)
}

/// Classify an outcome. First match wins: response received, connection
/// refused, cross-origin rejection, anything else.
pub fn diagnose(outcome: &ProbeOutcome) -> DiagnosisResult {
    let target = outcome.target_or_default();

    let (issue, message) = if outcome.responded {
        let message = match outcome.status {
            Some(status) if !(200..300).contains(&status) => format!(
                "Backend at {} is reachable but responded with status {}",
                target, status
            ),
            _ => format!("Successfully connected to backend at {}", target),
        };
        (Issue::None, message)
    } else if outcome.reason == Some(TransportReason::ConnectionRefused) {
        (
            Issue::BackendNotRunning,
            format!(
                "The backend is not running at {}. Please start the backend server.",
                target
            ),
        )
    } else if is_cross_origin(outcome) {
        (
            Issue::CorsConfiguration,
            format!(
                "CORS policy is preventing access to the backend at {}. Check the server's allowed origins.",
                target
            ),
        )
    } else {
        (
            Issue::Unknown,
            "Could not determine the exact issue. Check server logs for more details.".to_string(),
        )
    };

    DiagnosisResult {
        issue,
        message,
        raw_details: json!({ "outcome": outcome }),
    }
}

/// User-facing guidance for a failed operation
pub fn describe_failure(outcome: &ProbeOutcome) -> String {
    if outcome.reason == Some(TransportReason::ConnectionRefused) {
        return format!(
            "Cannot connect to backend server. Is the backend running at {}?",
            outcome.target_or_default()
        );
    }
    if !outcome.responded && is_cross_origin(outcome) {
        return "Network error. This could be due to CORS configuration or the backend server not running."
            .to_string();
    }
    if outcome.reason == Some(TransportReason::TimedOut) {
        return format!(
            "Request to {} timed out. The backend may be overloaded or unreachable.",
            outcome.target_or_default()
        );
    }

    if let Some(status) = outcome.status {
        let server_message = outcome.message.as_deref();
        return match status {
            404 => "API endpoint not found. Check if the URL is correct.".to_string(),
            500 => format!(
                "Server error: {}",
                server_message.unwrap_or("Internal server error")
            ),
            _ => format!(
                "Server responded with status {}: {}",
                status,
                server_message.unwrap_or("Unknown error")
            ),
        };
    }

    outcome
        .message
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "Unknown error occurred".to_string())
}

/// Explicit "test connection" action: one bounded probe, then classify
pub async fn test_connection(client: &StamperClient, timeout: Duration) -> DiagnosisResult {
    let started = Instant::now();
    let outcome = client.probe(timeout).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut result = diagnose(&outcome);
    if let Value::Object(details) = &mut result.raw_details {
        details.insert("baseUrl".to_string(), json!(client.base_url()));
        details.insert("elapsedMs".to_string(), json!(elapsed_ms));
        details.insert("timeoutMs".to_string(), json!(timeout.as_millis() as u64));
    }

    match result.issue {
        Issue::None => info!(elapsed_ms = elapsed_ms, "Backend connection test passed"),
        issue => warn!(issue = ?issue, elapsed_ms = elapsed_ms, "Backend connection test failed"),
    }
    debug!(details = %result.raw_details, "Connection test details");
    result
}
