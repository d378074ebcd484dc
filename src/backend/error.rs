//! Backend failure descriptors
//!
//! Every failed call carries whether a response arrived, the HTTP status if
//! any and the server's message if any. `BackendError::outcome` exposes that
//! as the `ProbeOutcome` the diagnostics classify.

use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

use crate::diagnostics::{mentions_cross_origin, ProbeOutcome, TransportReason};

/// Which backend call failed; prefixes the user-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    List,
    Stamp,
    Delete,
    Probe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self {
            Operation::Upload => "File upload failed",
            Operation::List => "Failed to retrieve file list",
            Operation::Stamp => "Failed to apply stamp",
            Operation::Delete => "Failed to delete file",
            Operation::Probe => "Connection test failed",
        };
        f.write_str(prefix)
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{operation}: Server returned {status} - {}", .message.as_deref().unwrap_or("Unknown server error"))]
    Status {
        operation: Operation,
        status: u16,
        message: Option<String>,
    },
    #[error("{operation}: No response from server - check if backend is running at {base_url} ({detail})")]
    NoResponse {
        operation: Operation,
        base_url: String,
        reason: TransportReason,
        detail: String,
    },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl Serialize for BackendError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl BackendError {
    /// Map a transport-level reqwest failure
    pub fn from_transport(operation: Operation, base_url: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            return BackendError::Deserialize(err.to_string());
        }
        let detail = error_chain(&err);
        let reason = if err.is_timeout() {
            TransportReason::TimedOut
        } else if is_connection_refused(&err) {
            TransportReason::ConnectionRefused
        } else if mentions_cross_origin(&detail) {
            TransportReason::CorsRejected
        } else {
            TransportReason::Other
        };
        BackendError::NoResponse {
            operation,
            base_url: base_url.to_string(),
            reason,
            detail,
        }
    }

    /// The failure descriptor consumed by diagnostics
    pub fn outcome(&self) -> ProbeOutcome {
        match self {
            BackendError::Status { status, message, .. } => ProbeOutcome {
                responded: true,
                status: Some(*status),
                reason: None,
                message: message.clone(),
                target: None,
            },
            BackendError::NoResponse { base_url, reason, detail, .. } => ProbeOutcome {
                responded: false,
                status: None,
                reason: Some(reason.clone()),
                message: Some(detail.clone()),
                target: Some(base_url.clone()),
            },
            BackendError::InvalidInput(msg) => ProbeOutcome {
                responded: false,
                status: None,
                reason: None,
                message: Some(msg.clone()),
                target: None,
            },
            // A body arrived, it just did not parse
            BackendError::Deserialize(msg) => ProbeOutcome {
                responded: true,
                status: None,
                reason: None,
                message: Some(msg.clone()),
                target: None,
            },
        }
    }
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// Render an error with all of its causes, "outer: inner: root"
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
