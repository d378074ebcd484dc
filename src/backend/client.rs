//! File Storage HTTP Client
//!
//! Direct reqwest client for the PDF storage REST API. Responses are handed
//! back as raw JSON; turning them into `FileRecord`s is the store's job.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::{BackendError, Operation};
use crate::config::StamperConfig;
use crate::diagnostics::ProbeOutcome;

/// Characters `encodeURIComponent` leaves untouched
const IDENTIFIER_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Stamp overlay contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StampRequest {
    pub date: String,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl StampRequest {
    pub fn new(date: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            name: name.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Date and name are required; comment defaults to empty
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.date.trim().is_empty() || self.name.trim().is_empty() {
            return Err(BackendError::InvalidInput(
                "Date and name are required for stamping".to_string(),
            ));
        }
        Ok(())
    }

    fn query(&self) -> [(&'static str, &str); 3] {
        [
            ("date", self.date.as_str()),
            ("name", self.name.as_str()),
            ("comment", self.comment.as_deref().unwrap_or("")),
        ]
    }
}

/// PDF stamping service client
#[derive(Clone)]
pub struct StamperClient {
    http: Client,
    base_url: String,
}

impl StamperClient {
    pub fn new(config: &StamperConfig) -> Self {
        let base_url = config.api_url.trim_end_matches('/').to_string();
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        // A local backend must never be routed through a system proxy
        if is_loopback(&base_url) {
            builder = builder.no_proxy();
        }
        let http = builder.build().unwrap_or_else(|_| Client::new());
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Download/preview location for a stored file. No network access.
    pub fn resource_url(&self, identifier: &str) -> String {
        format!("{}/download/{}", self.base_url, encode_identifier(identifier))
    }

    /// Thumbnail location for a stored file. No network access.
    pub fn thumbnail_url(&self, identifier: &str) -> String {
        format!("{}/thumbnail/{}", self.base_url, encode_identifier(identifier))
    }

    /// Multipart upload of one PDF; returns the raw file record
    pub async fn upload_pdf(&self, file_name: &str, bytes: Vec<u8>) -> Result<Value, BackendError> {
        validate_pdf_name(file_name)?;

        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| BackendError::InvalidInput(e.to_string()))?;
        let form = Form::new().part("file", part);

        debug!(file = %file_name, size = size, "Uploading PDF");
        let resp = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(Operation::Upload, &self.base_url, e))?;

        let body = self.read_json(Operation::Upload, resp).await?;
        info!(file = %file_name, size = size, "Uploaded PDF");
        Ok(body)
    }

    /// Fetch the raw list of stored files
    pub async fn list_files(&self) -> Result<Vec<Value>, BackendError> {
        debug!("Listing files");
        let resp = self
            .http
            .get(format!("{}/list", self.base_url))
            .send()
            .await
            .map_err(|e| BackendError::from_transport(Operation::List, &self.base_url, e))?;

        match self.read_json(Operation::List, resp).await? {
            Value::Array(items) => {
                debug!(count = items.len(), "Listed files");
                Ok(items)
            }
            other => Err(BackendError::Deserialize(format!(
                "expected a JSON array of files, got: {}",
                other
            ))),
        }
    }

    /// Apply a stamp overlay; returns the raw record of the stamped file
    pub async fn stamp_pdf(&self, identifier: &str, stamp: &StampRequest) -> Result<Value, BackendError> {
        require_identifier(identifier, "stamping")?;
        stamp.validate()?;

        debug!(file = %identifier, name = %stamp.name, date = %stamp.date, "Stamping PDF");
        let resp = self
            .http
            .post(format!("{}/stamp/{}", self.base_url, encode_identifier(identifier)))
            .query(&stamp.query())
            .send()
            .await
            .map_err(|e| BackendError::from_transport(Operation::Stamp, &self.base_url, e))?;

        let body = self.read_json(Operation::Stamp, resp).await?;
        info!(file = %identifier, "Stamped PDF");
        Ok(body)
    }

    /// Delete a stored file. A 404 counts as already deleted.
    pub async fn delete_file(&self, identifier: &str) -> Result<(), BackendError> {
        require_identifier(identifier, "deletion")?;

        let resp = self
            .http
            .delete(format!("{}/{}", self.base_url, encode_identifier(identifier)))
            .send()
            .await
            .map_err(|e| BackendError::from_transport(Operation::Delete, &self.base_url, e))?;

        let status = resp.status();
        if status.as_u16() == 404 {
            warn!(file = %identifier, "File already deleted (404)");
            Ok(())
        } else if status.is_success() {
            info!(file = %identifier, "Deleted file");
            Ok(())
        } else {
            Err(self.status_error(Operation::Delete, resp).await)
        }
    }

    /// Single reachability check against the list endpoint
    pub async fn probe(&self, timeout: Duration) -> ProbeOutcome {
        debug!(base_url = %self.base_url, timeout_ms = timeout.as_millis() as u64, "Probing backend");
        let result = self
            .http
            .get(format!("{}/list", self.base_url))
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(resp) => ProbeOutcome {
                target: Some(self.base_url.clone()),
                ..ProbeOutcome::responded(resp.status().as_u16())
            },
            Err(e) => BackendError::from_transport(Operation::Probe, &self.base_url, e).outcome(),
        }
    }

    async fn read_json(&self, operation: Operation, resp: Response) -> Result<Value, BackendError> {
        if !resp.status().is_success() {
            return Err(self.status_error(operation, resp).await);
        }
        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::from_transport(operation, &self.base_url, e))?;
        serde_json::from_str(&text).map_err(|e| BackendError::Deserialize(format!("{}: {}", e, text)))
    }

    async fn status_error(&self, operation: Operation, resp: Response) -> BackendError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        error!(operation = ?operation, status = %status, body = %text, "Backend HTTP error");
        BackendError::Status {
            operation,
            status: status.as_u16(),
            message: server_message(&text),
        }
    }
}

/// Percent-encode an identifier for use as a single path segment
pub fn encode_identifier(identifier: &str) -> String {
    utf8_percent_encode(identifier, IDENTIFIER_ENCODE_SET).to_string()
}

fn is_loopback(base_url: &str) -> bool {
    let rest = base_url.split_once("://").map(|(_, r)| r).unwrap_or(base_url);
    let authority = rest.split('/').next().unwrap_or_default();
    let host = if authority.starts_with('[') {
        authority.split(']').next().map(|h| &h[1..]).unwrap_or_default()
    } else {
        authority.split(':').next().unwrap_or_default()
    };
    host.eq_ignore_ascii_case("localhost") || host.starts_with("127.") || host == "::1"
}

/// `message` field of a JSON error body, if the server sent one
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

fn require_identifier(identifier: &str, action: &str) -> Result<(), BackendError> {
    if identifier.trim().is_empty() {
        return Err(BackendError::InvalidInput(format!(
            "File name is required for {}",
            action
        )));
    }
    Ok(())
}

fn validate_pdf_name(file_name: &str) -> Result<(), BackendError> {
    let trimmed = file_name.trim();
    if trimmed.is_empty() || !trimmed.to_ascii_lowercase().ends_with(".pdf") {
        return Err(BackendError::InvalidInput(format!(
            "Please choose a valid PDF file (got \"{}\")",
            file_name
        )));
    }
    Ok(())
}
