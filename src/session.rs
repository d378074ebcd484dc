use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::client::{StampRequest, StamperClient};
use crate::backend::error::BackendError;
use crate::config::StamperConfig;
use crate::diagnostics::{self, DiagnosisResult};
use crate::files::record::{normalize, FileError, FileRecord};
use crate::files::store::{FileSessionStore, RefreshReport, SessionState};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No file selected")]
    NoSelection,
}

impl Serialize for SessionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl SessionError {
    /// Diagnosis for a failed backend call; `None` for local failures
    pub fn diagnosis(&self) -> Option<DiagnosisResult> {
        match self {
            SessionError::Backend(BackendError::InvalidInput(_)) => None,
            SessionError::Backend(err) => Some(diagnostics::diagnose(&err.outcome())),
            _ => None,
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Backend(BackendError::InvalidInput(msg)) => msg.clone(),
            SessionError::Backend(err) => diagnostics::describe_failure(&err.outcome()),
            other => other.to_string(),
        }
    }
}

/// Wires the storage client to the store.
///
/// All store mutations go through one mutex and are applied only after the
/// HTTP call has completed; the lock is never held across an await.
pub struct FileSession {
    client: StamperClient,
    store: Mutex<FileSessionStore>,
    probe_timeout: Duration,
}

impl FileSession {
    pub fn new(config: &StamperConfig) -> Self {
        Self::with_client(
            StamperClient::new(config),
            Duration::from_secs(config.probe_timeout_secs),
        )
    }

    pub fn with_client(client: StamperClient, probe_timeout: Duration) -> Self {
        Self {
            client,
            store: Mutex::new(FileSessionStore::new()),
            probe_timeout,
        }
    }

    pub fn client(&self) -> &StamperClient {
        &self.client
    }

    /// Reload the full file list from the backend
    pub async fn refresh(&self) -> Result<RefreshReport, SessionError> {
        let items = self.client.list_files().await?;
        let report = self.store.lock().replace_all(&items);
        if report.is_degraded() {
            warn!(
                dropped = report.dropped.len(),
                accepted = report.accepted,
                "File list partially degraded"
            );
        }
        Ok(report)
    }

    /// Upload a PDF from disk
    pub async fn upload(&self, path: &Path) -> Result<FileRecord, SessionError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let bytes = tokio::fs::read(path).await?;
        self.upload_bytes(&file_name, bytes).await
    }

    pub async fn upload_bytes(&self, file_name: &str, bytes: Vec<u8>) -> Result<FileRecord, SessionError> {
        let raw = self.client.upload_pdf(file_name, bytes).await?;
        let record = self.store.lock().upsert(&raw)?;
        info!(file = %record.identifier, "Upload added to session");
        Ok(record)
    }

    /// Stamp `identifier`, or the current selection when `None`.
    /// The result is flagged as stamped and focused.
    pub async fn stamp(
        &self,
        identifier: Option<&str>,
        stamp: &StampRequest,
    ) -> Result<FileRecord, SessionError> {
        let target = match identifier {
            Some(id) => id.to_string(),
            None => self
                .store
                .lock()
                .selected_identifier()
                .map(str::to_string)
                .ok_or(SessionError::NoSelection)?,
        };

        let raw = self.client.stamp_pdf(&target, stamp).await?;
        let mut record = normalize(&raw)?;
        record.stamped = true;
        let record = self.store.lock().upsert_record(record);
        info!(source = %target, file = %record.identifier, "Stamp applied to session");
        Ok(record)
    }

    /// Delete on the backend, then drop the record locally
    pub async fn delete(&self, identifier: &str) -> Result<(), SessionError> {
        self.client.delete_file(identifier).await?;
        self.store.lock().remove(identifier);
        Ok(())
    }

    pub fn select(&self, identifier: &str) -> Result<(), SessionError> {
        self.store.lock().select(identifier)?;
        Ok(())
    }

    pub fn current_selection(&self) -> Option<FileRecord> {
        self.store.lock().current_selection().cloned()
    }

    pub fn snapshot(&self) -> SessionState {
        self.store.lock().snapshot()
    }

    /// Opt-in connectivity check; never run implicitly
    pub async fn test_connection(&self) -> DiagnosisResult {
        diagnostics::test_connection(&self.client, self.probe_timeout).await
    }
}
