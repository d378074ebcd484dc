// PDF Stamp Library
// Exports the file session core for use by the CLI binary and embedders

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod files;
pub mod session;
#[cfg(test)]
pub mod testutil;

// Re-export commonly used types
pub use files::record::{normalize, resolve_identifier, FileError, FileRecord};
pub use files::store::{DroppedRecord, FileSessionStore, RefreshReport, SessionState};

pub use backend::client::{encode_identifier, StampRequest, StamperClient};
pub use backend::error::{BackendError, Operation};

pub use diagnostics::{
    describe_failure, diagnose, test_connection, DiagnosisResult, Issue, ProbeOutcome,
    TransportReason,
};

pub use config::{ConfigError, StamperConfig, DEFAULT_API_URL, DEFAULT_PROBE_TIMEOUT_SECS};

pub use session::{FileSession, SessionError};
