//! File Storage Backend
//!
//! HTTP access to the remote PDF store: upload, list, stamp, delete and
//! URL construction, plus the failure descriptors those calls produce.

pub mod client;
pub mod error;
