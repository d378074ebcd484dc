//! File Session
//!
//! Canonical file records and the store that keeps the list and selection
//! consistent across upload, refresh, stamping and deletion.

pub mod record;
pub mod store;
