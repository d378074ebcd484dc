//! File Session Store
//!
//! Sole writer of the in-memory file list and selection. Every mutation
//! leaves the state consistent before returning: identifiers stay unique and
//! the selection always points at a listed file.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::record::{normalize, FileError, FileRecord};

/// The store's mutable state: known files in display order plus the selection
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    files: Vec<FileRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selected_identifier: Option<String>,
}

impl SessionState {
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn selected_identifier(&self) -> Option<&str> {
        self.selected_identifier.as_deref()
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        self.files.iter().position(|f| f.identifier == identifier)
    }
}

/// A list element discarded during a refresh
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DroppedRecord {
    pub index: usize,
    pub error: FileError,
}

/// Outcome of `replace_all`
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    /// Distinct files kept
    pub accepted: usize,
    /// Entries folded into a later entry with the same identifier
    pub merged: usize,
    pub dropped: Vec<DroppedRecord>,
}

impl RefreshReport {
    /// True when some listed files could not be parsed
    pub fn is_degraded(&self) -> bool {
        !self.dropped.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct FileSessionStore {
    state: SessionState,
}

impl FileSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(raw: &Value) -> Result<FileRecord, FileError> {
        normalize(raw)
    }

    /// Replace the whole list after a refresh.
    ///
    /// Elements that fail normalization are dropped and reported; they never
    /// abort the refresh. With no selection the first file becomes selected;
    /// a selection that vanished from the list is cleared.
    pub fn replace_all(&mut self, raw_list: &[Value]) -> RefreshReport {
        let mut files: Vec<FileRecord> = Vec::with_capacity(raw_list.len());
        let mut report = RefreshReport::default();

        for (index, raw) in raw_list.iter().enumerate() {
            match normalize(raw) {
                Ok(record) => {
                    match files.iter().position(|f| f.identifier == record.identifier) {
                        Some(existing) => {
                            debug!(identifier = %record.identifier, "Duplicate identifier in list, keeping later entry");
                            files[existing] = record;
                            report.merged += 1;
                        }
                        None => files.push(record),
                    }
                }
                Err(error) => {
                    warn!(index = index, error = %error, "Dropping unparseable file record");
                    report.dropped.push(DroppedRecord { index, error });
                }
            }
        }

        report.accepted = files.len();
        self.state.files = files;

        let still_listed = self
            .state
            .selected_identifier
            .as_deref()
            .map(|selected| self.state.position(selected).is_some());
        match still_listed {
            Some(true) => {}
            Some(false) => {
                if let Some(selected) = self.state.selected_identifier.take() {
                    debug!(identifier = %selected, "Selected file no longer listed, clearing selection");
                }
            }
            None => {
                self.state.selected_identifier =
                    self.state.files.first().map(|f| f.identifier.clone());
            }
        }

        info!(
            accepted = report.accepted,
            merged = report.merged,
            dropped = report.dropped.len(),
            "Replaced file list"
        );
        report
    }

    /// Normalize and insert one record, then focus it.
    pub fn upsert(&mut self, raw: &Value) -> Result<FileRecord, FileError> {
        let record = normalize(raw)?;
        Ok(self.upsert_record(record))
    }

    /// Insert an already normalized record. An existing record with the same
    /// identifier is replaced in place; otherwise the record is appended.
    pub fn upsert_record(&mut self, record: FileRecord) -> FileRecord {
        match self.state.position(&record.identifier) {
            Some(index) => {
                info!(identifier = %record.identifier, "Replaced file record");
                self.state.files[index] = record.clone();
            }
            None => {
                info!(identifier = %record.identifier, "Added file record");
                self.state.files.push(record.clone());
            }
        }
        self.state.selected_identifier = Some(record.identifier.clone());
        record
    }

    pub fn select(&mut self, identifier: &str) -> Result<(), FileError> {
        if self.state.position(identifier).is_none() {
            return Err(FileError::UnknownFile(identifier.to_string()));
        }
        self.state.selected_identifier = Some(identifier.to_string());
        Ok(())
    }

    /// Remove a record. Removing an absent identifier is a no-op.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, identifier: &str) -> bool {
        let Some(index) = self.state.position(identifier) else {
            debug!(identifier = %identifier, "Remove of unknown file ignored");
            return false;
        };
        self.state.files.remove(index);
        if self.state.selected_identifier.as_deref() == Some(identifier) {
            self.state.selected_identifier = None;
        }
        info!(identifier = %identifier, "Removed file record");
        true
    }

    pub fn current_selection(&self) -> Option<&FileRecord> {
        let selected = self.state.selected_identifier.as_deref()?;
        self.get(selected)
    }

    pub fn get(&self, identifier: &str) -> Option<&FileRecord> {
        self.state.files.iter().find(|f| f.identifier == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.state.position(identifier).is_some()
    }

    pub fn files(&self) -> &[FileRecord] {
        self.state.files()
    }

    pub fn selected_identifier(&self) -> Option<&str> {
        self.state.selected_identifier()
    }

    pub fn len(&self) -> usize {
        self.state.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.files.is_empty()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn assert_invariants(store: &FileSessionStore) {
        if let Some(selected) = store.selected_identifier() {
            assert!(store.contains(selected), "selection {selected} not in files");
        }
        let unique: HashSet<&str> = store.files().iter().map(|f| f.identifier.as_str()).collect();
        assert_eq!(unique.len(), store.len(), "identifiers are not unique");
    }

    fn identifiers(store: &FileSessionStore) -> Vec<&str> {
        store.files().iter().map(|f| f.identifier.as_str()).collect()
    }

    #[test]
    fn test_replace_all_selects_first() {
        let mut store = FileSessionStore::new();
        let report = store.replace_all(&[json!({ "fileName": "a.pdf" }), json!({ "name": "b.pdf" })]);

        assert_eq!(identifiers(&store), vec!["a.pdf", "b.pdf"]);
        assert_eq!(store.selected_identifier(), Some("a.pdf"));
        assert_eq!(report.accepted, 2);
        assert!(!report.is_degraded());
        assert_invariants(&store);
    }

    #[test]
    fn test_replace_all_drops_malformed_and_keeps_order() {
        let mut store = FileSessionStore::new();
        let report = store.replace_all(&[
            json!({ "name": "z.pdf" }),
            json!("not a record"),
            json!({ "name": "m.pdf" }),
        ]);

        assert_eq!(identifiers(&store), vec!["z.pdf", "m.pdf"]);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].index, 1);
        assert!(matches!(report.dropped[0].error, FileError::MalformedRecord(_)));
        assert!(report.is_degraded());
        assert_invariants(&store);
    }

    #[test]
    fn test_replace_all_counts_missing_identifiers() {
        let mut store = FileSessionStore::new();
        let report = store.replace_all(&[
            json!({ "stamped": true }),
            json!({ "name": "a.pdf" }),
            json!(null),
            json!({ "url": "" }),
            json!({ "fileName": "b.pdf" }),
        ]);
        assert_eq!(identifiers(&store), vec!["a.pdf", "b.pdf"]);
        assert_eq!(report.dropped.len(), 3);
        assert_eq!(report.dropped[0].error, FileError::MissingIdentifier);
    }

    #[test]
    fn test_replace_all_keeps_surviving_selection() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" }), json!({ "name": "b.pdf" })]);
        store.select("b.pdf").unwrap();

        store.replace_all(&[json!({ "name": "c.pdf" }), json!({ "name": "b.pdf" })]);
        assert_eq!(store.selected_identifier(), Some("b.pdf"));
        assert_invariants(&store);
    }

    #[test]
    fn test_replace_all_clears_vanished_selection() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" }), json!({ "name": "b.pdf" })]);
        store.select("b.pdf").unwrap();

        store.replace_all(&[json!({ "name": "a.pdf" })]);
        assert_eq!(store.selected_identifier(), None);
        assert_invariants(&store);
    }

    #[test]
    fn test_replace_all_empty_list() {
        let mut store = FileSessionStore::new();
        let report = store.replace_all(&[]);
        assert!(store.is_empty());
        assert_eq!(store.selected_identifier(), None);
        assert_eq!(report.accepted, 0);
    }

    #[test]
    fn test_replace_all_collapses_duplicates() {
        let mut store = FileSessionStore::new();
        let report = store.replace_all(&[
            json!({ "name": "a.pdf" }),
            json!({ "name": "b.pdf" }),
            json!({ "fileName": "a.pdf", "stamped": true }),
        ]);
        assert_eq!(identifiers(&store), vec!["a.pdf", "b.pdf"]);
        assert!(store.get("a.pdf").unwrap().stamped);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.merged, 1);
        assert_eq!(report.accepted + report.merged + report.dropped.len(), 3);
        assert!(!report.is_degraded());
        assert_invariants(&store);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" })]);

        let record = store.upsert(&json!({ "fileName": "a.pdf", "stamped": true })).unwrap();
        assert!(record.stamped);
        assert_eq!(store.len(), 1);
        assert!(store.get("a.pdf").unwrap().stamped);
        assert_eq!(store.selected_identifier(), Some("a.pdf"));
        assert_invariants(&store);
    }

    #[test]
    fn test_upsert_preserves_position() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[
            json!({ "name": "a.pdf" }),
            json!({ "name": "b.pdf" }),
            json!({ "name": "c.pdf" }),
        ]);
        store.upsert(&json!({ "name": "b.pdf", "stamped": true })).unwrap();
        assert_eq!(identifiers(&store), vec!["a.pdf", "b.pdf", "c.pdf"]);
        assert_eq!(store.selected_identifier(), Some("b.pdf"));
    }

    #[test]
    fn test_upsert_appends_and_focuses() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" })]);
        store.upsert(&json!({ "fileName": "stamped_a.pdf" })).unwrap();

        assert_eq!(identifiers(&store), vec!["a.pdf", "stamped_a.pdf"]);
        assert_eq!(store.current_selection().unwrap().identifier, "stamped_a.pdf");
        assert_invariants(&store);
    }

    #[test]
    fn test_upsert_failure_leaves_state_unchanged() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" })]);
        let before = store.snapshot();

        assert_eq!(store.upsert(&json!({})), Err(FileError::MissingIdentifier));
        assert!(matches!(store.upsert(&json!(7)), Err(FileError::MalformedRecord(_))));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_upsert_then_select_is_idempotent() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" }), json!({ "name": "b.pdf" })]);
        store.upsert(&json!({ "fileName": "b.pdf", "stamped": true })).unwrap();
        let after_upsert = store.snapshot();

        store.select("b.pdf").unwrap();
        assert_eq!(store.snapshot(), after_upsert);
    }

    #[test]
    fn test_select_unknown_file() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" })]);

        assert_eq!(
            store.select("missing.pdf"),
            Err(FileError::UnknownFile("missing.pdf".to_string()))
        );
        assert_eq!(store.selected_identifier(), Some("a.pdf"));
    }

    #[test]
    fn test_remove_selected_clears_selection() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" }), json!({ "name": "b.pdf" })]);
        assert_eq!(store.selected_identifier(), Some("a.pdf"));

        assert!(store.remove("a.pdf"));
        assert_eq!(store.selected_identifier(), None);
        assert!(store.current_selection().is_none());
        assert_eq!(identifiers(&store), vec!["b.pdf"]);
        assert_invariants(&store);
    }

    #[test]
    fn test_remove_other_keeps_selection() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" }), json!({ "name": "b.pdf" })]);
        store.remove("b.pdf");
        assert_eq!(store.selected_identifier(), Some("a.pdf"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" }), json!({ "name": "b.pdf" })]);

        assert!(store.remove("b.pdf"));
        let once = store.snapshot();
        assert!(!store.remove("b.pdf"));
        assert_eq!(store.snapshot(), once);
    }

    #[test]
    fn test_invariants_across_mixed_operations() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf" }), json!({ "name": "b.pdf" })]);
        assert_invariants(&store);
        store.upsert(&json!({ "fileName": "c.pdf" })).unwrap();
        assert_invariants(&store);
        store.remove("c.pdf");
        assert_invariants(&store);
        store.replace_all(&[json!({ "name": "b.pdf" }), json!(false)]);
        assert_invariants(&store);
        store.upsert(&json!({ "url": "http://h/api/files/download/b.pdf" })).unwrap();
        assert_invariants(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let mut store = FileSessionStore::new();
        store.replace_all(&[json!({ "name": "a.pdf", "thumbnailUrl": "http://h/t/a.pdf" })]);
        let value = serde_json::to_value(store.state()).unwrap();
        assert_eq!(value["selectedIdentifier"], "a.pdf");
        assert_eq!(value["files"][0]["thumbnailUrl"], "http://h/t/a.pdf");
        assert_eq!(value["files"][0]["stamped"], false);
    }
}
