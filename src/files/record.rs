//! File Record Normalization
//!
//! Turns whatever shape the storage backend hands back into one canonical
//! `FileRecord`. Upload and stamp responses key a file by `fileName`, list
//! entries by `name`, and some payloads only carry a download URL.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Name fields, in precedence order
const NAME_FIELDS: [&str; 2] = ["name", "fileName"];

/// Fields that may carry the download/preview location
const RESOURCE_URL_FIELDS: [&str; 3] = ["url", "fileDownloadUri", "resourceUrl"];

/// Fields that may carry the thumbnail location
const THUMBNAIL_URL_FIELDS: [&str; 2] = ["thumbnailUrl", "thumbnailUri"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FileError {
    #[error("File record has no name, fileName or resource URL")]
    MissingIdentifier,
    #[error("Malformed file record: expected an object, got {0}")]
    MalformedRecord(String),
    #[error("Unknown file: {0}")]
    UnknownFile(String),
}

impl Serialize for FileError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Canonical representation of one stored document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Unique name key, stable across list/stamp/delete
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub stamped: bool,
}

/// Convert an arbitrary backend payload into a `FileRecord`.
pub fn normalize(raw: &Value) -> Result<FileRecord, FileError> {
    let fields = raw
        .as_object()
        .ok_or_else(|| FileError::MalformedRecord(json_kind(raw).to_string()))?;

    let resource_url = first_string(fields, &RESOURCE_URL_FIELDS);
    let identifier = resolve_identifier(fields, resource_url.as_deref())
        .ok_or(FileError::MissingIdentifier)?;

    Ok(FileRecord {
        identifier,
        resource_url,
        thumbnail_url: first_string(fields, &THUMBNAIL_URL_FIELDS),
        stamped: fields.get("stamped").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Identifier precedence: `name`, then `fileName`, then the last path segment
/// of the resource URL.
pub fn resolve_identifier(fields: &Map<String, Value>, resource_url: Option<&str>) -> Option<String> {
    first_string(fields, &NAME_FIELDS).or_else(|| resource_url.and_then(last_path_segment))
}

/// Last non-empty path segment of a URL, percent-decoded.
pub fn last_path_segment(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    // Skip scheme and authority so a bare host never becomes an identifier
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or_default(),
        None => without_query,
    };
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn first_string(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
