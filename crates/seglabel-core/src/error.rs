//! Error types for seglabel

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeglabelError {
    // Layer errors
    #[error("Cannot read layer {path}: {reason}")]
    LayerUnreadable { path: PathBuf, reason: String },

    #[error("Unsupported format: .{extension}. Supported: {}", supported.join(", "))]
    UnsupportedFormat {
        extension: String,
        supported: Vec<String>,
    },

    #[error("Designated field '{field}' not found in point layer schema (available: {})", available.join(", "))]
    DesignatedFieldMissing {
        field: String,
        available: Vec<String>,
    },

    #[error("Designated field '{field}' has inconsistent types: {reason}")]
    DesignatedFieldType { field: String, reason: String },

    // Region identity errors
    #[error("Duplicate region id {id} in region layer")]
    DuplicateRegionId { id: u64 },

    #[error("Invalid region id at feature {feature_id}: {reason}")]
    InvalidRegionId { feature_id: String, reason: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // Output errors
    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Run cancelled before output was written")]
    Cancelled,
}

impl SeglabelError {
    /// Fatal errors raised before any point is processed.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SeglabelError::LayerUnreadable { .. }
                | SeglabelError::UnsupportedFormat { .. }
                | SeglabelError::DesignatedFieldMissing { .. }
                | SeglabelError::DesignatedFieldType { .. }
                | SeglabelError::DuplicateRegionId { .. }
                | SeglabelError::InvalidRegionId { .. }
                | SeglabelError::ConfigMissing { .. }
                | SeglabelError::ConfigInvalid { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SeglabelError>;

/// Which layer a skipped record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Region,
    Point,
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerKind::Region => write!(f, "region"),
            LayerKind::Point => write!(f, "point"),
        }
    }
}

/// Recoverable, per-record geometry failure.
///
/// The offending record is skipped and counted; it never aborts a run.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("Malformed {layer} geometry at feature {feature_id}: {reason}")]
pub struct GeometryError {
    pub layer: LayerKind,
    pub feature_id: String,
    pub reason: String,
}

impl GeometryError {
    pub fn new(layer: LayerKind, feature_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { layer, feature_id: feature_id.into(), reason: reason.into() }
    }
}
