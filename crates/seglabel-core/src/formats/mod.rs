//! Format abstraction layer for vector layer input and output
//!
//! Each format implements `LayerReader` and/or `LayerWriter`, and the
//! `FormatRegistry` dispatches on file extension.

use std::path::Path;

use crate::error::{Result, SeglabelError};
use crate::models::{OutputLayer, VectorLayer};

pub mod atomic;
pub mod geojson;
pub mod shapefile;
pub mod validation;

/// Format reader trait that all input formats implement
pub trait LayerReader: Send + Sync {
    /// Read a complete layer from the given path
    ///
    /// Unreadable files are reported as `SeglabelError::LayerUnreadable`.
    /// Undecodable geometries are not errors at this level; they are kept
    /// on the feature so callers can skip and count them.
    fn read(&self, path: &Path) -> Result<VectorLayer>;

    /// Get supported file extensions (e.g., ["shp"])
    fn supported_extensions(&self) -> &[&str];

    /// Get human-readable format name (e.g., "Shapefile", "GeoJSON")
    fn format_name(&self) -> &str;

    /// Validate file structure without a full read
    fn validate(&self, _path: &Path) -> FormatValidation {
        FormatValidation::default()
    }
}

/// Format writer trait for output layers
pub trait LayerWriter: Send + Sync {
    /// Write the layer to `path`.
    ///
    /// Implementations must be all-or-nothing: on error no readable output
    /// may be left at `path`.
    fn write(&self, path: &Path, layer: &OutputLayer) -> Result<()>;

    fn supported_extensions(&self) -> &[&str];

    fn format_name(&self) -> &str;
}

/// Result of format validation
#[derive(Debug, Clone, Default)]
pub struct FormatValidation {
    /// Validation errors that prevent reading
    pub errors: Vec<String>,

    /// Warnings that don't prevent reading but indicate potential issues
    pub warnings: Vec<String>,
}

impl FormatValidation {
    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Central registry for format readers and writers
pub struct FormatRegistry {
    readers: Vec<Box<dyn LayerReader>>,
    writers: Vec<Box<dyn LayerWriter>>,
}

impl FormatRegistry {
    /// Create a new empty format registry
    pub fn new() -> Self {
        Self { readers: Vec::new(), writers: Vec::new() }
    }

    /// Registry with the built-in GeoJSON and Shapefile formats
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_reader(Box::new(geojson::GeoJsonReader));
        registry.register_reader(Box::new(shapefile::ShapefileFormatReader));
        registry.register_writer(Box::new(geojson::GeoJsonWriter));
        registry.register_writer(Box::new(shapefile::ShapefileFormatWriter));
        registry
    }

    pub fn register_reader(&mut self, reader: Box<dyn LayerReader>) {
        self.readers.push(reader);
    }

    pub fn register_writer(&mut self, writer: Box<dyn LayerWriter>) {
        self.writers.push(writer);
    }

    /// Detect format and return the reader for this file extension
    pub fn detect_reader(&self, path: &Path) -> Result<&dyn LayerReader> {
        let extension = self.extension_of(path)?;
        self.readers
            .iter()
            .find(|r| supports(r.supported_extensions(), &extension))
            .map(|r| r.as_ref())
            .ok_or_else(|| SeglabelError::UnsupportedFormat {
                extension,
                supported: self.supported_formats(),
            })
    }

    /// Detect format and return the writer for this file extension
    pub fn detect_writer(&self, path: &Path) -> Result<&dyn LayerWriter> {
        let extension = self.extension_of(path)?;
        self.writers
            .iter()
            .find(|w| supports(w.supported_extensions(), &extension))
            .map(|w| w.as_ref())
            .ok_or_else(|| SeglabelError::UnsupportedFormat {
                extension,
                supported: self.supported_formats(),
            })
    }

    /// Read a layer, dispatching on its extension
    pub fn read(&self, path: &Path) -> Result<VectorLayer> {
        self.detect_reader(path)?.read(path)
    }

    /// Get list of all supported format extensions
    pub fn supported_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self
            .readers
            .iter()
            .flat_map(|r| r.supported_extensions())
            .map(|s| s.to_string())
            .collect();
        formats.dedup();
        formats
    }

    fn extension_of(&self, path: &Path) -> Result<String> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| SeglabelError::UnsupportedFormat {
                extension: "none".to_string(),
                supported: self.supported_formats(),
            })
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn supports(extensions: &[&str], extension: &str) -> bool {
    extensions.iter().any(|e| e.eq_ignore_ascii_case(extension))
}
