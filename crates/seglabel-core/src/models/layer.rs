//! In-memory vector layers, as produced by format readers and consumed by writers.

use super::field::{LayerSchema, Properties};
use super::geometry::Geometry;

/// A feature as decoded from an input layer.
///
/// Geometry decoding failures are kept per feature so that callers can
/// skip and count them instead of failing the whole read.
#[derive(Debug, Clone)]
pub struct LayerFeature {
    /// Zero-based position in the layer
    pub index: usize,

    /// Source feature identifier, if the format carries one
    pub id: Option<String>,

    /// Decoded geometry or the reason it could not be decoded
    pub geometry: std::result::Result<Geometry, String>,

    /// Attribute values, in schema order
    pub properties: Properties,
}

impl LayerFeature {
    /// Identifier used in log lines and error messages
    pub fn display_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.index.to_string())
    }
}

/// A fully decoded input layer
#[derive(Debug, Clone)]
pub struct VectorLayer {
    /// Layer name, taken from the file stem
    pub name: String,

    /// Format name (e.g., "GeoJSON", "Shapefile")
    pub format: String,

    /// Declared field list
    pub schema: LayerSchema,

    /// CRS definition text carried by the source (e.g., a `.prj` file)
    pub crs_wkt: Option<String>,

    pub features: Vec<LayerFeature>,
}

impl VectorLayer {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A feature ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFeature {
    pub id: u64,
    pub geometry: Geometry,
    pub properties: Properties,
}

/// A complete output layer: schema, CRS passthrough, and features
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputLayer {
    pub schema: LayerSchema,
    pub crs_wkt: Option<String>,
    pub features: Vec<OutputFeature>,
}
