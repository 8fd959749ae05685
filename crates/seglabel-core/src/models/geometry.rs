//! Canonical geometry types used across all seglabel crates.
//!
//! These types mirror the GeoJSON geometry model with plain coordinate arrays.
//! Computational work happens on `geo` types in `seglabel-geo`; this module
//! only describes shape and structural validity.

use serde::{Deserialize, Serialize};

/// Geometry type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    Polygon,
    MultiPolygon,
}

impl std::fmt::Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryType::Point => write!(f, "Point"),
            GeometryType::Polygon => write!(f, "Polygon"),
            GeometryType::MultiPolygon => write!(f, "MultiPolygon"),
        }
    }
}

/// GeoJSON-compatible geometry representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: [f64; 2],
    },
    Polygon {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
}

impl Geometry {
    /// Create a Point geometry
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point { coordinates: [x, y] }
    }

    /// Create a Polygon geometry
    pub fn polygon(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Geometry::Polygon { coordinates: rings }
    }

    /// Create a MultiPolygon geometry
    pub fn multi_polygon(polygons: Vec<Vec<Vec<[f64; 2]>>>) -> Self {
        Geometry::MultiPolygon { coordinates: polygons }
    }

    /// Axis-aligned square polygon with corners `min` and `max`
    pub fn rectangle(min: [f64; 2], max: [f64; 2]) -> Self {
        Geometry::polygon(vec![vec![
            [min[0], min[1]],
            [max[0], min[1]],
            [max[0], max[1]],
            [min[0], max[1]],
            [min[0], min[1]],
        ]])
    }

    /// Get the geometry type
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point { .. } => GeometryType::Point,
            Geometry::Polygon { .. } => GeometryType::Polygon,
            Geometry::MultiPolygon { .. } => GeometryType::MultiPolygon,
        }
    }

    /// True for Polygon and MultiPolygon
    pub fn is_areal(&self) -> bool {
        matches!(self, Geometry::Polygon { .. } | Geometry::MultiPolygon { .. })
    }

    /// Check structural validity.
    ///
    /// Coordinates must be finite, every ring needs at least four positions
    /// and must be closed, and a multi-polygon may not be empty.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Geometry::Point { coordinates } => validate_position(coordinates, "Point"),
            Geometry::Polygon { coordinates } => validate_rings(coordinates, "Polygon"),
            Geometry::MultiPolygon { coordinates } => {
                if coordinates.is_empty() {
                    return Err("MultiPolygon has no polygons".to_string());
                }
                for (i, polygon) in coordinates.iter().enumerate() {
                    validate_rings(polygon, &format!("MultiPolygon[{}]", i))?;
                }
                Ok(())
            }
        }
    }
}

fn validate_position(position: &[f64; 2], location: &str) -> Result<(), String> {
    if !position[0].is_finite() || !position[1].is_finite() {
        return Err(format!("{}: coordinates must be finite", location));
    }
    Ok(())
}

fn validate_rings(rings: &[Vec<[f64; 2]>], location: &str) -> Result<(), String> {
    if rings.is_empty() {
        return Err(format!("{}: no rings", location));
    }

    for (i, ring) in rings.iter().enumerate() {
        let ring_location = if i == 0 {
            format!("{} exterior", location)
        } else {
            format!("{} interior[{}]", location, i - 1)
        };

        if ring.len() < 4 {
            return Err(format!(
                "{}: ring must have at least 4 positions, found {}",
                ring_location,
                ring.len()
            ));
        }

        for position in ring {
            validate_position(position, &ring_location)?;
        }

        if ring.first() != ring.last() {
            return Err(format!("{}: ring is not closed", ring_location));
        }
    }

    Ok(())
}
