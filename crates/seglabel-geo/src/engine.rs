//! Point-in-region containment
//!
//! Boundary convention: a point lying exactly on a region's exterior or
//! interior ring is contained by that region. Every engine must follow it
//! so that results do not depend on which engine is plugged in.

use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use seglabel_core::models::Geometry;

use crate::bbox::BoundingBox;

/// Containment engine used by the matcher
pub trait GeometryEngine: Send + Sync {
    /// Engine-specific form of a region, prepared once at load time
    type Shape: Send + Sync;

    /// Validate a region geometry and convert it for containment tests.
    ///
    /// Anything other than a structurally valid Polygon or MultiPolygon is
    /// rejected with a reason.
    fn prepare(&self, geometry: &Geometry) -> Result<Self::Shape, String>;

    /// Bounding box of a prepared region
    fn bounding_box(&self, shape: &Self::Shape) -> Option<BoundingBox>;

    /// Exact containment test, boundary inclusive
    fn contains(&self, shape: &Self::Shape, point: [f64; 2]) -> bool;
}

/// Planar engine backed by `geo`
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarEngine;

impl GeometryEngine for PlanarEngine {
    type Shape = MultiPolygon<f64>;

    fn prepare(&self, geometry: &Geometry) -> Result<Self::Shape, String> {
        geometry.validate()?;

        match geometry {
            Geometry::Polygon { coordinates } => Ok(MultiPolygon::new(vec![to_polygon(coordinates)])),
            Geometry::MultiPolygon { coordinates } => {
                Ok(MultiPolygon::new(coordinates.iter().map(|p| to_polygon(p)).collect()))
            }
            Geometry::Point { .. } => Err("expected Polygon or MultiPolygon, found Point".to_string()),
        }
    }

    fn bounding_box(&self, shape: &Self::Shape) -> Option<BoundingBox> {
        shape.bounding_rect().map(|rect| {
            let min = rect.min();
            let max = rect.max();
            BoundingBox::new([min.x, min.y], [max.x, max.y])
        })
    }

    fn contains(&self, shape: &Self::Shape, point: [f64; 2]) -> bool {
        let coord = Coord { x: point[0], y: point[1] };
        !matches!(shape.coordinate_position(&coord), CoordPos::Outside)
    }
}

fn to_line_string(ring: &[[f64; 2]]) -> LineString<f64> {
    LineString::from(ring.iter().map(|c| (c[0], c[1])).collect::<Vec<_>>())
}

fn to_polygon(rings: &[Vec<[f64; 2]>]) -> Polygon<f64> {
    let exterior = rings.first().map(|r| to_line_string(r)).unwrap_or_else(|| LineString::new(vec![]));
    let interiors = rings.iter().skip(1).map(|r| to_line_string(r)).collect();
    Polygon::new(exterior, interiors)
}

/// Coordinate of a point observation
///
/// Fails for anything that is not a finite Point.
pub fn point_coordinate(geometry: &Geometry) -> Result<[f64; 2], String> {
    match geometry {
        Geometry::Point { coordinates } => {
            geometry.validate()?;
            Ok(*coordinates)
        }
        other => Err(format!("expected Point, found {}", other.geometry_type())),
    }
}
