use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box with inclusive edges
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl BoundingBox {
    /// Create a box from two opposite corners in any order
    pub fn new(a: [f64; 2], b: [f64; 2]) -> Self {
        Self {
            min: [a[0].min(b[0]), a[1].min(b[1])],
            max: [a[0].max(b[0]), a[1].max(b[1])],
        }
    }

    /// Degenerate box covering a single coordinate
    pub fn from_point(point: [f64; 2]) -> Self {
        Self { min: point, max: point }
    }

    /// Whether the boxes overlap; touching edges count
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min[0] <= other.max[0]
            && other.min[0] <= self.max[0]
            && self.min[1] <= other.max[1]
            && other.min[1] <= self.max[1]
    }

    pub fn contains_point(&self, point: [f64; 2]) -> bool {
        self.intersects(&BoundingBox::from_point(point))
    }

    pub fn width(&self) -> f64 {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> f64 {
        self.max[1] - self.min[1]
    }
}
