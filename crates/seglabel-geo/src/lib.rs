//! Geometry primitives for the spatial join
//!
//! This crate provides the containment engine and the bounding-box index
//! that the join pipeline is built on.

pub mod bbox;
pub mod engine;
pub mod index;

// Re-export key types for convenience
pub use bbox::BoundingBox;
pub use engine::{GeometryEngine, PlanarEngine};
pub use index::{IndexedRegion, RTreeIndex, SpatialIndex, SpatialIndexBuilder};
