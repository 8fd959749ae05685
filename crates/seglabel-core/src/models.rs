pub mod field;
pub mod geometry;
pub mod layer;

pub use field::{FieldDef, FieldType, FieldValue, LayerSchema, Properties};
pub use geometry::{Geometry, GeometryType};
pub use layer::{LayerFeature, OutputFeature, OutputLayer, VectorLayer};
