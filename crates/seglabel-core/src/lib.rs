//! seglabel Core - Domain models, configuration, and vector formats
//!
//! This crate contains the data model shared by the join engine, the error
//! taxonomy, layered configuration, and the GeoJSON/Shapefile adapters.

pub mod config;
pub mod error;
pub mod formats;
pub mod models;

pub use error::{GeometryError, LayerKind, Result, SeglabelError};
