//! Spatial join and label-consistency engine
//!
//! The run is split into four phases that each hand an immutable product
//! to the next: build (`GeometryStore` + spatial index), match
//! (`PointMatcher` -> `Aggregation`), validate (`ConflictValidator`) and
//! write (`SchemaMerger` + a format writer). `JoinPipeline` drives them.

pub mod matcher;
pub mod merge;
pub mod pipeline;
pub mod store;
pub mod validator;

pub use matcher::{Aggregation, Match, MatchOutcome, PartialAggregation, PointMatcher};
pub use merge::{MergedSchema, SchemaMerger};
pub use pipeline::{JoinPipeline, JoinRequest, JoinSummary};
pub use store::{GeometryStore, RegionIdSource, StoredRegion};
pub use validator::{ConflictValidator, ValidatedRegion, Validation};
