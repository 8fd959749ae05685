//! Point matching and per-region aggregation
//!
//! Points are matched either sequentially or on the rayon pool. Parallel
//! workers each fold into their own `PartialAggregation`; partials are
//! merged and ordered by point arrival sequence before the `Aggregation` is
//! assembled, so both modes produce identical results.

use std::collections::BTreeMap;

use rayon::prelude::*;
use seglabel_core::error::{GeometryError, LayerKind, Result, SeglabelError};
use seglabel_core::models::{FieldValue, LayerFeature, Properties};
use seglabel_geo::engine::point_coordinate;
use seglabel_geo::{BoundingBox, GeometryEngine, SpatialIndex};

use crate::store::GeometryStore;

/// A point observation found inside a region
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub region_id: u64,

    /// Position of the point in the point layer
    pub sequence: usize,

    pub point_id: String,

    /// Value of the designated field
    pub value: FieldValue,

    /// Every attribute of the point
    pub properties: Properties,
}

/// Region id -> matches in point arrival order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    entries: BTreeMap<u64, Vec<Match>>,
}

impl Aggregation {
    /// Matches of a region, or `None` if nothing matched it
    pub fn get(&self, region_id: u64) -> Option<&[Match]> {
        self.entries.get(&region_id).map(Vec::as_slice)
    }

    /// Entries in ascending region id order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[Match])> {
        self.entries.iter().map(|(id, matches)| (*id, matches.as_slice()))
    }

    /// Number of regions with at least one match
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_matches(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Assemble from matches that are already in arrival order
    pub(crate) fn from_ordered(matches: Vec<Match>) -> Self {
        let mut entries: BTreeMap<u64, Vec<Match>> = BTreeMap::new();
        for m in matches {
            entries.entry(m.region_id).or_default().push(m);
        }
        Self { entries }
    }
}

/// One worker's share of the matching work
#[derive(Debug, Default)]
pub struct PartialAggregation {
    matches: Vec<Match>,
    skipped: Vec<(usize, GeometryError)>,
    unmatched: usize,
    processed: usize,
}

impl PartialAggregation {
    /// Combine two partials; order is restored in `finish`
    pub fn merge(mut self, other: PartialAggregation) -> PartialAggregation {
        self.matches.extend(other.matches);
        self.skipped.extend(other.skipped);
        self.unmatched += other.unmatched;
        self.processed += other.processed;
        self
    }

    /// Order everything by arrival sequence and build the outcome
    pub fn finish(mut self) -> MatchOutcome {
        // stable, so a point matching overlapping regions keeps its candidate order
        self.matches.sort_by_key(|m| m.sequence);
        self.skipped.sort_by_key(|(sequence, _)| *sequence);

        MatchOutcome {
            aggregation: Aggregation::from_ordered(self.matches),
            skipped: self.skipped.into_iter().map(|(_, e)| e).collect(),
            unmatched_points: self.unmatched,
            points_processed: self.processed,
        }
    }
}

/// Result of the match phase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub aggregation: Aggregation,

    /// Points skipped for malformed geometry, in layer order
    pub skipped: Vec<GeometryError>,

    /// Well-formed points that fell inside no region
    pub unmatched_points: usize,

    /// Points read from the layer, skipped ones included
    pub points_processed: usize,
}

/// Matches point observations against the region store
pub struct PointMatcher<'a, E: GeometryEngine, I: SpatialIndex> {
    store: &'a GeometryStore<E>,
    index: &'a I,
    designated_field: &'a str,
}

impl<'a, E: GeometryEngine, I: SpatialIndex> PointMatcher<'a, E, I> {
    pub fn new(store: &'a GeometryStore<E>, index: &'a I, designated_field: &'a str) -> Self {
        Self { store, index, designated_field }
    }

    /// Match a single point into `partial`
    pub fn match_point(&self, sequence: usize, feature: &LayerFeature, partial: &mut PartialAggregation) {
        partial.processed += 1;

        let coordinate = match feature.geometry.as_ref().map_err(|e| e.clone()).and_then(point_coordinate) {
            Ok(coordinate) => coordinate,
            Err(reason) => {
                let error = GeometryError::new(LayerKind::Point, feature.display_id(), reason);
                tracing::warn!("{}", error);
                partial.skipped.push((sequence, error));
                return;
            }
        };

        let candidates = self.index.query(&BoundingBox::from_point(coordinate));
        let value = feature
            .properties
            .get(self.designated_field)
            .cloned()
            .unwrap_or(FieldValue::Null);

        let mut matched = false;
        for region_id in candidates {
            if !self.store.contains(region_id, coordinate) {
                tracing::trace!(region_id, point = %feature.display_id(), "Candidate rejected by exact test");
                continue;
            }
            matched = true;
            partial.matches.push(Match {
                region_id,
                sequence,
                point_id: feature.display_id(),
                value: value.clone(),
                properties: feature.properties.clone(),
            });
        }

        if !matched {
            partial.unmatched += 1;
        }
    }

    /// Match every point in layer order on the current thread
    pub fn run_sequential(&self, features: &[LayerFeature]) -> MatchOutcome {
        let mut partial = PartialAggregation::default();
        for (sequence, feature) in features.iter().enumerate() {
            self.match_point(sequence, feature, &mut partial);
        }
        partial.finish()
    }

    /// Match points on the rayon pool.
    ///
    /// `threads` of 0 uses the global pool; otherwise a dedicated pool of
    /// that size is built for the run.
    pub fn run_parallel(&self, features: &[LayerFeature], threads: usize) -> Result<MatchOutcome> {
        let work = || {
            features
                .par_iter()
                .enumerate()
                .fold(PartialAggregation::default, |mut partial, (sequence, feature)| {
                    self.match_point(sequence, feature, &mut partial);
                    partial
                })
                .reduce(PartialAggregation::default, PartialAggregation::merge)
                .finish()
        };

        if threads == 0 {
            return Ok(work());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| SeglabelError::ConfigInvalid {
                key: "threads".to_string(),
                reason: format!("Failed to build thread pool: {}", e),
            })?;

        Ok(pool.install(work))
    }
}
