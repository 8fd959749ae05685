//! Join pipeline orchestration
//!
//! Every configuration error (unreadable layer, unknown output format,
//! missing or inconsistently typed designated field, duplicate or invalid
//! region id) is raised before the first point is matched. Nothing is
//! written unless all phases succeed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use seglabel_core::config::JoinOptions;
use seglabel_core::error::{GeometryError, Result, SeglabelError};
use seglabel_core::formats::FormatRegistry;
use seglabel_core::models::{FieldType, FieldValue, LayerSchema, OutputLayer, VectorLayer};
use seglabel_geo::{GeometryEngine, PlanarEngine};

use crate::matcher::PointMatcher;
use crate::merge::SchemaMerger;
use crate::store::{GeometryStore, RegionIdSource};
use crate::validator::ConflictValidator;

/// Input and output locations for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub segments: PathBuf,
    pub points: PathBuf,
    pub output: PathBuf,
}

impl JoinRequest {
    pub fn new(
        segments: impl Into<PathBuf>,
        points: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self { segments: segments.into(), points: points.into(), output: output.into() }
    }
}

/// Run report
#[derive(Debug, Clone, Serialize)]
pub struct JoinSummary {
    pub regions_read: usize,
    pub regions_loaded: usize,
    pub skipped_regions: usize,
    pub points_read: usize,
    pub skipped_points: usize,
    pub unmatched_points: usize,
    pub matched_regions: usize,
    pub conflicting_regions: Vec<u64>,
    pub regions_written: usize,
    pub designated_field: String,
    pub designated_collision: bool,
    pub output_schema: LayerSchema,
    pub output: Option<PathBuf>,
    pub parallel: bool,
    pub skipped_geometries: Vec<GeometryError>,
}

/// Drives build -> match -> validate -> write
pub struct JoinPipeline<E: GeometryEngine + Clone = PlanarEngine> {
    registry: FormatRegistry,
    engine: E,
    options: JoinOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl JoinPipeline<PlanarEngine> {
    /// Pipeline with the built-in formats and the planar engine
    pub fn new(options: JoinOptions) -> Self {
        Self::with_engine(options, PlanarEngine)
    }
}

impl<E: GeometryEngine + Clone> JoinPipeline<E> {
    pub fn with_engine(options: JoinOptions, engine: E) -> Self {
        Self { registry: FormatRegistry::with_defaults(), engine, options, cancel: None }
    }

    /// Abort the run, without writing, once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run every phase and write the output layer
    pub fn run(&self, request: &JoinRequest) -> Result<JoinSummary> {
        self.execute(request, true)
    }

    /// Run every phase except the write
    pub fn dry_run(&self, request: &JoinRequest) -> Result<JoinSummary> {
        self.execute(request, false)
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(SeglabelError::Cancelled),
            _ => Ok(()),
        }
    }

    fn read_layer(&self, path: &Path) -> Result<VectorLayer> {
        let reader = self.registry.detect_reader(path)?;

        let validation = reader.validate(path);
        for warning in &validation.warnings {
            tracing::warn!("{}: {}", path.display(), warning);
        }
        if !validation.is_valid() {
            return Err(SeglabelError::LayerUnreadable {
                path: path.to_path_buf(),
                reason: validation.errors.join("; "),
            });
        }

        reader.read(path)
    }

    fn execute(&self, request: &JoinRequest, write: bool) -> Result<JoinSummary> {
        let options = &self.options;
        let writer = self.registry.detect_writer(&request.output)?;

        // Open both layers before building anything
        let regions = self.read_layer(&request.segments)?;
        let points = self.read_layer(&request.points)?;
        check_designated_field(&points, &options.designated_field)?;

        tracing::info!(
            regions = regions.len(),
            points = points.len(),
            "Opened {} ({}) and {} ({})",
            regions.name,
            regions.format,
            points.name,
            points.format
        );

        // Build
        let regions_read = regions.len();
        let id_source = RegionIdSource::from_option(options.region_id_field.as_deref());
        let store = GeometryStore::load(regions, self.engine.clone(), &id_source)?;
        let index = store.build_index();
        tracing::info!(
            loaded = store.len(),
            skipped = store.skipped().len(),
            "Built spatial index over region layer"
        );
        self.check_cancelled()?;

        // Match
        let matcher = PointMatcher::new(&store, &index, &options.designated_field);
        let outcome = if options.parallel {
            matcher.run_parallel(&points.features, options.threads)?
        } else {
            matcher.run_sequential(&points.features)
        };
        tracing::info!(
            matched_regions = outcome.aggregation.len(),
            matches = outcome.aggregation.total_matches(),
            unmatched = outcome.unmatched_points,
            skipped = outcome.skipped.len(),
            "Matched point layer"
        );
        self.check_cancelled()?;

        // Validate
        let validation = ConflictValidator::validate(&outcome.aggregation);
        tracing::info!(
            validated = validation.len(),
            conflicting = validation.conflicts().len(),
            "Validated regions"
        );

        // Merge
        let merged = SchemaMerger::merge(
            store.schema(),
            &points.schema,
            &options.designated_field,
            &options.id_output_field,
        );
        let features = SchemaMerger::build_records(&store, &validation, &merged);
        self.check_cancelled()?;

        let regions_written = features.len();
        let output = if write {
            let layer = OutputLayer {
                schema: merged.schema.clone(),
                crs_wkt: store.crs_wkt().map(str::to_string),
                features,
            };
            writer.write(&request.output, &layer)?;
            tracing::info!(
                regions = regions_written,
                format = writer.format_name(),
                "Wrote {}",
                request.output.display()
            );
            Some(request.output.clone())
        } else {
            None
        };

        let mut skipped_geometries = store.skipped().to_vec();
        skipped_geometries.extend(outcome.skipped.iter().cloned());

        Ok(JoinSummary {
            regions_read,
            regions_loaded: store.len(),
            skipped_regions: store.skipped().len(),
            points_read: outcome.points_processed,
            skipped_points: outcome.skipped.len(),
            unmatched_points: outcome.unmatched_points,
            matched_regions: outcome.aggregation.len(),
            conflicting_regions: validation.conflicts().to_vec(),
            regions_written,
            designated_field: options.designated_field.clone(),
            designated_collision: merged.designated_collision,
            output_schema: merged.schema,
            output,
            parallel: options.parallel,
            skipped_geometries,
        })
    }
}

/// Check the designated field exists and its values share one type.
///
/// Integer and Real values may be mixed; nulls are ignored.
pub fn check_designated_field(points: &VectorLayer, field: &str) -> Result<Option<FieldType>> {
    if !points.schema.contains(field) {
        return Err(SeglabelError::DesignatedFieldMissing {
            field: field.to_string(),
            available: points.schema.names(),
        });
    }

    let mut observed: Option<(FieldType, String)> = None;
    for feature in &points.features {
        let Some(value_type) = feature.properties.get(field).and_then(FieldValue::observed_type) else {
            continue;
        };

        observed = match observed {
            None => Some((value_type, feature.display_id())),
            Some((current, first)) => match current.unify(value_type) {
                Some(unified) => Some((unified, first)),
                None => {
                    return Err(SeglabelError::DesignatedFieldType {
                        field: field.to_string(),
                        reason: format!(
                            "feature {} has a {} value but feature {} has a {} value",
                            first,
                            current,
                            feature.display_id(),
                            value_type
                        ),
                    })
                }
            },
        };
    }

    Ok(observed.map(|(field_type, _)| field_type))
}
