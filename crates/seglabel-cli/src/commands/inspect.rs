//! Inspect command implementation

use crate::cli::InspectArgs;
use crate::output::OutputWriter;
use crate::output_types::{FieldRow, InspectOutput, SummaryRow};
use anyhow::{bail, Result};
use seglabel_core::formats::FormatRegistry;
use seglabel_core::models::VectorLayer;
use std::collections::BTreeMap;

pub fn execute(args: InspectArgs, output: &OutputWriter) -> Result<()> {
    let registry = FormatRegistry::with_defaults();
    let reader = registry.detect_reader(&args.path)?;

    let validation = reader.validate(&args.path);
    for warning in &validation.warnings {
        output.warning(warning);
    }
    if !validation.is_valid() {
        bail!(seglabel_core::SeglabelError::LayerUnreadable {
            path: args.path.clone(),
            reason: validation.errors.join("; "),
        });
    }

    let layer = reader.read(&args.path)?;
    let report = describe(&args.path.display().to_string(), &layer);

    if output.is_json() {
        output.result(report)?;
        return Ok(());
    }

    output.section(format!("Layer {}", report.name));
    let mut rows = vec![
        SummaryRow::new("Path", &report.path),
        SummaryRow::new("Format", &report.format),
        SummaryRow::new("Features", report.feature_count),
        SummaryRow::new("Malformed geometries", report.malformed_geometries),
        SummaryRow::new("CRS", if report.has_crs { "present" } else { "none" }),
    ];
    for (geometry_type, count) in &report.geometry_types {
        rows.push(SummaryRow::new(format!("{} features", geometry_type), count));
    }
    output.table(rows);

    output.section("Fields");
    output.table(report.fields);

    Ok(())
}

fn describe(path: &str, layer: &VectorLayer) -> InspectOutput {
    let mut geometry_types = BTreeMap::new();
    let mut malformed_geometries = 0;
    for feature in &layer.features {
        match &feature.geometry {
            Ok(geometry) => *geometry_types.entry(geometry.geometry_type().to_string()).or_insert(0) += 1,
            Err(_) => malformed_geometries += 1,
        }
    }

    InspectOutput {
        path: path.to_string(),
        format: layer.format.clone(),
        name: layer.name.clone(),
        feature_count: layer.len(),
        geometry_types,
        malformed_geometries,
        has_crs: layer.crs_wkt.is_some(),
        fields: layer
            .schema
            .iter()
            .map(|field| FieldRow { name: field.name.clone(), field_type: field.field_type.to_string() })
            .collect(),
    }
}
