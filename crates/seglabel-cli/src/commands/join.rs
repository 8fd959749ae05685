//! Join command implementation

use crate::cli::JoinArgs;
use crate::config_loader::load_config;
use crate::output::OutputWriter;
use crate::output_types::{JoinOutput, SummaryRow};
use anyhow::{Context, Result};
use seglabel_core::config::CliConfigOverrides;
use seglabel_join::{JoinPipeline, JoinRequest, JoinSummary};
use std::path::Path;

pub fn execute(args: JoinArgs, output: &OutputWriter, config_file: Option<&Path>) -> Result<()> {
    let overrides = CliConfigOverrides {
        designated_field: args.property,
        region_id_field: args.region_id_field,
        id_output_field: args.id_output_field,
        parallel: args.parallel.then_some(true),
        threads: args.threads,
    };

    let config = load_config(config_file, overrides)?;
    let options = config.resolve().context("Failed to resolve join options")?;

    let request = JoinRequest::new(args.segments, args.points, args.output);
    let pipeline = JoinPipeline::new(options);

    let summary = if args.dry_run {
        pipeline.dry_run(&request)?
    } else {
        pipeline.run(&request)?
    };

    if output.is_json() {
        output.result(JoinOutput { dry_run: args.dry_run, summary })?;
        return Ok(());
    }

    output.section("Join Summary");
    output.table(summary_rows(&summary));

    for skipped in &summary.skipped_geometries {
        output.warning(skipped);
    }

    if summary.designated_collision {
        output.warning(format!(
            "Region layer already has a '{}' field; region values were kept",
            summary.designated_field
        ));
    }

    if !summary.conflicting_regions.is_empty() {
        output.info(format!(
            "Excluded {} region(s) with conflicting '{}' values: {}",
            summary.conflicting_regions.len(),
            summary.designated_field,
            join_ids(&summary.conflicting_regions)
        ));
    }

    println!();
    match &summary.output {
        Some(path) => output.success(format!(
            "Wrote {} labelled region(s) to {}",
            summary.regions_written,
            path.display()
        )),
        None => output.success(format!(
            "Dry run: {} region(s) would be written to {}",
            summary.regions_written,
            request.output.display()
        )),
    }

    Ok(())
}

fn summary_rows(summary: &JoinSummary) -> Vec<SummaryRow> {
    vec![
        SummaryRow::new("Designated field", &summary.designated_field),
        SummaryRow::new("Regions read", summary.regions_read),
        SummaryRow::new("Regions skipped", summary.skipped_regions),
        SummaryRow::new("Points read", summary.points_read),
        SummaryRow::new("Points skipped", summary.skipped_points),
        SummaryRow::new("Points outside all regions", summary.unmatched_points),
        SummaryRow::new("Regions matched", summary.matched_regions),
        SummaryRow::new("Regions with conflicts", summary.conflicting_regions.len()),
        SummaryRow::new("Regions written", summary.regions_written),
        SummaryRow::new("Mode", if summary.parallel { "parallel" } else { "sequential" }),
    ]
}

fn join_ids(ids: &[u64]) -> String {
    const SHOWN: usize = 20;

    let mut listed: Vec<String> = ids.iter().take(SHOWN).map(u64::to_string).collect();
    if ids.len() > SHOWN {
        listed.push(format!("... ({} more)", ids.len() - SHOWN));
    }
    listed.join(", ")
}
