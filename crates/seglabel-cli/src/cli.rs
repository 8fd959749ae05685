use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// seglabel - label segmented regions from point observations
#[derive(Parser, Debug)]
#[command(name = "seglabel")]
#[command(about = "Join labelled points onto segment polygons", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join a point layer onto a region layer and write the labelled regions
    Join(JoinArgs),

    /// Show a layer's format, feature count and schema
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Region (segment) layer: .geojson, .json or .shp
    #[arg(long, value_name = "PATH")]
    pub segments: PathBuf,

    /// Point observation layer: .geojson, .json or .shp
    #[arg(long, value_name = "PATH")]
    pub points: PathBuf,

    /// Output layer; the format follows the extension
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: PathBuf,

    /// Point field whose value must agree within a region
    #[arg(long, value_name = "NAME")]
    pub property: Option<String>,

    /// Region field holding the integer region id (defaults to the feature id)
    #[arg(long, value_name = "NAME")]
    pub region_id_field: Option<String>,

    /// Output attribute for the original region id
    #[arg(long, value_name = "NAME")]
    pub id_output_field: Option<String>,

    /// Match points in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Worker threads for parallel matching (0 = one per core)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Run every phase except the write
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Layer to inspect
    pub path: PathBuf,
}
