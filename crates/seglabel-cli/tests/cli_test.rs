//! Integration tests for the seglabel binary
//!
//! These tests verify exit codes, JSON output, and that failed or dry runs
//! leave no output behind.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn seglabel(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_seglabel"))
        .args(args)
        .env_remove("SEGLABEL_PROPERTY")
        .env_remove("SEGLABEL_REGION_ID_FIELD")
        .env_remove("SEGLABEL_ID_OUTPUT_FIELD")
        .env_remove("SEGLABEL_PARALLEL")
        .env_remove("SEGLABEL_THREADS")
        .output()
        .expect("Failed to execute command")
}

fn region(id: u64, min: f64, max: f64) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[min, min], [max, min], [max, max], [min, max], [min, min]]]
        },
        "properties": { "name": format!("segment-{}", id) }
    })
}

fn point(x: f64, y: f64, class: &str) -> Value {
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [x, y] },
        "properties": { "class": class }
    })
}

fn write_collection(dir: &Path, name: &str, features: Vec<Value>) -> String {
    let path = dir.join(name);
    let collection = json!({ "type": "FeatureCollection", "features": features });
    fs::write(&path, collection.to_string()).unwrap();
    path.display().to_string()
}

struct Workspace {
    dir: TempDir,
    segments: String,
    points: String,
}

impl Workspace {
    fn new(regions: Vec<Value>) -> Self {
        let dir = TempDir::new().unwrap();
        let segments = write_collection(dir.path(), "segments.geojson", regions);
        let points = write_collection(
            dir.path(),
            "points.geojson",
            vec![point(5.0, 5.0, "A"), point(6.0, 6.0, "A"), point(25.0, 25.0, "B"), point(26.0, 26.0, "C")],
        );
        Self { dir, segments, points }
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("labelled.geojson")
    }

    fn join(&self, extra: &[&str]) -> Output {
        let output = self.output().display().to_string();
        let mut args = vec![
            "join",
            "--segments",
            self.segments.as_str(),
            "--points",
            self.points.as_str(),
            "-o",
            output.as_str(),
        ];
        args.extend_from_slice(extra);
        seglabel(&args)
    }
}

#[test]
fn test_join_json_output() {
    let ws = Workspace::new(vec![region(1, 0.0, 10.0), region(2, 20.0, 30.0)]);

    let output = ws.join(&["--property", "class", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let parsed: Value = serde_json::from_slice(&output.stdout).expect("Output should be valid JSON");
    assert_eq!(parsed["status"], "success");
    assert_eq!(parsed["data"]["dry_run"], false);
    assert_eq!(parsed["data"]["regions_written"], 1);
    assert_eq!(parsed["data"]["conflicting_regions"], json!([2]));

    let written: Value = serde_json::from_str(&fs::read_to_string(ws.output()).unwrap()).unwrap();
    let features = written["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["class"], "A");
    assert_eq!(features[0]["properties"]["region_id"], 1);
}

#[test]
fn test_parallel_flag_gives_same_output() {
    let ws = Workspace::new(vec![region(1, 0.0, 10.0), region(2, 20.0, 30.0)]);

    assert!(ws.join(&["--property", "class"]).status.success());
    let sequential = fs::read(ws.output()).unwrap();

    assert!(ws.join(&["--property", "class", "--parallel", "--threads", "2"]).status.success());
    assert_eq!(fs::read(ws.output()).unwrap(), sequential);
}

#[test]
fn test_duplicate_region_id_fails_without_output() {
    let ws = Workspace::new(vec![region(1, 0.0, 10.0), region(1, 20.0, 30.0)]);

    let output = ws.join(&["--property", "class"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Duplicate region id 1"));
    assert!(!ws.output().exists());
}

#[test]
fn test_missing_property_is_an_error() {
    let ws = Workspace::new(vec![region(1, 0.0, 10.0)]);

    let output = ws.join(&[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("designated_field"));
    assert!(!ws.output().exists());
}

#[test]
fn test_unknown_property_lists_available_fields() {
    let ws = Workspace::new(vec![region(1, 0.0, 10.0)]);

    let output = ws.join(&["--property", "label"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("'label' not found"));
    assert!(stderr.contains("class"));
}

#[test]
fn test_dry_run_writes_nothing() {
    let ws = Workspace::new(vec![region(1, 0.0, 10.0), region(2, 20.0, 30.0)]);

    let output = ws.join(&["--property", "class", "--dry-run", "--json"]);
    assert!(output.status.success());

    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["data"]["dry_run"], true);
    assert_eq!(parsed["data"]["regions_written"], 1);
    assert!(parsed["data"]["output"].is_null());
    assert!(!ws.output().exists());
}

#[test]
fn test_config_file_supplies_property() {
    let ws = Workspace::new(vec![region(1, 0.0, 10.0)]);
    let config = ws.dir.path().join("seglabel.toml");
    fs::write(&config, "designated_field = \"class\"\nid_output_field = \"segment\"\n").unwrap();

    let config = config.display().to_string();
    let output = ws.join(&["--config", config.as_str()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let written: Value = serde_json::from_str(&fs::read_to_string(ws.output()).unwrap()).unwrap();
    assert_eq!(written["features"][0]["properties"]["segment"], 1);
}

#[test]
fn test_inspect_json() {
    let ws = Workspace::new(vec![region(1, 0.0, 10.0), region(2, 20.0, 30.0)]);

    let output = seglabel(&["inspect", ws.points.as_str(), "--json"]);
    assert!(output.status.success());

    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["data"]["format"], "GeoJSON");
    assert_eq!(parsed["data"]["feature_count"], 4);
    assert_eq!(parsed["data"]["geometry_types"]["Point"], 4);
    assert_eq!(parsed["data"]["fields"][0]["name"], "class");
    assert_eq!(parsed["data"]["fields"][0]["type"], "text");
}

#[test]
fn test_inspect_missing_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.geojson").display().to_string();

    let output = seglabel(&["inspect", missing.as_str()]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Cannot read input layer"));
}
