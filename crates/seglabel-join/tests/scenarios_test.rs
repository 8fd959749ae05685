//! End-to-end join runs over GeoJSON fixtures

use seglabel_core::config::JoinOptions;
use seglabel_core::formats::shapefile::ShapefileFormatWriter;
use seglabel_core::formats::{FormatRegistry, LayerWriter};
use seglabel_core::models::{
    FieldDef, FieldType, FieldValue, Geometry, LayerSchema, OutputFeature, OutputLayer, Properties,
    VectorLayer,
};
use seglabel_core::SeglabelError;
use seglabel_join::{JoinPipeline, JoinRequest, JoinSummary};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

fn square(min: f64, max: f64) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[min, min], [max, min], [max, max], [min, max], [min, min]]]
    })
}

fn region(id: u64, min: f64, max: f64) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "geometry": square(min, max),
        "properties": { "area": (max - min) * (max - min) }
    })
}

fn point(id: u64, x: f64, y: f64, class: &str) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "geometry": { "type": "Point", "coordinates": [x, y] },
        "properties": { "class": class, "observer": format!("obs-{}", id) }
    })
}

fn write_collection(dir: &Path, name: &str, features: Vec<Value>) -> PathBuf {
    let path = dir.join(name);
    let collection = json!({ "type": "FeatureCollection", "features": features });
    fs::write(&path, serde_json::to_string_pretty(&collection).unwrap()).unwrap();
    path
}

struct Fixture {
    _dir: TempDir,
    request: JoinRequest,
}

impl Fixture {
    fn new(regions: Vec<Value>, points: Vec<Value>) -> Self {
        let dir = TempDir::new().unwrap();
        let segments = write_collection(dir.path(), "segments.geojson", regions);
        let points = write_collection(dir.path(), "points.geojson", points);
        let output = dir.path().join("labelled.geojson");
        Self { request: JoinRequest::new(segments, points, output), _dir: dir }
    }

    fn run(&self, options: JoinOptions) -> Result<JoinSummary, SeglabelError> {
        JoinPipeline::new(options).run(&self.request)
    }

    fn output(&self) -> VectorLayer {
        FormatRegistry::with_defaults().read(&self.request.output).unwrap()
    }

    fn output_classes(&self) -> Vec<(String, FieldValue)> {
        self.output()
            .features
            .iter()
            .map(|f| {
                (
                    f.id.clone().unwrap(),
                    f.properties.get("class").cloned().unwrap_or(FieldValue::Null),
                )
            })
            .collect()
    }
}

fn two_squares() -> Vec<Value> {
    vec![region(1, 0.0, 10.0), region(2, 20.0, 30.0)]
}

#[test]
fn test_unanimous_regions_labelled() {
    let fixture = Fixture::new(
        two_squares(),
        vec![point(1, 5.0, 5.0, "A"), point(2, 6.0, 6.0, "A"), point(3, 25.0, 25.0, "B")],
    );

    let summary = fixture.run(JoinOptions::new("class")).unwrap();

    assert_eq!(summary.regions_written, 2);
    assert!(summary.conflicting_regions.is_empty());
    assert_eq!(
        fixture.output_classes(),
        vec![("1".to_string(), FieldValue::from("A")), ("2".to_string(), FieldValue::from("B"))]
    );
}

#[test]
fn test_conflicting_region_excluded() {
    let fixture =
        Fixture::new(two_squares(), vec![point(1, 5.0, 5.0, "A"), point(2, 6.0, 6.0, "B")]);

    let summary = fixture.run(JoinOptions::new("class")).unwrap();

    assert_eq!(summary.regions_written, 0);
    assert_eq!(summary.conflicting_regions, vec![1]);
    assert!(fixture.output().is_empty());
}

#[test]
fn test_no_matches_writes_empty_layer_with_schema() {
    let fixture = Fixture::new(two_squares(), vec![point(1, 50.0, 50.0, "A")]);

    let summary = fixture.run(JoinOptions::new("class")).unwrap();

    assert_eq!(summary.regions_written, 0);
    assert_eq!(summary.unmatched_points, 1);

    let output = fixture.output();
    assert!(output.is_empty());
    assert_eq!(output.schema.names(), vec!["area", "class", "observer", "region_id"]);
}

#[test]
fn test_duplicate_region_id_writes_nothing() {
    let fixture =
        Fixture::new(vec![region(1, 0.0, 10.0), region(1, 20.0, 30.0)], vec![point(1, 5.0, 5.0, "A")]);

    let err = fixture.run(JoinOptions::new("class")).unwrap_err();

    assert!(matches!(err, SeglabelError::DuplicateRegionId { id: 1 }));
    assert!(err.is_configuration_error());
    assert!(!fixture.request.output.exists());
}

#[test]
fn test_region_without_matches_omitted() {
    let fixture = Fixture::new(two_squares(), vec![point(1, 25.0, 25.0, "B")]);

    fixture.run(JoinOptions::new("class")).unwrap();

    assert_eq!(fixture.output_classes(), vec![("2".to_string(), FieldValue::from("B"))]);
}

#[test]
fn test_output_records_carry_region_and_point_fields() {
    let fixture = Fixture::new(
        two_squares(),
        vec![point(7, 5.0, 5.0, "A"), point(8, 6.0, 6.0, "A")],
    );

    fixture.run(JoinOptions::new("class")).unwrap();

    let output = fixture.output();
    let properties = &output.features[0].properties;
    assert_eq!(properties.get("area"), Some(&FieldValue::Real(100.0)));
    assert_eq!(properties.get("region_id"), Some(&FieldValue::Integer(1)));
    // first observation in arrival order
    assert_eq!(properties.get("observer"), Some(&FieldValue::from("obs-7")));
    assert_eq!(
        output.features[0].geometry.as_ref().ok(),
        Some(&Geometry::rectangle([0.0, 0.0], [10.0, 10.0]))
    );
}

#[test]
fn test_point_on_boundary_matches() {
    let fixture = Fixture::new(two_squares(), vec![point(1, 10.0, 4.0, "A")]);

    fixture.run(JoinOptions::new("class")).unwrap();

    assert_eq!(fixture.output_classes(), vec![("1".to_string(), FieldValue::from("A"))]);
}

#[test]
fn test_malformed_geometries_skipped_and_counted() {
    let mut broken_region = region(3, 40.0, 50.0);
    broken_region["geometry"] = json!({ "type": "Polygon", "coordinates": [[[40.0, 40.0], [50.0, 40.0], [50.0, 50.0]]] });
    let mut broken_point = point(2, 0.0, 0.0, "B");
    broken_point["geometry"] = Value::Null;

    let mut regions = two_squares();
    regions.push(broken_region);
    let fixture = Fixture::new(regions, vec![point(1, 5.0, 5.0, "A"), broken_point]);

    let summary = fixture.run(JoinOptions::new("class")).unwrap();

    assert_eq!(summary.skipped_regions, 1);
    assert_eq!(summary.skipped_points, 1);
    assert_eq!(summary.skipped_geometries.len(), 2);
    assert_eq!(summary.regions_written, 1);
}

#[test]
fn test_designated_collision_keeps_region_value() {
    let mut labelled = region(1, 0.0, 10.0);
    labelled["properties"]["class"] = json!("region-label");

    let fixture = Fixture::new(vec![labelled], vec![point(1, 5.0, 5.0, "A")]);

    let summary = fixture.run(JoinOptions::new("class")).unwrap();

    assert!(summary.designated_collision);
    assert_eq!(fixture.output_classes(), vec![("1".to_string(), FieldValue::from("region-label"))]);
}

#[test]
fn test_missing_designated_field_is_fatal() {
    let fixture = Fixture::new(two_squares(), vec![point(1, 5.0, 5.0, "A")]);

    let err = fixture.run(JoinOptions::new("landuse")).unwrap_err();

    assert!(matches!(err, SeglabelError::DesignatedFieldMissing { .. }));
    assert!(!fixture.request.output.exists());
}

#[test]
fn test_unreadable_input_is_fatal() {
    let fixture = Fixture::new(two_squares(), vec![]);
    fs::write(&fixture.request.points, "{ not json").unwrap();

    let err = fixture.run(JoinOptions::new("class")).unwrap_err();

    assert!(matches!(err, SeglabelError::LayerUnreadable { .. }));
    assert!(!fixture.request.output.exists());
}

#[test]
fn test_region_id_field() {
    let mut first = region(0, 0.0, 10.0);
    first["properties"]["DN"] = json!(41);
    let mut second = region(0, 20.0, 30.0);
    second["properties"]["DN"] = json!(42);
    // feature ids collide, but ids come from DN
    let fixture = Fixture::new(vec![first, second], vec![point(1, 25.0, 25.0, "B")]);

    let options = JoinOptions::new("class").with_region_id_field("DN");
    fixture.run(options).unwrap();

    let output = fixture.output();
    assert_eq!(output.features[0].id.as_deref(), Some("42"));
}

#[test]
fn test_dry_run_writes_nothing() {
    let fixture = Fixture::new(two_squares(), vec![point(1, 5.0, 5.0, "A")]);

    let summary = JoinPipeline::new(JoinOptions::new("class")).dry_run(&fixture.request).unwrap();

    assert_eq!(summary.regions_written, 1);
    assert_eq!(summary.output, None);
    assert!(!fixture.request.output.exists());
}

#[test]
fn test_runs_are_byte_identical_and_parallel_agrees() {
    let points: Vec<Value> = (0..200)
        .map(|i| {
            let x = (i * 7 % 31) as f64;
            let y = (i * 11 % 31) as f64;
            point(i, x, y, if (i / 5) % 2 == 0 { "A" } else { "B" })
        })
        .collect();
    let fixture = Fixture::new(
        vec![region(1, 0.0, 10.0), region(2, 20.0, 30.0), region(3, 10.0, 20.0), region(4, 28.0, 31.0)],
        points,
    );

    fixture.run(JoinOptions::new("class")).unwrap();
    let first = fs::read(&fixture.request.output).unwrap();

    fixture.run(JoinOptions::new("class")).unwrap();
    let second = fs::read(&fixture.request.output).unwrap();

    let mut parallel = JoinOptions::new("class").with_parallel(true);
    parallel.threads = 3;
    fixture.run(parallel).unwrap();
    let third = fs::read(&fixture.request.output).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[test]
fn test_output_is_subset_of_input_regions() {
    let fixture = Fixture::new(
        two_squares(),
        vec![point(1, 5.0, 5.0, "A"), point(2, 25.0, 25.0, "B"), point(3, 26.0, 26.0, "C")],
    );

    fixture.run(JoinOptions::new("class")).unwrap();

    let output = fixture.output();
    assert!(output.len() <= 2);
    for feature in &output.features {
        assert!(["1", "2"].contains(&feature.id.as_deref().unwrap()));
    }
}

#[test]
fn test_shapefile_regions_keep_projection() {
    let dir = TempDir::new().unwrap();
    let segments = dir.path().join("segments.shp");
    let dn = |value: i64| -> Properties { vec![("DN", FieldValue::Integer(value))].into_iter().collect() };
    let regions = OutputLayer {
        schema: LayerSchema::new(vec![FieldDef::new("DN", FieldType::Integer)]),
        crs_wkt: Some("PROJCS[\"UTM 48S\"]".to_string()),
        features: vec![
            OutputFeature { id: 0, geometry: Geometry::rectangle([0.0, 0.0], [10.0, 10.0]), properties: dn(5) },
            OutputFeature { id: 1, geometry: Geometry::rectangle([20.0, 20.0], [30.0, 30.0]), properties: dn(6) },
        ],
    };
    ShapefileFormatWriter.write(&segments, &regions).unwrap();

    let points = write_collection(dir.path(), "points.geojson", vec![point(1, 5.0, 5.0, "A")]);
    let output = dir.path().join("labelled.shp");

    let options = JoinOptions::new("class").with_region_id_field("DN");
    let summary = JoinPipeline::new(options).run(&JoinRequest::new(&segments, points, &output)).unwrap();
    assert_eq!(summary.regions_written, 1);

    let written = FormatRegistry::with_defaults().read(&output).unwrap();
    assert_eq!(written.crs_wkt.as_deref(), Some("PROJCS[\"UTM 48S\"]"));
    assert_eq!(written.schema.names(), vec!["DN", "class", "observer", "region_id"]);
    assert_eq!(written.features[0].properties.get("DN"), Some(&FieldValue::Real(5.0)));
    assert_eq!(written.features[0].properties.get("class"), Some(&FieldValue::from("A")));
}

#[test]
fn test_cancelled_run_writes_nothing() {
    let fixture = Fixture::new(two_squares(), vec![point(1, 5.0, 5.0, "A")]);
    let cancel = Arc::new(AtomicBool::new(true));

    let result = JoinPipeline::new(JoinOptions::new("class"))
        .with_cancel_flag(cancel)
        .run(&fixture.request);

    assert!(matches!(result, Err(SeglabelError::Cancelled)));
    assert!(!fixture.request.output.exists());
}

#[test]
fn test_shapefile_output_drops_stale_projection() {
    let fixture = Fixture::new(two_squares(), vec![point(1, 5.0, 5.0, "A")]);
    let output = fixture.request.output.with_extension("shp");
    fs::write(output.with_extension("prj"), "PROJCS[\"stale\"]").unwrap();

    let request = JoinRequest::new(&fixture.request.segments, &fixture.request.points, &output);
    JoinPipeline::new(JoinOptions::new("class")).run(&request).unwrap();

    assert!(!output.with_extension("prj").exists());
    assert_eq!(FormatRegistry::with_defaults().read(&output).unwrap().crs_wkt, None);
}
