//! Shapefile format reader and writer
//!
//! Shapefiles consist of multiple component files (.shp, .shx, .dbf, .prj).
//! The `.prj` text is carried through as the layer CRS so that outputs keep
//! the projection of the region layer.

use shapefile::dbase::{self, FieldName, FieldType as DbaseFieldType, FieldValue as DbaseFieldValue};
use shapefile::{Point, Polygon, PolygonRing, Reader as ShapefileReader, Shape};
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SeglabelError};
use crate::formats::atomic::StagedLayer;
use crate::formats::validation::FormatValidator;
use crate::formats::{FormatValidation, LayerReader, LayerWriter};
use crate::models::{
    FieldDef, FieldType, FieldValue, Geometry, LayerFeature, LayerSchema, OutputLayer, Properties,
    VectorLayer,
};

const REQUIRED_COMPONENTS: [&str; 3] = ["shp", "shx", "dbf"];
const ALL_COMPONENTS: [&str; 4] = ["shp", "shx", "dbf", "prj"];

/// Width of character fields in written `.dbf` tables
const CHARACTER_FIELD_LENGTH: u8 = 254;

/// Last-update date written into `.dbf` headers in place of the current
/// date (years since 1900, month, day)
const DBF_HEADER_DATE: [u8; 3] = [100, 1, 1];

/// Offset of the last-update date in a dBase header
const DBF_DATE_OFFSET: u64 = 1;

/// Shapefile format reader
pub struct ShapefileFormatReader;

impl LayerReader for ShapefileFormatReader {
    fn read(&self, path: &Path) -> Result<VectorLayer> {
        let unreadable = |reason: String| SeglabelError::LayerUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        // Verify all required component files exist
        let base = shapefile_base(path)?;
        let missing: Vec<String> = REQUIRED_COMPONENTS
            .iter()
            .filter(|ext| !base.with_extension(ext).exists())
            .map(|ext| format!(".{}", ext))
            .collect();
        if !missing.is_empty() {
            return Err(unreadable(format!(
                "Missing required component files: {}",
                missing.join(", ")
            )));
        }

        let schema = read_schema(&base.with_extension("dbf")).map_err(unreadable)?;

        let crs_wkt = match fs::read_to_string(base.with_extension("prj")) {
            Ok(text) => Some(text.trim().to_string()),
            Err(_) => None,
        };

        let mut reader = ShapefileReader::from_path(path)
            .map_err(|e| unreadable(format!("Failed to open Shapefile: {}", e)))?;

        let mut features = Vec::new();
        for result in reader.iter_shapes_and_records() {
            let (shape, record) =
                result.map_err(|e| unreadable(format!("Failed to read feature: {}", e)))?;

            let index = features.len();
            let properties = schema
                .iter()
                .map(|field| {
                    let value =
                        record.get(&field.name).map(convert_dbase_value).unwrap_or(FieldValue::Null);
                    (field.name.clone(), value)
                })
                .collect::<Properties>();

            features.push(LayerFeature {
                index,
                id: None,
                geometry: convert_shape(&shape),
                properties,
            });
        }

        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed").to_string();

        Ok(VectorLayer { name, format: "Shapefile".to_string(), schema, crs_wkt, features })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["shp"]
    }

    fn format_name(&self) -> &str {
        "Shapefile"
    }

    fn validate(&self, path: &Path) -> FormatValidation {
        let mut validation = FormatValidator::validate_file_exists(path);
        if !validation.is_valid() {
            return validation;
        }

        let base = match shapefile_base(path) {
            Ok(b) => b,
            Err(e) => {
                validation.errors.push(format!("Invalid Shapefile path: {}", e));
                return validation;
            }
        };

        let component_validation =
            FormatValidator::validate_component_files(&base, &REQUIRED_COMPONENTS, &["prj"]);

        FormatValidator::merge_validations(vec![validation, component_validation])
    }
}

/// Get the base path for a Shapefile (without extension)
fn shapefile_base(path: &Path) -> Result<PathBuf> {
    let is_shp = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("shp"))
        .unwrap_or(false);

    if !is_shp {
        return Err(SeglabelError::LayerUnreadable {
            path: path.to_path_buf(),
            reason: "Not a Shapefile (.shp)".to_string(),
        });
    }

    Ok(path.with_extension(""))
}

/// Read declared field types from the `.dbf` header
fn read_schema(dbf_path: &Path) -> std::result::Result<LayerSchema, String> {
    let reader = dbase::Reader::from_path(dbf_path)
        .map_err(|e| format!("Failed to open attribute table: {}", e))?;

    let mut schema = LayerSchema::default();
    for info in reader.fields() {
        // deletion marker, not an attribute
        if info.name() == "DeletionFlag" {
            continue;
        }
        schema.push(FieldDef::new(info.name(), convert_field_type(info.field_type())));
    }
    Ok(schema)
}

fn convert_field_type(field_type: DbaseFieldType) -> FieldType {
    match field_type {
        DbaseFieldType::Integer => FieldType::Integer,
        DbaseFieldType::Numeric
        | DbaseFieldType::Float
        | DbaseFieldType::Double
        | DbaseFieldType::Currency => FieldType::Real,
        DbaseFieldType::Logical => FieldType::Boolean,
        DbaseFieldType::Date | DbaseFieldType::DateTime => FieldType::Date,
        // Character, Memo
        _ => FieldType::Text,
    }
}

/// Convert dBase field value to a field value
fn convert_dbase_value(value: &DbaseFieldValue) -> FieldValue {
    match value {
        DbaseFieldValue::Character(Some(s)) => FieldValue::Text(s.clone()),
        DbaseFieldValue::Character(None) => FieldValue::Null,
        DbaseFieldValue::Numeric(Some(n)) => FieldValue::Real(*n),
        DbaseFieldValue::Numeric(None) => FieldValue::Null,
        DbaseFieldValue::Logical(Some(b)) => FieldValue::Boolean(*b),
        DbaseFieldValue::Logical(None) => FieldValue::Null,
        DbaseFieldValue::Date(Some(date)) => {
            FieldValue::Text(format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day()))
        }
        DbaseFieldValue::Date(None) => FieldValue::Null,
        DbaseFieldValue::Float(Some(f)) => FieldValue::Real(*f as f64),
        DbaseFieldValue::Float(None) => FieldValue::Null,
        DbaseFieldValue::Integer(i) => FieldValue::Integer(*i as i64),
        DbaseFieldValue::Currency(c) => FieldValue::Real(*c),
        DbaseFieldValue::DateTime(dt) => FieldValue::Text(format!(
            "{:04}-{:02}-{:02}",
            dt.date().year(),
            dt.date().month(),
            dt.date().day()
        )),
        DbaseFieldValue::Double(d) => FieldValue::Real(*d),
        DbaseFieldValue::Memo(s) => FieldValue::Text(s.clone()),
    }
}

fn ring_coords(points: &[Point]) -> Vec<[f64; 2]> {
    points.iter().map(|p| [p.x, p.y]).collect()
}

/// Group shapefile rings into polygons: each outer ring starts a polygon
/// and the inner rings that follow it are its holes.
fn group_rings<I>(rings: I) -> std::result::Result<Geometry, String>
where
    I: Iterator<Item = (bool, Vec<[f64; 2]>)>,
{
    let mut polygons: Vec<Vec<Vec<[f64; 2]>>> = Vec::new();
    for (is_outer, coords) in rings {
        if is_outer {
            polygons.push(vec![coords]);
        } else {
            match polygons.last_mut() {
                Some(polygon) => polygon.push(coords),
                None => return Err("inner ring precedes any outer ring".to_string()),
            }
        }
    }

    match polygons.len() {
        0 => Err("polygon has no rings".to_string()),
        1 => Ok(Geometry::polygon(polygons.remove(0))),
        _ => Ok(Geometry::multi_polygon(polygons)),
    }
}

fn convert_shape(shape: &Shape) -> std::result::Result<Geometry, String> {
    match shape {
        Shape::Point(p) => Ok(Geometry::point(p.x, p.y)),
        Shape::PointM(p) => Ok(Geometry::point(p.x, p.y)),
        Shape::PointZ(p) => Ok(Geometry::point(p.x, p.y)),
        Shape::Polygon(polygon) => group_rings(
            polygon
                .rings()
                .iter()
                .map(|ring| (matches!(ring, PolygonRing::Outer(_)), ring_coords(ring.points()))),
        ),
        Shape::PolygonM(polygon) => group_rings(polygon.rings().iter().map(|ring| {
            (
                matches!(ring, PolygonRing::Outer(_)),
                ring.points().iter().map(|p| [p.x, p.y]).collect(),
            )
        })),
        Shape::PolygonZ(polygon) => group_rings(polygon.rings().iter().map(|ring| {
            (
                matches!(ring, PolygonRing::Outer(_)),
                ring.points().iter().map(|p| [p.x, p.y]).collect(),
            )
        })),
        Shape::NullShape => Err("null shape".to_string()),
        Shape::Polyline(_) | Shape::PolylineM(_) | Shape::PolylineZ(_) => {
            Err("unsupported geometry type Polyline".to_string())
        }
        Shape::Multipoint(_) | Shape::MultipointM(_) | Shape::MultipointZ(_) => {
            Err("unsupported geometry type Multipoint".to_string())
        }
        Shape::Multipatch(_) => Err("unsupported geometry type Multipatch".to_string()),
    }
}

/// Shapefile format writer
///
/// Only areal output is supported; dBase limits field names to 10 bytes.
pub struct ShapefileFormatWriter;

impl ShapefileFormatWriter {
    fn table_builder(path: &Path, schema: &LayerSchema) -> Result<dbase::TableWriterBuilder> {
        let mut builder = dbase::TableWriterBuilder::new();
        for field in schema.iter() {
            let name = FieldName::try_from(field.name.as_str()).map_err(|e| {
                SeglabelError::WriteFailed {
                    path: path.to_path_buf(),
                    reason: format!("Field '{}' cannot be stored in dBase: {:?}", field.name, e),
                }
            })?;
            builder = match field.field_type {
                FieldType::Text | FieldType::Date => {
                    builder.add_character_field(name, CHARACTER_FIELD_LENGTH)
                }
                FieldType::Integer => builder.add_numeric_field(name, 18, 0),
                FieldType::Real => builder.add_numeric_field(name, 24, 10),
                FieldType::Boolean => builder.add_logical_field(name),
            };
        }
        Ok(builder)
    }

    fn to_record(schema: &LayerSchema, properties: &Properties) -> dbase::Record {
        let mut record = dbase::Record::default();
        for field in schema.iter() {
            let value = properties.get(&field.name).unwrap_or(&FieldValue::Null);
            record.insert(field.name.clone(), to_dbase_value(field.field_type, value));
        }
        record
    }

    fn to_polygon(path: &Path, geometry: &Geometry) -> Result<Polygon> {
        let ring = |coords: &Vec<[f64; 2]>| -> Vec<Point> {
            coords.iter().map(|c| Point::new(c[0], c[1])).collect()
        };
        let polygon_rings = |rings: &Vec<Vec<[f64; 2]>>| -> Vec<PolygonRing<Point>> {
            rings
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    if i == 0 {
                        PolygonRing::Outer(ring(r))
                    } else {
                        PolygonRing::Inner(ring(r))
                    }
                })
                .collect()
        };

        match geometry {
            Geometry::Polygon { coordinates } => Ok(Polygon::with_rings(polygon_rings(coordinates))),
            Geometry::MultiPolygon { coordinates } => Ok(Polygon::with_rings(
                coordinates.iter().flat_map(polygon_rings).collect(),
            )),
            Geometry::Point { .. } => Err(SeglabelError::WriteFailed {
                path: path.to_path_buf(),
                reason: "Shapefile output supports polygon geometries only".to_string(),
            }),
        }
    }
}

fn to_dbase_value(field_type: FieldType, value: &FieldValue) -> DbaseFieldValue {
    match (field_type, value) {
        (FieldType::Boolean, FieldValue::Boolean(b)) => DbaseFieldValue::Logical(Some(*b)),
        (FieldType::Boolean, _) => DbaseFieldValue::Logical(None),
        (FieldType::Integer | FieldType::Real, FieldValue::Integer(i)) => {
            DbaseFieldValue::Numeric(Some(*i as f64))
        }
        (FieldType::Integer | FieldType::Real, FieldValue::Real(r)) => {
            DbaseFieldValue::Numeric(Some(*r))
        }
        (FieldType::Integer | FieldType::Real, _) => DbaseFieldValue::Numeric(None),
        (FieldType::Text | FieldType::Date, FieldValue::Null) => DbaseFieldValue::Character(None),
        (FieldType::Text | FieldType::Date, other) => {
            DbaseFieldValue::Character(Some(other.to_string()))
        }
    }
}

fn stamp_dbf_date(dbf_path: &Path) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).open(dbf_path)?;
    file.seek(SeekFrom::Start(DBF_DATE_OFFSET))?;
    file.write_all(&DBF_HEADER_DATE)?;
    file.sync_all()
}

impl LayerWriter for ShapefileFormatWriter {
    fn write(&self, path: &Path, layer: &OutputLayer) -> Result<()> {
        let write_failed = |reason: String| SeglabelError::WriteFailed {
            path: path.to_path_buf(),
            reason,
        };

        shapefile_base(path).map_err(|_| write_failed("Not a Shapefile (.shp)".to_string()))?;

        // Convert everything before touching the filesystem
        let builder = Self::table_builder(path, &layer.schema)?;
        let shapes = layer
            .features
            .iter()
            .map(|f| {
                let polygon = Self::to_polygon(path, &f.geometry)?;
                Ok((polygon, Self::to_record(&layer.schema, &f.properties)))
            })
            .collect::<Result<Vec<_>>>()?;

        let staged = StagedLayer::new(path)?;
        {
            let mut writer = shapefile::Writer::from_path(staged.staged_path(), builder)
                .map_err(|e| write_failed(format!("Failed to create Shapefile: {}", e)))?;
            for (polygon, record) in &shapes {
                writer
                    .write_shape_and_record(polygon, record)
                    .map_err(|e| write_failed(format!("Failed to write feature: {}", e)))?;
            }
        }

        stamp_dbf_date(&staged.staged_path().with_extension("dbf"))
            .map_err(|e| write_failed(format!("Failed to finalize .dbf header: {}", e)))?;

        if let Some(wkt) = &layer.crs_wkt {
            fs::write(staged.staged_path().with_extension("prj"), wkt)
                .map_err(|e| write_failed(format!("Failed to write .prj: {}", e)))?;
        }

        staged.commit(&ALL_COMPONENTS, "shp")
    }

    fn supported_extensions(&self) -> &[&str] {
        &["shp"]
    }

    fn format_name(&self) -> &str {
        "Shapefile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFeature;
    use tempfile::TempDir;

    #[test]
    fn test_supported_extensions() {
        assert_eq!(ShapefileFormatReader.supported_extensions(), &["shp"]);
        assert_eq!(ShapefileFormatReader.format_name(), "Shapefile");
    }

    #[test]
    fn test_validation_missing_file() {
        let validation = ShapefileFormatReader.validate(Path::new("/nonexistent/test.shp"));
        assert!(!validation.is_valid());
    }

    #[test]
    fn test_missing_components_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("segments.shp");
        fs::write(&path, b"").unwrap();

        let err = ShapefileFormatReader.read(&path).unwrap_err();
        assert!(matches!(err, SeglabelError::LayerUnreadable { ref reason, .. } if reason.contains(".dbf")));
    }

    #[test]
    fn test_group_rings() {
        let square = vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        let single = group_rings(vec![(true, square.clone())].into_iter()).unwrap();
        assert_eq!(single, Geometry::polygon(vec![square.clone()]));

        let multi =
            group_rings(vec![(true, square.clone()), (false, square.clone()), (true, square.clone())].into_iter())
                .unwrap();
        match multi {
            Geometry::MultiPolygon { coordinates } => {
                assert_eq!(coordinates.len(), 2);
                assert_eq!(coordinates[0].len(), 2);
            }
            other => panic!("expected MultiPolygon, got {:?}", other),
        }

        assert!(group_rings(vec![(false, square)].into_iter()).is_err());
    }

    #[test]
    fn test_dbase_value_mapping() {
        assert_eq!(
            to_dbase_value(FieldType::Integer, &FieldValue::Integer(3)),
            DbaseFieldValue::Numeric(Some(3.0))
        );
        assert_eq!(
            to_dbase_value(FieldType::Text, &FieldValue::from("A")),
            DbaseFieldValue::Character(Some("A".to_string()))
        );
        assert_eq!(to_dbase_value(FieldType::Boolean, &FieldValue::Null), DbaseFieldValue::Logical(None));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labelled.shp");

        let schema = LayerSchema::new(vec![
            FieldDef::new("class", FieldType::Text),
            FieldDef::new("region_id", FieldType::Integer),
        ]);
        let properties: Properties = vec![
            ("class", FieldValue::from("A")),
            ("region_id", FieldValue::Integer(4)),
        ]
        .into_iter()
        .collect();
        let layer = OutputLayer {
            schema,
            crs_wkt: Some("GEOGCS[\"WGS 84\"]".to_string()),
            features: vec![OutputFeature {
                id: 4,
                geometry: Geometry::rectangle([0.0, 0.0], [10.0, 10.0]),
                properties,
            }],
        };

        ShapefileFormatWriter.write(&path, &layer).unwrap();

        let read_back = ShapefileFormatReader.read(&path).unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back.schema.names(), vec!["class", "region_id"]);
        assert_eq!(read_back.crs_wkt.as_deref(), Some("GEOGCS[\"WGS 84\"]"));
        assert_eq!(read_back.features[0].properties.get("class"), Some(&FieldValue::from("A")));
        assert_eq!(read_back.features[0].properties.get("region_id"), Some(&FieldValue::Real(4.0)));
        assert!(read_back.features[0].geometry.is_ok());

        // no staging directory left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".seglabel-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_long_field_name_rejected_before_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.shp");
        let layer = OutputLayer {
            schema: LayerSchema::new(vec![FieldDef::new("a_very_long_field_name", FieldType::Text)]),
            crs_wkt: None,
            features: vec![],
        };

        assert!(ShapefileFormatWriter.write(&path, &layer).is_err());
        assert!(!path.exists());
    }

    fn labelled_layer(crs_wkt: Option<&str>) -> OutputLayer {
        OutputLayer {
            schema: LayerSchema::new(vec![FieldDef::new("class", FieldType::Text)]),
            crs_wkt: crs_wkt.map(str::to_string),
            features: vec![OutputFeature {
                id: 1,
                geometry: Geometry::rectangle([0.0, 0.0], [10.0, 10.0]),
                properties: vec![("class", FieldValue::from("A"))].into_iter().collect(),
            }],
        }
    }

    #[test]
    fn test_dbf_header_date_is_fixed() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.shp");
        let second = dir.path().join("second.shp");

        ShapefileFormatWriter.write(&first, &labelled_layer(None)).unwrap();
        ShapefileFormatWriter.write(&second, &labelled_layer(None)).unwrap();

        let first_dbf = fs::read(first.with_extension("dbf")).unwrap();
        let second_dbf = fs::read(second.with_extension("dbf")).unwrap();
        assert_eq!(&first_dbf[1..4], &DBF_HEADER_DATE);
        assert_eq!(first_dbf, second_dbf);
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_overwrite_without_crs_drops_old_prj() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labelled.shp");

        ShapefileFormatWriter.write(&path, &labelled_layer(Some("PROJCS[\"previous run\"]"))).unwrap();
        assert!(path.with_extension("prj").exists());

        ShapefileFormatWriter.write(&path, &labelled_layer(None)).unwrap();

        assert!(!path.with_extension("prj").exists());
        assert_eq!(ShapefileFormatReader.read(&path).unwrap().crs_wkt, None);
    }
}
