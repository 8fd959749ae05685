//! GeoJSON format reader and writer
//!
//! The writer records the layer schema in a `fields` foreign member of the
//! FeatureCollection so that the field list survives even when the
//! collection is empty. The reader honours that member when present and
//! otherwise infers the schema from the features.

use std::fs;
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};

use crate::error::{Result, SeglabelError};
use crate::formats::atomic::write_atomic;
use crate::formats::validation::FormatValidator;
use crate::formats::{FormatValidation, LayerReader, LayerWriter};
use crate::models::{
    FieldDef, FieldType, FieldValue, Geometry, LayerFeature, LayerSchema, OutputLayer, Properties,
    VectorLayer,
};

/// Foreign member carrying the declared schema
pub const SCHEMA_MEMBER: &str = "fields";

/// GeoJSON format reader
pub struct GeoJsonReader;

impl LayerReader for GeoJsonReader {
    fn read(&self, path: &Path) -> Result<VectorLayer> {
        let unreadable = |reason: String| SeglabelError::LayerUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;

        let geojson: GeoJson = content
            .parse()
            .map_err(|e| unreadable(format!("Failed to parse GeoJSON: {}", e)))?;

        let (features, declared) = match geojson {
            GeoJson::FeatureCollection(fc) => {
                let declared = match fc.foreign_members.as_ref().and_then(|m| m.get(SCHEMA_MEMBER))
                {
                    Some(value) => Some(
                        serde_json::from_value::<LayerSchema>(value.clone())
                            .map_err(|e| unreadable(format!("Invalid '{}' member: {}", SCHEMA_MEMBER, e)))?,
                    ),
                    None => None,
                };
                (fc.features, declared)
            }
            GeoJson::Feature(feature) => (vec![feature], None),
            GeoJson::Geometry(geometry) => (
                vec![Feature {
                    bbox: None,
                    geometry: Some(geometry),
                    id: None,
                    properties: None,
                    foreign_members: None,
                }],
                None,
            ),
        };

        let schema = match declared {
            Some(schema) => schema,
            None => infer_schema(&features),
        };

        let features = features
            .iter()
            .enumerate()
            .map(|(index, feature)| convert_feature(feature, index, &schema))
            .collect();

        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed").to_string();

        Ok(VectorLayer {
            name,
            format: "GeoJSON".to_string(),
            schema,
            crs_wkt: None,
            features,
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["geojson", "json"]
    }

    fn format_name(&self) -> &str {
        "GeoJSON"
    }

    fn validate(&self, path: &Path) -> FormatValidation {
        let mut validation = FormatValidator::validate_file_exists(path);
        if !validation.is_valid() {
            return validation;
        }

        match fs::read_to_string(path) {
            Ok(content) => match content.parse::<GeoJson>() {
                Ok(GeoJson::FeatureCollection(_)) => {}
                Ok(_) => validation
                    .warnings
                    .push("Not a FeatureCollection; reading as a single feature".to_string()),
                Err(e) => validation.errors.push(format!("Invalid GeoJSON: {}", e)),
            },
            Err(e) => validation.errors.push(format!("Cannot read file: {}", e)),
        }

        validation
    }
}

/// Infer an ordered schema from feature properties.
///
/// Fields appear in first-seen order. A field's type comes from its
/// non-null values; Integer and Real widen to Real, any other disagreement
/// (or a field that is always null) declares Text.
pub fn infer_schema(features: &[Feature]) -> LayerSchema {
    let mut observed: Vec<(String, Option<FieldType>, bool)> = Vec::new();

    for properties in features.iter().filter_map(|f| f.properties.as_ref()) {
        for (name, value) in properties {
            let value_type = FieldValue::from_json(value).observed_type();
            match observed.iter_mut().find(|(n, _, _)| n == name) {
                Some((_, current, conflicted)) => {
                    if let Some(value_type) = value_type {
                        *current = match *current {
                            None => Some(value_type),
                            Some(existing) => match existing.unify(value_type) {
                                Some(unified) => Some(unified),
                                None => {
                                    *conflicted = true;
                                    Some(existing)
                                }
                            },
                        };
                    }
                }
                None => observed.push((name.clone(), value_type, false)),
            }
        }
    }

    LayerSchema::new(
        observed
            .into_iter()
            .map(|(name, field_type, conflicted)| {
                let field_type =
                    if conflicted { FieldType::Text } else { field_type.unwrap_or(FieldType::Text) };
                FieldDef::new(name, field_type)
            })
            .collect(),
    )
}

fn convert_feature(feature: &Feature, index: usize, schema: &LayerSchema) -> LayerFeature {
    let id = feature.id.as_ref().map(|id| match id {
        geojson::feature::Id::String(s) => s.clone(),
        geojson::feature::Id::Number(n) => n.to_string(),
    });

    let geometry = match &feature.geometry {
        Some(geometry) => geometry_from_value(&geometry.value),
        None => Err("missing geometry".to_string()),
    };

    // Schema order first, then any extra members the schema does not declare
    let mut properties = Properties::new();
    if let Some(members) = feature.properties.as_ref() {
        for field in schema.iter() {
            let value = members.get(&field.name).map(FieldValue::from_json).unwrap_or(FieldValue::Null);
            properties.insert(field.name.clone(), value);
        }
        for (name, value) in members {
            properties.insert_if_absent(name.clone(), FieldValue::from_json(value));
        }
    } else {
        for field in schema.iter() {
            properties.insert(field.name.clone(), FieldValue::Null);
        }
    }

    LayerFeature { index, id, geometry, properties }
}

fn position(pos: &[f64]) -> std::result::Result<[f64; 2], String> {
    match pos {
        [x, y, ..] => Ok([*x, *y]),
        _ => Err(format!("position has {} ordinates, expected at least 2", pos.len())),
    }
}

fn rings(rings: &[Vec<Vec<f64>>]) -> std::result::Result<Vec<Vec<[f64; 2]>>, String> {
    rings
        .iter()
        .map(|ring| ring.iter().map(|p| position(p)).collect::<std::result::Result<Vec<_>, String>>())
        .collect()
}

/// Decode a GeoJSON geometry value into the canonical model
pub fn geometry_from_value(value: &geojson::Value) -> std::result::Result<Geometry, String> {
    match value {
        geojson::Value::Point(pos) => {
            let [x, y] = position(pos)?;
            Ok(Geometry::point(x, y))
        }
        geojson::Value::Polygon(poly) => Ok(Geometry::polygon(rings(poly)?)),
        geojson::Value::MultiPolygon(polys) => Ok(Geometry::multi_polygon(
            polys.iter().map(|p| rings(p)).collect::<std::result::Result<_, _>>()?,
        )),
        geojson::Value::MultiPoint(_) => Err("unsupported geometry type MultiPoint".to_string()),
        geojson::Value::LineString(_) => Err("unsupported geometry type LineString".to_string()),
        geojson::Value::MultiLineString(_) => {
            Err("unsupported geometry type MultiLineString".to_string())
        }
        geojson::Value::GeometryCollection(_) => {
            Err("unsupported geometry type GeometryCollection".to_string())
        }
    }
}

/// Encode a canonical geometry as a GeoJSON geometry value
pub fn geometry_to_value(geometry: &Geometry) -> geojson::Value {
    let ring = |ring: &Vec<[f64; 2]>| ring.iter().map(|p| p.to_vec()).collect::<Vec<_>>();
    match geometry {
        Geometry::Point { coordinates } => geojson::Value::Point(coordinates.to_vec()),
        Geometry::Polygon { coordinates } => {
            geojson::Value::Polygon(coordinates.iter().map(ring).collect())
        }
        Geometry::MultiPolygon { coordinates } => geojson::Value::MultiPolygon(
            coordinates.iter().map(|poly| poly.iter().map(ring).collect()).collect(),
        ),
    }
}

/// GeoJSON format writer
pub struct GeoJsonWriter;

impl GeoJsonWriter {
    /// Build the FeatureCollection for a layer.
    ///
    /// Only schema fields are written, in schema order; fields a feature
    /// does not carry are written as null.
    pub fn to_feature_collection(layer: &OutputLayer) -> Result<FeatureCollection> {
        let features = layer
            .features
            .iter()
            .map(|feature| {
                let mut properties = JsonObject::new();
                for field in layer.schema.iter() {
                    let value = feature
                        .properties
                        .get(&field.name)
                        .map(FieldValue::to_json)
                        .unwrap_or(serde_json::Value::Null);
                    properties.insert(field.name.clone(), value);
                }

                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geometry_to_value(&feature.geometry))),
                    id: Some(geojson::feature::Id::Number(feature.id.into())),
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let schema = serde_json::to_value(&layer.schema)
            .map_err(|e| SeglabelError::Serialization(format!("Failed to encode schema: {}", e)))?;
        let mut foreign_members = JsonObject::new();
        foreign_members.insert(SCHEMA_MEMBER.to_string(), schema);

        Ok(FeatureCollection { bbox: None, features, foreign_members: Some(foreign_members) })
    }
}

impl LayerWriter for GeoJsonWriter {
    fn write(&self, path: &Path, layer: &OutputLayer) -> Result<()> {
        let collection = Self::to_feature_collection(layer)?;

        write_atomic(path, |w| {
            serde_json::to_writer_pretty(&mut *w, &collection)
                .map_err(|e| SeglabelError::Serialization(e.to_string()))?;
            writeln!(w)?;
            Ok(())
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["geojson", "json"]
    }

    fn format_name(&self) -> &str {
        "GeoJSON"
    }
}
