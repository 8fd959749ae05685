//! Schema merge and output record construction

use seglabel_core::models::{FieldDef, FieldType, FieldValue, LayerSchema, OutputFeature, Properties};
use seglabel_geo::GeometryEngine;

use crate::store::GeometryStore;
use crate::validator::Validation;

/// Merged output schema and how it was formed
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSchema {
    pub schema: LayerSchema,

    /// The designated field name was already a region field; the region
    /// value is kept and the resolved value is not propagated
    pub designated_collision: bool,

    /// Whether the region id attribute was appended to the schema
    pub id_field_appended: bool,

    designated_field: String,
    id_output_field: String,
    region_fields: LayerSchema,
}

pub struct SchemaMerger;

impl SchemaMerger {
    /// Region fields in order, then point fields the region layer lacks,
    /// then the region id attribute if no field already has its name.
    pub fn merge(
        region: &LayerSchema,
        point: &LayerSchema,
        designated_field: &str,
        id_output_field: &str,
    ) -> MergedSchema {
        let mut schema = region.clone();

        for field in point.iter() {
            schema.push(field.clone());
        }

        // Present even when the point layer never declared it
        schema.push(FieldDef::new(designated_field, FieldType::Text));

        let designated_collision = region.contains(designated_field);
        if designated_collision {
            tracing::warn!(
                field = designated_field,
                "Designated field collides with a region field; keeping region values"
            );
        }

        let id_field_appended = schema.push(FieldDef::new(id_output_field, FieldType::Integer));

        MergedSchema {
            schema,
            designated_collision,
            id_field_appended,
            designated_field: designated_field.to_string(),
            id_output_field: id_output_field.to_string(),
            region_fields: region.clone(),
        }
    }

    /// One record per validated region, in region-layer order
    pub fn build_records<E: GeometryEngine>(
        store: &GeometryStore<E>,
        validation: &Validation,
        merged: &MergedSchema,
    ) -> Vec<OutputFeature> {
        store
            .regions()
            .filter_map(|region| {
                let validated = validation.get(region.id)?;

                let properties = merged
                    .schema
                    .iter()
                    .map(|field| {
                        let name = field.name.as_str();
                        let value = if merged.region_fields.contains(name) {
                            region.properties.get(name).cloned().unwrap_or(FieldValue::Null)
                        } else if name == merged.designated_field {
                            validated.value.clone()
                        } else if merged.id_field_appended && name == merged.id_output_field {
                            FieldValue::Integer(region.id as i64)
                        } else {
                            validated
                                .first_match
                                .properties
                                .get(name)
                                .cloned()
                                .unwrap_or(FieldValue::Null)
                        };
                        (field.name.clone(), value)
                    })
                    .collect::<Properties>();

                Some(OutputFeature { id: region.id, geometry: region.geometry.clone(), properties })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: &[(&str, FieldType)]) -> LayerSchema {
        LayerSchema::new(fields.iter().map(|(n, t)| FieldDef::new(*n, *t)).collect())
    }

    #[test]
    fn test_merge_order() {
        let region = schema(&[("DN", FieldType::Integer), ("area", FieldType::Real)]);
        let point = schema(&[("class", FieldType::Text), ("area", FieldType::Text), ("obs", FieldType::Date)]);

        let merged = SchemaMerger::merge(&region, &point, "class", "region_id");

        assert_eq!(merged.schema.names(), vec!["DN", "area", "class", "obs", "region_id"]);
        // region declaration wins
        assert_eq!(merged.schema.field("area").unwrap().field_type, FieldType::Real);
        assert!(!merged.designated_collision);
        assert!(merged.id_field_appended);
    }

    #[test]
    fn test_designated_collision_flagged() {
        let region = schema(&[("class", FieldType::Integer)]);
        let point = schema(&[("class", FieldType::Text)]);

        let merged = SchemaMerger::merge(&region, &point, "class", "region_id");

        assert!(merged.designated_collision);
        assert_eq!(merged.schema.field("class").unwrap().field_type, FieldType::Integer);
        assert_eq!(merged.schema.names(), vec!["class", "region_id"]);
    }

    #[test]
    fn test_designated_type_follows_point_layer() {
        let merged = SchemaMerger::merge(
            &LayerSchema::default(),
            &schema(&[("code", FieldType::Integer)]),
            "code",
            "region_id",
        );
        assert_eq!(merged.schema.field("code").unwrap().field_type, FieldType::Integer);

        let undeclared = SchemaMerger::merge(&LayerSchema::default(), &LayerSchema::default(), "code", "region_id");
        assert_eq!(undeclared.schema.field("code").unwrap().field_type, FieldType::Text);
    }

    #[test]
    fn test_existing_id_field_not_duplicated() {
        let region = schema(&[("region_id", FieldType::Integer)]);
        let merged = SchemaMerger::merge(&region, &schema(&[("class", FieldType::Text)]), "class", "region_id");

        assert!(!merged.id_field_appended);
        assert_eq!(merged.schema.names(), vec!["region_id", "class"]);
    }
}
