//! Region storage for the build phase

use std::collections::{HashMap, HashSet};

use seglabel_core::error::{GeometryError, LayerKind, Result, SeglabelError};
use seglabel_core::models::{FieldValue, Geometry, LayerFeature, LayerSchema, Properties, VectorLayer};
use seglabel_geo::{BoundingBox, GeometryEngine, PlanarEngine, RTreeIndex, SpatialIndex, SpatialIndexBuilder};

/// Where a region's integer id is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionIdSource {
    /// A named attribute of the region layer
    Field(String),

    /// The feature id, falling back to the zero-based record index
    FeatureId,
}

impl RegionIdSource {
    pub fn from_option(field: Option<&str>) -> Self {
        match field {
            Some(name) => RegionIdSource::Field(name.to_string()),
            None => RegionIdSource::FeatureId,
        }
    }

    /// Check that the source can be used with a layer schema
    pub fn check_schema(&self, schema: &LayerSchema) -> Result<()> {
        match self {
            RegionIdSource::Field(name) if !schema.contains(name) => {
                Err(SeglabelError::ConfigInvalid {
                    key: "region_id_field".to_string(),
                    reason: format!(
                        "field '{}' not found in region layer (available: {})",
                        name,
                        schema.names().join(", ")
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    /// Resolve the id of a region feature
    pub fn resolve(&self, feature: &LayerFeature) -> Result<u64> {
        let invalid = |reason: String| SeglabelError::InvalidRegionId {
            feature_id: feature.display_id(),
            reason,
        };

        match self {
            RegionIdSource::Field(name) => match feature.properties.get(name) {
                Some(value) => id_from_value(value).map_err(invalid),
                None => Err(invalid(format!("field '{}' is missing", name))),
            },
            RegionIdSource::FeatureId => match &feature.id {
                Some(id) => parse_id(id).map_err(invalid),
                None => Ok(feature.index as u64),
            },
        }
    }
}

fn parse_id(text: &str) -> std::result::Result<u64, String> {
    match text.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n as u64),
        Ok(n) => Err(format!("{} is negative", n)),
        Err(_) => Err(format!("'{}' is not an integer", text)),
    }
}

fn id_from_value(value: &FieldValue) -> std::result::Result<u64, String> {
    match value {
        FieldValue::Integer(n) if *n >= 0 => Ok(*n as u64),
        FieldValue::Integer(n) => Err(format!("{} is negative", n)),
        // dBase numeric columns are decoded as reals
        FieldValue::Real(r) if r.is_finite() && r.fract() == 0.0 && *r >= 0.0 && *r <= i64::MAX as f64 => {
            Ok(*r as u64)
        }
        FieldValue::Real(r) => Err(format!("{} is not a non-negative integer", r)),
        FieldValue::Text(s) => parse_id(s),
        FieldValue::Null => Err("value is null".to_string()),
        FieldValue::Boolean(b) => Err(format!("{} is not an integer", b)),
    }
}

/// A loaded region
#[derive(Debug, Clone)]
pub struct StoredRegion<S> {
    pub id: u64,
    pub geometry: Geometry,
    pub properties: Properties,
    shape: S,
    bbox: BoundingBox,
}

impl<S> StoredRegion<S> {
    /// Engine form of the geometry
    pub fn shape(&self) -> &S {
        &self.shape
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

/// Regions keyed by id, kept in region-layer order
pub struct GeometryStore<E: GeometryEngine = PlanarEngine> {
    engine: E,
    regions: Vec<StoredRegion<E::Shape>>,
    positions: HashMap<u64, usize>,
    schema: LayerSchema,
    crs_wkt: Option<String>,
    skipped: Vec<GeometryError>,
}

impl<E: GeometryEngine> GeometryStore<E> {
    /// Load every region of `layer` in a single pass.
    ///
    /// Fails on the first duplicate or invalid id. Regions whose geometry
    /// cannot be used are skipped and recorded in `skipped()`, but their ids
    /// still take part in duplicate detection.
    pub fn load(layer: VectorLayer, engine: E, ids: &RegionIdSource) -> Result<Self> {
        ids.check_schema(&layer.schema)?;

        let mut seen = HashSet::with_capacity(layer.len());
        let mut regions = Vec::with_capacity(layer.len());
        let mut positions = HashMap::with_capacity(layer.len());
        let mut skipped = Vec::new();

        for feature in layer.features {
            let id = ids.resolve(&feature)?;
            if !seen.insert(id) {
                return Err(SeglabelError::DuplicateRegionId { id });
            }

            let prepared = feature.geometry.clone().and_then(|geometry| {
                let shape = engine.prepare(&geometry)?;
                let bbox = engine
                    .bounding_box(&shape)
                    .ok_or_else(|| "geometry has no extent".to_string())?;
                Ok((geometry, shape, bbox))
            });

            match prepared {
                Ok((geometry, shape, bbox)) => {
                    positions.insert(id, regions.len());
                    regions.push(StoredRegion {
                        id,
                        geometry,
                        properties: feature.properties,
                        shape,
                        bbox,
                    });
                }
                Err(reason) => {
                    let error = GeometryError::new(LayerKind::Region, feature.display_id(), reason);
                    tracing::warn!("{}", error);
                    skipped.push(error);
                }
            }
        }

        tracing::debug!(
            regions = regions.len(),
            skipped = skipped.len(),
            "Loaded region layer '{}'",
            layer.name
        );

        Ok(Self {
            engine,
            regions,
            positions,
            schema: layer.schema,
            crs_wkt: layer.crs_wkt,
            skipped,
        })
    }

    /// Look up a region by id
    pub fn get(&self, id: u64) -> Option<&StoredRegion<E::Shape>> {
        self.positions.get(&id).map(|&position| &self.regions[position])
    }

    /// Exact, boundary-inclusive containment test against region `id`
    pub fn contains(&self, id: u64, point: [f64; 2]) -> bool {
        self.get(id)
            .map(|region| self.engine.contains(region.shape(), point))
            .unwrap_or(false)
    }

    /// Regions in region-layer order
    pub fn regions(&self) -> impl Iterator<Item = &StoredRegion<E::Shape>> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region layer field list, in original order
    pub fn schema(&self) -> &LayerSchema {
        &self.schema
    }

    pub fn crs_wkt(&self) -> Option<&str> {
        self.crs_wkt.as_deref()
    }

    /// Regions skipped for malformed geometry
    pub fn skipped(&self) -> &[GeometryError] {
        &self.skipped
    }

    /// Bulk-load an R-tree over every stored region
    pub fn build_index(&self) -> RTreeIndex {
        SpatialIndexBuilder::new()
            .add_many(self.regions.iter().map(|r| (r.id, r.bbox)))
            .build()
    }

    /// Insert every stored region into an existing index
    pub fn fill_index<I: SpatialIndex>(&self, index: &mut I) {
        for region in &self.regions {
            index.insert(region.id, region.bbox);
        }
    }
}
