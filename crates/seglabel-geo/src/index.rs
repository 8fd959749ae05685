use rstar::{RTree, RTreeObject, AABB};

use crate::bbox::BoundingBox;

/// Bounding-box index over region ids
///
/// `query` must return every id whose box overlaps the query box, edges
/// included. It may return extra ids; callers refine candidates with an
/// exact containment test.
pub trait SpatialIndex: Send + Sync {
    /// Insert a region's bounding box
    fn insert(&mut self, id: u64, bbox: BoundingBox);

    /// Ids of regions whose bounding box overlaps `bbox`, in ascending order
    fn query(&self, bbox: &BoundingBox) -> Vec<u64>;

    /// Get the total number of regions in the index
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Indexed region id with its envelope
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRegion {
    /// Region identifier
    pub id: u64,

    /// Bounding box for spatial indexing
    envelope: AABB<[f64; 2]>,
}

impl IndexedRegion {
    pub fn new(id: u64, bbox: BoundingBox) -> Self {
        Self { id, envelope: AABB::from_corners(bbox.min, bbox.max) }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.envelope.lower(), self.envelope.upper())
    }
}

impl RTreeObject for IndexedRegion {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree spatial index
#[derive(Debug)]
pub struct RTreeIndex {
    tree: RTree<IndexedRegion>,
}

impl RTreeIndex {
    /// Create a new empty spatial index
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Bulk-load an index from region boxes
    pub fn from_entries(entries: Vec<(u64, BoundingBox)>) -> Self {
        let indexed: Vec<IndexedRegion> =
            entries.into_iter().map(|(id, bbox)| IndexedRegion::new(id, bbox)).collect();

        Self { tree: RTree::bulk_load(indexed) }
    }

    /// Iterate over every indexed region
    pub fn iter(&self) -> impl Iterator<Item = &IndexedRegion> {
        self.tree.iter()
    }
}

impl SpatialIndex for RTreeIndex {
    fn insert(&mut self, id: u64, bbox: BoundingBox) {
        self.tree.insert(IndexedRegion::new(id, bbox));
    }

    fn query(&self, bbox: &BoundingBox) -> Vec<u64> {
        let envelope = AABB::from_corners(bbox.min, bbox.max);
        // `locate_in_envelope` only yields fully contained envelopes
        let mut ids: Vec<u64> =
            self.tree.locate_in_envelope_intersecting(&envelope).map(|r| r.id).collect();
        ids.sort_unstable();
        ids
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

impl Default for RTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating spatial indexes
pub struct SpatialIndexBuilder {
    entries: Vec<(u64, BoundingBox)>,
}

impl SpatialIndexBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Add a region box to the builder
    pub fn add(mut self, id: u64, bbox: BoundingBox) -> Self {
        self.entries.push((id, bbox));
        self
    }

    /// Add multiple region boxes to the builder
    pub fn add_many(mut self, entries: impl IntoIterator<Item = (u64, BoundingBox)>) -> Self {
        self.entries.extend(entries);
        self
    }

    /// Build the spatial index
    pub fn build(self) -> RTreeIndex {
        RTreeIndex::from_entries(self.entries)
    }
}

impl Default for SpatialIndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}
