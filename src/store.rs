//! Store abstractions consumed by the clustering engine.
//!
//! The engine never talks to a concrete database; it reads points through
//! [`PointSource`] and commits results through [`ClusterSink`]. In-memory
//! implementations back the test suite and embedded use.

use crate::error::{ClusterError, Result};
use crate::quadkey::BoundingBox;
use crate::types::{ClusterRecord, GeoPoint};
use geo::Point;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Read side: the snapshot of point entities to cluster.
///
/// `iterate` is finite and single-pass; restarting means calling it again.
/// All methods are read-only and safe to call concurrently.
pub trait PointSource: Send + Sync {
    /// Number of points in the snapshot.
    fn count(&self) -> Result<u64>;

    /// Lazy pass over every point in the snapshot.
    fn iterate(&self) -> Result<Box<dyn Iterator<Item = Result<GeoPoint>> + Send + '_>>;

    /// Coordinates of one point by id, for the centroid pass.
    fn coordinates(&self, id: u32) -> Result<Point>;
}

/// Write side: the destination collection for cluster records.
pub trait ClusterSink {
    /// Remove every record in the collection (clear-before-write).
    fn truncate(&self, collection: &str) -> Result<()>;

    /// Append one cluster record to the collection.
    fn insert(&self, collection: &str, record: &ClusterRecord) -> Result<()>;
}

/// Spatial range scan used only by the recursive-subdivision strategy.
///
/// The handle is not reentrant (`&mut self`); concurrent callers must
/// serialize access behind a single lock.
pub trait RegionQuery: Send {
    /// All points whose coordinates fall inside `region`, per
    /// [`BoundingBox::contains`] semantics.
    fn points_in(&mut self, region: &BoundingBox) -> Result<Vec<GeoPoint>>;
}

/// In-memory point snapshot.
#[derive(Debug, Default)]
pub struct MemorySource {
    points: Vec<GeoPoint>,
    by_id: FxHashMap<u32, Point>,
}

impl MemorySource {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        let by_id = points.iter().map(|p| (p.id, p.position)).collect();
        Self { points, by_id }
    }
}

impl PointSource for MemorySource {
    fn count(&self) -> Result<u64> {
        Ok(self.points.len() as u64)
    }

    fn iterate(&self) -> Result<Box<dyn Iterator<Item = Result<GeoPoint>> + Send + '_>> {
        Ok(Box::new(self.points.iter().copied().map(Ok)))
    }

    fn coordinates(&self, id: u32) -> Result<Point> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or_else(|| ClusterError::SourceRead(format!("no point with id {id}")))
    }
}

impl RegionQuery for MemorySource {
    fn points_in(&mut self, region: &BoundingBox) -> Result<Vec<GeoPoint>> {
        Ok(self
            .points
            .iter()
            .filter(|p| region.contains(p.lon(), p.lat()))
            .copied()
            .collect())
    }
}

/// In-memory cluster sink keyed by collection name.
#[derive(Debug, Default)]
pub struct MemorySink {
    collections: Mutex<FxHashMap<String, Vec<ClusterRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one collection's records, for inspection after a run.
    pub fn records(&self, collection: &str) -> Vec<ClusterRecord> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

impl ClusterSink for MemorySink {
    fn truncate(&self, collection: &str) -> Result<()> {
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .clear();
        Ok(())
    }

    fn insert(&self, collection: &str, record: &ClusterRecord) -> Result<()> {
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}
