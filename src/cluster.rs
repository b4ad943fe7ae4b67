//! Cluster assembly: centroid pass and sink writer.
//!
//! Both stages run sequentially on the invoking task, strictly after the
//! aggregation map is complete.

use crate::error::Result;
use crate::store::{ClusterSink, PointSource};
use crate::types::ClusterRecord;
use geo::Point;
use log::{debug, info};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Quadkey to member point ids, as assembled by the aggregator.
///
/// A key is only present once it has at least one member.
pub type ClusterMap = FxHashMap<String, SmallVec<[u32; 4]>>;

/// Turn the aggregation map into finished records.
///
/// Re-fetches each member's coordinates from the source snapshot and
/// computes the arithmetic-mean centroid; one lookup per membership edge,
/// so the cost is proportional to the sum of cluster sizes, not the point
/// count.
pub fn centroid_pass<S>(source: &S, map: ClusterMap) -> Result<Vec<ClusterRecord>>
where
    S: PointSource + ?Sized,
{
    let mut records = Vec::with_capacity(map.len());

    for (quadkey, members) in map {
        let mut sum_lon = 0.0;
        let mut sum_lat = 0.0;
        for &id in &members {
            let position = source.coordinates(id)?;
            sum_lon += position.x();
            sum_lat += position.y();
        }

        // The map never holds an empty member list.
        let count = members.len() as f64;
        let centroid = Point::new(sum_lon / count, sum_lat / count);
        records.push(ClusterRecord::new(quadkey, centroid, members.into_vec()));
    }

    debug!("centroid pass produced {} records", records.len());
    Ok(records)
}

/// Commit records to the destination collection, clear-before-write.
///
/// A run that fails partway leaves the collection truncated or partially
/// written; retrying re-truncates. Any write failure aborts immediately.
pub fn write_records<K>(sink: &K, collection: &str, records: &[ClusterRecord]) -> Result<()>
where
    K: ClusterSink + ?Sized,
{
    sink.truncate(collection)?;

    for record in records {
        sink.insert(collection, record)?;
    }

    info!("wrote {} cluster records to '{collection}'", records.len());
    Ok(())
}
