//! Recursive-subdivision clustering strategy.
//!
//! Instead of streaming points through the worker pipeline, this strategy
//! descends the quadkey grid top-down: each region task range-scans the
//! source for the points inside its cell, emits a cluster record, and
//! splits into four child cells until the zoom bound. Empty cells prune
//! the recursion, so sparse regions cost a single query.
//!
//! The range-query handle is not reentrant, so every scan from every
//! concurrent region task passes through one shared lock. That
//! serialization is the accepted throughput ceiling of this strategy; the
//! cells themselves are processed concurrently up to a split budget.

use crate::error::{ClusterError, Result};
use crate::quadkey::BoundingBox;
use crate::store::RegionQuery;
use crate::types::{ClusterRecord, Config};
use geo::Point;
use log::debug;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Concurrent region tasks allowed near the top of the recursion; each
/// split divides the remaining budget among the four children, below which
/// children are processed inline.
const SPLIT_BUDGET: usize = 5;

/// Clusterer over a range-queryable source.
pub struct SubdivisionClusterer<Q> {
    query: Arc<Mutex<Q>>,
    config: Config,
}

impl<Q> SubdivisionClusterer<Q>
where
    Q: RegionQuery + 'static,
{
    pub fn new(query: Q, config: Config) -> Result<Self> {
        config.validate().map_err(ClusterError::InvalidConfig)?;
        Ok(Self {
            query: Arc::new(Mutex::new(query)),
            config,
        })
    }

    /// Compute cluster records for every non-empty cell with zoom in
    /// `[min_zoom, max_zoom)`, starting from the world extent.
    pub async fn run(&self) -> Result<Vec<ClusterRecord>> {
        let (tx, mut rx) = mpsc::channel(self.config.queue_capacity);

        let root = RegionTask {
            bounds: BoundingBox::world(),
            quadkey: String::new(),
        };
        let worker = tokio::spawn(subdivide(
            Arc::clone(&self.query),
            root,
            self.config.min_zoom,
            self.config.max_zoom,
            SPLIT_BUDGET,
            tx,
        ));

        // Collect concurrently so bounded sends never back up on us.
        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }

        worker
            .await
            .map_err(|e| ClusterError::SourceRead(format!("region task aborted: {e}")))??;

        debug!("subdivision produced {} records", records.len());
        Ok(records)
    }
}

struct RegionTask {
    bounds: BoundingBox,
    quadkey: String,
}

fn subdivide<Q>(
    query: Arc<Mutex<Q>>,
    region: RegionTask,
    min_zoom: u32,
    max_zoom: u32,
    budget: usize,
    tx: mpsc::Sender<ClusterRecord>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
where
    Q: RegionQuery + 'static,
{
    Box::pin(async move {
        // Serialized scan; the guard must not be held across an await.
        let points = { query.lock().points_in(&region.bounds)? };
        if points.is_empty() {
            return Ok(());
        }

        let zoom = region.quadkey.len() as u32;
        if zoom >= min_zoom {
            let mut sum_lon = 0.0;
            let mut sum_lat = 0.0;
            let mut members = Vec::with_capacity(points.len());
            for point in &points {
                sum_lon += point.lon();
                sum_lat += point.lat();
                members.push(point.id);
            }
            let count = points.len() as f64;
            let centroid = Point::new(sum_lon / count, sum_lat / count);

            tx.send(ClusterRecord::new(region.quadkey.clone(), centroid, members))
                .await
                .map_err(|_| ClusterError::ChannelClosed)?;
        }

        if zoom + 1 >= max_zoom {
            return Ok(());
        }

        let child_budget = budget / 4;
        let mut handles = Vec::new();
        for (digit, bounds) in region.bounds.split() {
            let child = RegionTask {
                bounds,
                quadkey: format!("{}{}", region.quadkey, digit),
            };
            if child_budget > 0 {
                handles.push(tokio::spawn(subdivide(
                    Arc::clone(&query),
                    child,
                    min_zoom,
                    max_zoom,
                    child_budget,
                    tx.clone(),
                )));
            } else {
                subdivide(
                    Arc::clone(&query),
                    child,
                    min_zoom,
                    max_zoom,
                    0,
                    tx.clone(),
                )
                .await?;
            }
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| ClusterError::SourceRead(format!("region task aborted: {e}")))??;
        }

        Ok(())
    })
}
