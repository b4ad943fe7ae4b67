//! Concurrent clustering pipeline.
//!
//! One producer reads the point snapshot and dispatches round-robin into a
//! fixed pool of worker tasks; per-worker output queues are drained into a
//! single merged queue consumed by a streaming aggregator. A oneshot
//! rendezvous hands the finished aggregation map back to the run sequence
//! before the centroid pass starts, so no member list is ever read while a
//! worker is still emitting.
//!
//! All queues are bounded: a full queue suspends its producer and an empty
//! one suspends its consumer. There is no cancellation or timeout tier;
//! any error aborts the whole run.

use crate::cluster::{self, ClusterMap};
use crate::error::{ClusterError, Result};
use crate::quadkey::{quadkey_at, validate_point};
use crate::store::{ClusterSink, PointSource};
use crate::types::{Config, GeoPoint, RunSummary};
use log::{debug, info};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// One `(point, cell, zoom)` assignment flowing worker → aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct CellAssignment {
    pub point_id: u32,
    pub quadkey: String,
    pub zoom: u32,
}

/// The batch clustering pipeline.
///
/// Construction validates the configuration; [`run`](Self::run) performs
/// one full recompute: every point is assigned to its grid cell at every
/// zoom in `[min_zoom, max_zoom)`, cells are aggregated into cluster
/// records, and the destination collection is replaced wholesale.
pub struct ClusterPipeline {
    config: Config,
}

impl ClusterPipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate().map_err(ClusterError::InvalidConfig)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the full batch against `source`, committing into `sink`.
    pub async fn run<S, K>(&self, source: &S, sink: &K) -> Result<RunSummary>
    where
        S: PointSource,
        K: ClusterSink,
    {
        let started = Instant::now();
        let cfg = &self.config;

        let point_count = source.count()?;
        let zoom_span = (cfg.max_zoom - cfg.min_zoom) as u64;
        let expected = point_count * zoom_span;

        // Fan-out/fan-in plumbing. Each worker gets a dedicated bounded
        // input queue and output queue; a drain task per worker forwards
        // into the merged queue. Every drain holds a clone of the merged
        // sender, so the merged queue closes exactly when the last drain
        // finishes and consumers observe "all done" as queue closure.
        let (merged_tx, merged_rx) = mpsc::channel(cfg.queue_capacity * 4);
        let mut inputs = Vec::with_capacity(cfg.worker_count);

        for worker_id in 0..cfg.worker_count {
            let (in_tx, in_rx) = mpsc::channel::<GeoPoint>(cfg.queue_capacity);
            let (out_tx, out_rx) = mpsc::channel::<CellAssignment>(cfg.queue_capacity);
            tokio::spawn(worker_loop(
                worker_id,
                in_rx,
                out_tx,
                cfg.min_zoom,
                cfg.max_zoom,
            ));
            tokio::spawn(drain_loop(out_rx, merged_tx.clone()));
            inputs.push(in_tx);
        }
        drop(merged_tx);
        debug!("{} workers started", cfg.worker_count);

        // Streaming aggregator; the oneshot is the completion barrier.
        let (map_tx, map_rx) = oneshot::channel();
        tokio::spawn(aggregate_loop(merged_rx, expected, map_tx));

        // Single producer, round-robin dispatch. Out-of-range points are a
        // distinct fatal error rather than a silently wrong quadkey.
        let mut dispatched: u64 = 0;
        for entry in source.iterate()? {
            let point = entry?;
            validate_point(point.id, &point.position)?;

            let slot = dispatched as usize % inputs.len();
            inputs[slot]
                .send(point)
                .await
                .map_err(|_| ClusterError::ChannelClosed)?;
            dispatched += 1;
        }
        drop(inputs);
        debug!("all {dispatched} points dispatched");

        let (map, assignments) = map_rx.await.map_err(|_| ClusterError::ChannelClosed)?;

        // Sequential tail: centroid pass, then clear-before-write commit.
        let records = cluster::centroid_pass(source, map)?;
        cluster::write_records(sink, &cfg.cluster_collection, &records)?;

        let summary = RunSummary {
            points: dispatched,
            assignments,
            clusters: records.len() as u64,
            memberships: records.iter().map(|r| u64::from(r.size)).sum(),
            elapsed: started.elapsed(),
        };
        info!(
            "clustering run finished: {} points, {} clusters, {:?}",
            summary.points, summary.clusters, summary.elapsed
        );
        Ok(summary)
    }
}

/// Worker task: encode each point once at the deepest emitted zoom, then
/// emit every prefix in `[min_zoom, max_zoom)`.
///
/// Workers share no mutable state; which worker processes which point is
/// irrelevant as long as each point is processed exactly once.
async fn worker_loop(
    worker_id: usize,
    mut in_rx: mpsc::Receiver<GeoPoint>,
    out_tx: mpsc::Sender<CellAssignment>,
    min_zoom: u32,
    max_zoom: u32,
) {
    debug!("worker {worker_id}: waiting for points");
    while let Some(point) = in_rx.recv().await {
        // The zoom-z key is a prefix of the deepest key by construction.
        let deepest = quadkey_at(&point.position, max_zoom - 1);
        for zoom in min_zoom..max_zoom {
            let assignment = CellAssignment {
                point_id: point.id,
                quadkey: deepest[..zoom as usize].to_string(),
                zoom,
            };
            if out_tx.send(assignment).await.is_err() {
                // Downstream hung up; the run is already aborting.
                return;
            }
        }
    }
    debug!("worker {worker_id}: input closed");
}

/// Drain task: forward one worker's output into the merged queue.
///
/// Dropping the cloned merged sender on return is this drain's completion
/// signal.
async fn drain_loop(mut out_rx: mpsc::Receiver<CellAssignment>, merged_tx: mpsc::Sender<CellAssignment>) {
    while let Some(assignment) = out_rx.recv().await {
        if merged_tx.send(assignment).await.is_err() {
            return;
        }
    }
}

/// Aggregator task: the only owner of the quadkey → members map.
///
/// Consumes the merged queue until closure, then hands the finished map
/// through the oneshot rendezvous. Logs progress at whole-percent steps
/// against the expected assignment total.
async fn aggregate_loop(
    mut merged_rx: mpsc::Receiver<CellAssignment>,
    expected: u64,
    done: oneshot::Sender<(ClusterMap, u64)>,
) {
    let mut map = ClusterMap::default();
    let mut seen: u64 = 0;
    let mut last_percent: u64 = 0;

    while let Some(assignment) = merged_rx.recv().await {
        map.entry(assignment.quadkey)
            .or_default()
            .push(assignment.point_id);
        seen += 1;

        if expected > 0 {
            let percent = seen * 100 / expected;
            if percent > last_percent {
                last_percent = percent;
                info!("[{percent:3}%] clustering done");
            }
        }
    }

    debug!("aggregated {seen} assignments into {} cells", map.len());
    // The receiver is gone only if the run already failed.
    let _ = done.send((map, seen));
}
