//! Hierarchical quadkey clustering engine for map point data.
//!
//! Assigns every point entity (bank branch / cash machine location) to a
//! quadkey grid cell at each zoom level of a map and aggregates cells into
//! cluster records (centroid, member count, member list) for rendering
//! aggregated markers at low zoom. Each run is a full recompute committed
//! with clear-before-write semantics.
//!
//! ```rust
//! use quadcluster::{ClusterPipeline, Config, GeoPoint, MemorySink, MemorySource};
//!
//! let source = MemorySource::new(vec![
//!     GeoPoint::new(1, 37.6173, 55.7558),
//!     GeoPoint::new(2, 37.6175, 55.7560),
//! ]);
//! let sink = MemorySink::new();
//! let pipeline = ClusterPipeline::new(Config::default().with_zoom_range(1, 6))?;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let summary = rt.block_on(pipeline.run(&source, &sink))?;
//! assert_eq!(summary.points, 2);
//! # Ok::<(), quadcluster::ClusterError>(())
//! ```

pub mod cluster;
pub mod error;
pub mod pipeline;
pub mod quadkey;
pub mod store;
pub mod subdivide;
pub mod types;

pub use error::{ClusterError, Result};

pub use pipeline::{CellAssignment, ClusterPipeline};

pub use quadkey::{BoundingBox, quadkey_at, quadrant, validate_point};

pub use store::{ClusterSink, MemorySink, MemorySource, PointSource, RegionQuery};

pub use subdivide::SubdivisionClusterer;

pub use types::{ClusterRecord, Config, GeoPoint, MAX_SUPPORTED_ZOOM, RunSummary};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{ClusterError, ClusterPipeline, Config, Result};

    pub use crate::{ClusterRecord, GeoPoint, RunSummary};

    pub use crate::{ClusterSink, MemorySink, MemorySource, PointSource};

    pub use crate::quadkey::{BoundingBox, quadkey_at};
}
