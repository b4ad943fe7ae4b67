//! Error types for the clustering engine.
//!
//! Every variant is fatal to the run in progress: the engine performs
//! all-or-nothing batch recomputes and keeps no partial results.

use thiserror::Error;

/// Errors produced by the clustering engine.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Failure counting, iterating, or looking up points in the source store.
    #[error("source read error: {0}")]
    SourceRead(String),

    /// Failure truncating the destination collection or inserting a record.
    ///
    /// The destination may be left truncated or partially written; a retry
    /// must start from the truncate step again.
    #[error("sink write error: {0}")]
    SinkWrite(String),

    /// A point whose coordinates lie outside the world extent
    /// `[-180, 180] x [-85, 85]` or are not finite.
    #[error("point {id} outside world extent: lon = {lon}, lat = {lat}")]
    PointOutOfRange { id: u32, lon: f64, lat: f64 },

    /// Rejected configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pipeline queue closed while its producer was still live.
    #[error("pipeline channel closed unexpectedly")]
    ChannelClosed,
}

/// Result type alias using [`ClusterError`].
pub type Result<T> = std::result::Result<T, ClusterError>;
