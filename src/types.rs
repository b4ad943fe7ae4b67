//! Core data types and configuration for the clustering engine.

use geo::Point;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deepest zoom the codec supports; beyond this the f64 cell edges stop
/// resolving distinct digits for real-world coordinate spacing.
pub const MAX_SUPPORTED_ZOOM: u32 = 23;

/// A point entity (bank branch or cash machine location).
///
/// Ids are externally assigned and unique; the point set is loaded once as
/// an immutable snapshot for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub id: u32,
    /// Position with x = longitude, y = latitude.
    pub position: Point,
}

impl GeoPoint {
    pub fn new(id: u32, lon: f64, lat: f64) -> Self {
        Self {
            id,
            position: Point::new(lon, lat),
        }
    }

    pub fn lon(&self) -> f64 {
        self.position.x()
    }

    pub fn lat(&self) -> f64 {
        self.position.y()
    }
}

/// An aggregated cluster for one grid cell.
///
/// Built once per run per quadkey with at least one member, then owned
/// exclusively by the sink writer. `zoom` always equals the quadkey
/// length and `size` the member count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub quadkey: String,
    pub zoom: u32,
    /// Arithmetic-mean centroid of the members (x = longitude, y = latitude).
    pub centroid: Point,
    /// Member point ids; insertion order carries no semantics.
    pub members: Vec<u32>,
    pub size: u32,
}

impl ClusterRecord {
    /// Build a record from a quadkey, its centroid, and a non-empty member list.
    pub fn new(quadkey: String, centroid: Point, members: Vec<u32>) -> Self {
        let zoom = quadkey.len() as u32;
        let size = members.len() as u32;
        Self {
            quadkey,
            zoom,
            centroid,
            members,
            size,
        }
    }
}

/// Clustering engine configuration.
///
/// Serializable with per-field defaults so partial JSON documents load
/// cleanly.
///
/// # Example
///
/// ```rust
/// use quadcluster::Config;
///
/// let config = Config::default();
/// assert_eq!(config.worker_count, 4);
///
/// let json = r#"{ "min_zoom": 8, "max_zoom": 14 }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.min_zoom, 8);
/// assert_eq!(config.queue_capacity, 512);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Shallowest zoom level to emit assignments for (inclusive).
    #[serde(default = "Config::default_min_zoom")]
    pub min_zoom: u32,

    /// Zoom bound (exclusive); assignments cover `[min_zoom, max_zoom)`.
    #[serde(default = "Config::default_max_zoom")]
    pub max_zoom: u32,

    /// Number of worker tasks in the pool.
    #[serde(default = "Config::default_worker_count")]
    pub worker_count: usize,

    /// Capacity of each bounded pipeline queue.
    #[serde(default = "Config::default_queue_capacity")]
    pub queue_capacity: usize,

    /// Destination collection receiving the cluster records.
    #[serde(default = "Config::default_cluster_collection")]
    pub cluster_collection: String,
}

impl Config {
    const fn default_min_zoom() -> u32 {
        10
    }

    const fn default_max_zoom() -> u32 {
        16
    }

    const fn default_worker_count() -> usize {
        4
    }

    const fn default_queue_capacity() -> usize {
        512
    }

    fn default_cluster_collection() -> String {
        "clusters".to_string()
    }

    /// Configure the emitted zoom range `[min_zoom, max_zoom)`.
    pub fn with_zoom_range(mut self, min_zoom: u32, max_zoom: u32) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_cluster_collection(mut self, collection: impl Into<String>) -> Self {
        self.cluster_collection = collection.into();
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_zoom <= self.min_zoom {
            return Err(format!(
                "max_zoom ({}) must be greater than min_zoom ({})",
                self.max_zoom, self.min_zoom
            ));
        }

        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(format!(
                "max_zoom must be at most {}, got {}",
                MAX_SUPPORTED_ZOOM, self.max_zoom
            ));
        }

        if self.worker_count == 0 {
            return Err("worker_count must be at least 1".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("queue_capacity must be at least 1".to_string());
        }

        if self.cluster_collection.is_empty() {
            return Err("cluster_collection must not be empty".to_string());
        }

        Ok(())
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from a TOML string (requires the `toml` feature).
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as a TOML string (requires the `toml` feature).
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_zoom: Self::default_min_zoom(),
            max_zoom: Self::default_max_zoom(),
            worker_count: Self::default_worker_count(),
            queue_capacity: Self::default_queue_capacity(),
            cluster_collection: Self::default_cluster_collection(),
        }
    }
}

/// Statistics for one completed clustering run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Points read from the source snapshot.
    pub points: u64,
    /// `(point, quadkey, zoom)` assignments that passed through the pipeline.
    pub assignments: u64,
    /// Cluster records written to the sink.
    pub clusters: u64,
    /// Total memberships across all records; can exceed `points` since each
    /// point contributes once per zoom level.
    pub memberships: u64,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.min_zoom, 10);
        assert_eq!(config.max_zoom, 16);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.queue_capacity, 512);
        assert_eq!(config.cluster_collection, "clusters");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builders() {
        let config = Config::default()
            .with_zoom_range(2, 6)
            .with_worker_count(8)
            .with_queue_capacity(64)
            .with_cluster_collection("atm_clusters");

        assert_eq!(config.min_zoom, 2);
        assert_eq!(config.max_zoom, 6);
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.cluster_collection, "atm_clusters");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default().with_zoom_range(10, 10);
        assert!(config.validate().is_err());

        let config = Config::default().with_zoom_range(12, 10);
        assert!(config.validate().is_err());

        let config = Config::default().with_zoom_range(1, MAX_SUPPORTED_ZOOM + 1);
        assert!(config.validate().is_err());

        let config = Config::default().with_worker_count(0);
        assert!(config.validate().is_err());

        let config = Config::default().with_queue_capacity(0);
        assert!(config.validate().is_err());

        let config = Config::default().with_cluster_collection("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config::default()
            .with_zoom_range(4, 12)
            .with_worker_count(2);

        let json = config.to_json().unwrap();
        let parsed = Config::from_json(&json).unwrap();

        assert_eq!(parsed.min_zoom, 4);
        assert_eq!(parsed.max_zoom, 12);
        assert_eq!(parsed.worker_count, 2);
    }

    #[test]
    fn test_config_json_rejects_invalid() {
        let json = r#"{ "min_zoom": 12, "max_zoom": 10 }"#;
        assert!(Config::from_json(json).is_err());
    }

    #[test]
    fn test_cluster_record_derived_fields() {
        let record =
            ClusterRecord::new("3120".to_string(), Point::new(10.0, 20.0), vec![5, 9, 12]);
        assert_eq!(record.zoom, 4);
        assert_eq!(record.size, 3);
    }

    #[test]
    fn test_geo_point_accessors() {
        let point = GeoPoint::new(17, 37.6173, 55.7558);
        assert_eq!(point.id, 17);
        assert_eq!(point.lon(), 37.6173);
        assert_eq!(point.lat(), 55.7558);
    }
}
