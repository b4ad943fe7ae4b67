//! Quadkey codec: recursive spatial partitioning of the world extent.
//!
//! A quadkey is a base-4 digit string encoding the path from the root of
//! the world bounding box to a grid cell; a key of length `z` addresses a
//! cell at zoom `z`, and the key at zoom `z` is always a prefix of the key
//! at zoom `z + 1` for the same point.

use crate::error::{ClusterError, Result};
use geo::Point;

/// Western edge of the world extent.
pub const WORLD_MIN_LON: f64 = -180.0;
/// Eastern edge of the world extent.
pub const WORLD_MAX_LON: f64 = 180.0;
/// Southern edge of the world extent (Mercator-style clip).
pub const WORLD_MIN_LAT: f64 = -85.0;
/// Northern edge of the world extent (Mercator-style clip).
pub const WORLD_MAX_LAT: f64 = 85.0;

/// Mutable working bounding box, narrowed one quadrant per codec step.
///
/// One instance per point per worker invocation; reset to the world extent
/// before processing each point. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// The full world extent `[-180, 180] x [-85, 85]`.
    pub fn world() -> Self {
        Self {
            min_lon: WORLD_MIN_LON,
            max_lon: WORLD_MAX_LON,
            min_lat: WORLD_MIN_LAT,
            max_lat: WORLD_MAX_LAT,
        }
    }

    /// Split into the four child cells with their quadkey digits.
    ///
    /// Digit table matches [`quadrant`]: `0` lower-left, `1` lower-right,
    /// `2` upper-left, `3` upper-right.
    pub fn split(&self) -> [(char, BoundingBox); 4] {
        let mid_lon = (self.min_lon + self.max_lon) / 2.0;
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;

        [
            (
                '0',
                BoundingBox {
                    min_lon: self.min_lon,
                    max_lon: mid_lon,
                    min_lat: self.min_lat,
                    max_lat: mid_lat,
                },
            ),
            (
                '1',
                BoundingBox {
                    min_lon: mid_lon,
                    max_lon: self.max_lon,
                    min_lat: self.min_lat,
                    max_lat: mid_lat,
                },
            ),
            (
                '2',
                BoundingBox {
                    min_lon: self.min_lon,
                    max_lon: mid_lon,
                    min_lat: mid_lat,
                    max_lat: self.max_lat,
                },
            ),
            (
                '3',
                BoundingBox {
                    min_lon: mid_lon,
                    max_lon: self.max_lon,
                    min_lat: mid_lat,
                    max_lat: self.max_lat,
                },
            ),
        ]
    }

    /// Cell membership consistent with the codec's tie-breaks.
    ///
    /// Low edges are inclusive and high edges exclusive, except that cells
    /// touching the world's top or right edge include it, so a point at
    /// `lat = 85` or `lon = 180` belongs to the outermost row/column at
    /// every zoom.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let lon_ok = lon >= self.min_lon
            && (lon < self.max_lon || (self.max_lon == WORLD_MAX_LON && lon == WORLD_MAX_LON));
        let lat_ok = lat >= self.min_lat
            && (lat < self.max_lat || (self.max_lat == WORLD_MAX_LAT && lat == WORLD_MAX_LAT));
        lon_ok && lat_ok
    }
}

/// Narrow `bbox` to the quadrant containing `(lon, lat)` and return its digit.
///
/// A point exactly on the latitude midline is classified into the upper
/// half; a point exactly on the longitude midline into the right half.
/// Coordinates outside `bbox` are not detected here; callers validate
/// with [`validate_point`] first.
pub fn quadrant(bbox: &mut BoundingBox, lon: f64, lat: f64) -> char {
    let mid_lon = (bbox.min_lon + bbox.max_lon) / 2.0;
    let mid_lat = (bbox.min_lat + bbox.max_lat) / 2.0;

    if lat < mid_lat {
        bbox.max_lat = mid_lat;
        if lon < mid_lon {
            bbox.max_lon = mid_lon;
            '0'
        } else {
            bbox.min_lon = mid_lon;
            '1'
        }
    } else {
        bbox.min_lat = mid_lat;
        if lon < mid_lon {
            bbox.max_lon = mid_lon;
            '2'
        } else {
            bbox.min_lon = mid_lon;
            '3'
        }
    }
}

/// Compute the quadkey of `point` at the given zoom.
///
/// The digit is derived `zoom` times in sequence from the world box,
/// narrowing each time; zoom 0 is the root cell with the empty key.
///
/// # Examples
///
/// ```rust
/// use geo::Point;
/// use quadcluster::quadkey::quadkey_at;
///
/// let origin = Point::new(0.0, 0.0);
/// assert_eq!(quadkey_at(&origin, 1), "3");
///
/// let deeper = quadkey_at(&origin, 4);
/// assert!(deeper.starts_with("3"));
/// assert_eq!(deeper.len(), 4);
/// ```
pub fn quadkey_at(point: &Point, zoom: u32) -> String {
    let mut bbox = BoundingBox::world();
    let mut key = String::with_capacity(zoom as usize);
    for _ in 0..zoom {
        key.push(quadrant(&mut bbox, point.x(), point.y()));
    }
    key
}

/// Validate that a point has finite coordinates inside the world extent.
///
/// Points outside `[-180, 180] x [-85, 85]` would silently encode to a
/// quadkey that is not a faithful spatial index, so the engine rejects
/// them up front.
pub fn validate_point(id: u32, point: &Point) -> Result<()> {
    let (lon, lat) = (point.x(), point.y());

    if !lon.is_finite() || !lat.is_finite() {
        return Err(ClusterError::PointOutOfRange { id, lon, lat });
    }

    if !(WORLD_MIN_LON..=WORLD_MAX_LON).contains(&lon)
        || !(WORLD_MIN_LAT..=WORLD_MAX_LAT).contains(&lat)
    {
        return Err(ClusterError::PointOutOfRange { id, lon, lat });
    }

    Ok(())
}
