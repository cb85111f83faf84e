//! # Geographic Utilities
//!
//! Distance computations shared by every stage of ride detection.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two fixes, in km |
//! | [`haversine_distance_m`] | Same distance in meters |
//! | [`noise_filtered_distance`] | Distance with sub-threshold jitter zeroed |
//! | [`track_distance`] | Unfiltered length of a track, in km |
//!
//! ## Two distance policies
//!
//! Reported ride and activity distances use [`track_distance`], which counts
//! every pairwise movement including GPS jitter. Segmentation decisions
//! (movement boundaries, stationary gaps) compare against a noise threshold
//! instead. The two must not be mixed: swapping either one changes both the
//! reported statistics and where rides begin and end.
//!
//! ## Example
//!
//! ```rust
//! use ride_detector::{GpsPoint, geo_utils};
//!
//! let a = GpsPoint::new(45.50000, -73.5673, 0);
//! let b = GpsPoint::new(45.50004, -73.5673, 10); // ~4.4 m north
//!
//! assert_eq!(geo_utils::noise_filtered_distance(&a, &b, 10.0), 0.0);
//! assert!(geo_utils::track_distance(&[a, b]) > 0.0);
//! ```

use crate::GpsPoint;

/// Earth radius used for all distances, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default jitter threshold, in meters.
pub const DEFAULT_NOISE_THRESHOLD_M: f64 = 10.0;

/// Great-circle distance between two GPS points in kilometers (haversine formula).
///
/// Symmetric, non-negative and zero for identical coordinates.
///
/// # Example
///
/// ```rust
/// use ride_detector::{GpsPoint, geo_utils};
///
/// let montreal = GpsPoint::new(45.5017, -73.5673, 0);
/// let quebec = GpsPoint::new(46.8139, -71.2080, 0);
///
/// let distance = geo_utils::haversine_distance(&montreal, &quebec);
/// assert!((distance - 233.0).abs() < 2.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` past 1 for near-antipodal points
    let a = a.clamp(0.0, 1.0);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Great-circle distance between two GPS points in meters.
#[inline]
pub fn haversine_distance_m(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    haversine_distance(p1, p2) * 1000.0
}

/// Distance in kilometers, or 0 when the movement is below `threshold_m` meters.
///
/// Suppresses GPS jitter while the device is standing still.
pub fn noise_filtered_distance(p1: &GpsPoint, p2: &GpsPoint, threshold_m: f64) -> f64 {
    let distance_km = haversine_distance(p1, p2);
    if distance_km * 1000.0 < threshold_m {
        0.0
    } else {
        distance_km
    }
}

/// Total length of a track in kilometers.
///
/// Sums the unfiltered haversine distance between consecutive points. Empty or
/// single-point tracks return 0.0.
pub fn track_distance(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}
