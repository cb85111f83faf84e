//! Movement boundary and stationary gap detection.
//!
//! Both detectors compare consecutive fixes against a noise threshold in
//! meters, so GPS idling before, after or at the end of a run is not mistaken
//! for travel.

use crate::geo_utils::haversine_distance_m;
use crate::GpsPoint;

/// Indices of the first and last fix that take part in real movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementBoundaries {
    /// Earlier fix of the first moving pair
    pub start: usize,
    /// Later fix of the last moving pair
    pub end: usize,
}

/// Trim stationary lead-in and trail-off from a point run.
///
/// Scans forward for the first adjacent pair at least `stationary_threshold_m`
/// apart and backward for the last one. Returns `None` when the run has fewer
/// than two points or never moves.
///
/// # Example
/// ```
/// use ride_detector::{GpsPoint, find_movement_boundaries};
///
/// let run = vec![
///     GpsPoint::new(45.5000, -73.5, 0),
///     GpsPoint::new(45.5000, -73.5, 60),  // idle
///     GpsPoint::new(45.5010, -73.5, 120), // ~111 m
///     GpsPoint::new(45.5010, -73.5, 180), // idle
/// ];
///
/// let bounds = find_movement_boundaries(&run, 10.0).unwrap();
/// assert_eq!((bounds.start, bounds.end), (1, 2));
/// ```
pub fn find_movement_boundaries(
    points: &[GpsPoint],
    stationary_threshold_m: f64,
) -> Option<MovementBoundaries> {
    if points.len() < 2 {
        return None;
    }

    let is_moving =
        |i: usize| haversine_distance_m(&points[i - 1], &points[i]) >= stationary_threshold_m;

    let start = (1..points.len()).find(|&i| is_moving(i))? - 1;
    let end = (1..points.len()).rev().find(|&i| is_moving(i))?;

    Some(MovementBoundaries { start, end })
}

/// How long, in seconds, the tail of a point run has been stationary.
///
/// Walks backward from the last fix while consecutive movement stays below
/// `stationary_threshold_m`. Returns 0 for fewer than two points or when the
/// final pair already moved.
pub fn detect_stationary_gap(points: &[GpsPoint], stationary_threshold_m: f64) -> i64 {
    let Some(last) = points.last() else {
        return 0;
    };
    let last_index = points.len() - 1;

    let mut stationary_start = last_index;
    for i in (1..points.len()).rev() {
        if haversine_distance_m(&points[i - 1], &points[i]) >= stationary_threshold_m {
            break;
        }
        stationary_start = i - 1;
    }

    if stationary_start < last_index {
        last.timestamp - points[stationary_start].timestamp
    } else {
        0
    }
}
