//! Residual ("other") ride segmentation.
//!
//! Points not claimed by a car or bike ride are walked in time order and cut
//! into candidate runs. A new candidate starts when:
//! - a marker-based ride starts strictly between the previous fix and this one
//! - the time gap since the previous fix exceeds the gap threshold
//! - the candidate's tail has been stationary for longer than the gap threshold
//!
//! Each closed candidate is validated against minimum moving duration and
//! distance; failures are discarded, never retried.

use log::{debug, warn};

use crate::error::{Outcome, Result, SegmentationError};
use crate::geo_utils::track_distance;
use crate::movement::{detect_stationary_gap, find_movement_boundaries};
use crate::stats::filter_rides;
use crate::{GpsPoint, Ride, SegmentationConfig};

/// Residual rides and how many were filtered while building them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualRides {
    pub rides: Vec<Ride>,
    pub filtered_count: usize,
}

/// Split residual points into validated rides.
///
/// `ride_starts` are the start timestamps of every surviving car and bike
/// ride, used to cut a residual run where a real activity begins.
///
/// Points with invalid coordinates make segmentation fail; the outcome then
/// degrades to a single unvalidated ride spanning all residual points, or to
/// no rides and one filtered ride when there are too few points for that.
pub fn segment_residual(
    mut points: Vec<GpsPoint>,
    ride_starts: &[i64],
    config: &SegmentationConfig,
) -> Outcome<ResidualRides> {
    if points.is_empty() {
        return Outcome::Complete(ResidualRides::default());
    }

    points.sort_by_key(|p| p.timestamp);

    match segment_sorted(&points, ride_starts, config) {
        Ok(rides) => {
            let (rides, filtered_count) = filter_rides(rides, config.min_ride_points);
            debug!(
                "[Residual] {} points -> {} rides ({} filtered)",
                points.len(),
                rides.len(),
                filtered_count
            );
            Outcome::Complete(ResidualRides {
                rides,
                filtered_count,
            })
        }
        Err(cause) => {
            warn!(
                "[Residual] Segmentation failed, falling back to a single ride: {}",
                cause
            );
            Outcome::Degraded {
                value: fallback(points, config),
                cause,
            }
        }
    }
}

fn segment_sorted(
    points: &[GpsPoint],
    ride_starts: &[i64],
    config: &SegmentationConfig,
) -> Result<Vec<Ride>> {
    if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
        return Err(SegmentationError::InvalidCoordinates {
            timestamp: bad.timestamp,
            latitude: bad.latitude,
            longitude: bad.longitude,
        });
    }

    let mut starts = ride_starts.to_vec();
    starts.sort_unstable();

    let mut rides = Vec::new();
    let mut current: Vec<GpsPoint> = Vec::new();

    for &point in points {
        let split = current.last().is_some_and(|previous| {
            should_split(&current, previous.timestamp, point.timestamp, &starts, config)
        });

        if split {
            if let Some(ride) = validate_candidate(std::mem::take(&mut current), config) {
                rides.push(ride);
            }
        }
        current.push(point);
    }

    if let Some(ride) = validate_candidate(current, config) {
        rides.push(ride);
    }

    Ok(rides)
}

fn should_split(
    candidate: &[GpsPoint],
    previous: i64,
    timestamp: i64,
    sorted_starts: &[i64],
    config: &SegmentationConfig,
) -> bool {
    // First ride start strictly after the previous fix
    let next = sorted_starts.partition_point(|&start| start <= previous);
    if sorted_starts.get(next).is_some_and(|&start| start < timestamp) {
        return true;
    }

    if timestamp - previous > config.gap_threshold_secs {
        return true;
    }

    detect_stationary_gap(candidate, config.stationary_threshold_m) > config.gap_threshold_secs
}

/// Validate a closed candidate run.
///
/// The ride's `start`/`end` are trimmed to the detected movement boundaries,
/// or the raw first and last fix when the run never moves past the noise
/// threshold. The ride is kept only if that span lasts at least
/// `min_ride_duration_secs` and the whole run covers at least
/// `min_ride_distance_km`. All candidate points are kept on the ride.
pub fn validate_candidate(points: Vec<GpsPoint>, config: &SegmentationConfig) -> Option<Ride> {
    let (start, end) = match find_movement_boundaries(&points, config.stationary_threshold_m) {
        Some(bounds) => (points[bounds.start].timestamp, points[bounds.end].timestamp),
        None => (points.first()?.timestamp, points.last()?.timestamp),
    };

    if end - start < config.min_ride_duration_secs {
        return None;
    }
    if track_distance(&points) < config.min_ride_distance_km {
        return None;
    }

    Some(Ride::with_points(start, end, points))
}

fn fallback(points: Vec<GpsPoint>, config: &SegmentationConfig) -> ResidualRides {
    if points.len() < config.min_ride_points {
        return ResidualRides {
            rides: Vec::new(),
            filtered_count: 1,
        };
    }

    match (points.first(), points.last()) {
        (Some(first), Some(last)) => {
            let (start, end) = (first.timestamp, last.timestamp);
            ResidualRides {
                rides: vec![Ride::with_points(start, end, points)],
                filtered_count: 0,
            }
        }
        _ => ResidualRides::default(),
    }
}

/// Whether the newest residual ride has been stationary for longer than the
/// gap threshold, i.e. the activity is over even though no new ride began.
pub fn is_residual_ride_ended(ride: &Ride, config: &SegmentationConfig) -> bool {
    detect_stationary_gap(&ride.points, config.stationary_threshold_m) > config.gap_threshold_secs
}
