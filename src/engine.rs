//! # Classification Engine
//!
//! Runs the full pipeline over one observation window:
//!
//! 1. Sort fixes and markers by timestamp
//! 2. Build car/bike intervals from markers
//! 3. Assign every fix to a car ride, a bike ride or the residual set
//! 4. Drop car/bike rides with too few points
//! 5. Segment residual fixes into "other" rides and filter them again
//! 6. Aggregate per-type statistics
//!
//! The engine is a pure function of its input: re-running it on the same
//! input yields an identical [`Classification`]. Stages that fail degrade to a
//! fallback instead of aborting; their causes are collected in
//! [`Classification::degradations`].

use log::debug;
use serde::Serialize;

use crate::error::SegmentationError;
use crate::input::{split_items, TrackItem};
use crate::residual::segment_residual;
use crate::stats::{aggregate_stats, filter_rides, ActivityStats};
use crate::{
    assign_points, segment_markers, ActivityCollection, ActivityType, GpsPoint, Marker,
    SegmentationConfig,
};

/// Complete result of classifying one observation window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    /// All fixes, sorted by timestamp
    pub points: Vec<GpsPoint>,
    pub activities: ActivityCollection,
    /// Empty when aggregation degraded
    pub stats: ActivityStats,
    /// Causes of every stage that fell back to a degraded result
    pub degradations: Vec<SegmentationError>,
}

impl Classification {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Timestamp of the newest fix.
    pub fn last_point_timestamp(&self) -> Option<i64> {
        self.points.last().map(|p| p.timestamp)
    }
}

/// Classify GPS fixes and lifecycle markers into activities and rides.
pub fn classify(
    mut points: Vec<GpsPoint>,
    mut markers: Vec<Marker>,
    config: &SegmentationConfig,
) -> Classification {
    points.sort_by_key(|p| p.timestamp);
    markers.sort_by_key(|m| m.timestamp);

    debug!(
        "[RideDetector] Classifying {} points with {} markers",
        points.len(),
        markers.len()
    );

    let mut intervals = segment_markers(&markers, &points);
    let residual = assign_points(&points, &mut intervals);

    let mut activities = ActivityCollection::default();
    for activity in ActivityType::MARKER_BASED {
        let (kept, dropped) =
            filter_rides(std::mem::take(&mut intervals[activity]), config.min_ride_points);
        activities.rides[activity] = kept;
        activities.filtered_count[activity] = dropped;
    }

    let mut degradations = Vec::new();

    if !residual.is_empty() {
        let ride_starts: Vec<i64> = activities
            .marker_rides_by_start()
            .iter()
            .map(|(_, ride)| ride.start)
            .collect();

        let (segmented, cause) = segment_residual(residual, &ride_starts, config).into_parts();
        degradations.extend(cause);

        let (kept, dropped) = filter_rides(segmented.rides, config.min_ride_points);
        activities.rides.other = kept;
        activities.filtered_count.other = segmented.filtered_count + dropped;
    }

    let (stats, cause) = aggregate_stats(&activities).into_parts();
    degradations.extend(cause);

    debug!(
        "[RideDetector] Found {} car, {} bike, {} other rides",
        activities.rides.car.len(),
        activities.rides.bike.len(),
        activities.rides.other.len()
    );

    Classification {
        points,
        activities,
        stats,
        degradations,
    }
}

/// Classify a raw OwnTracks record stream.
pub fn classify_items(
    items: impl IntoIterator<Item = TrackItem>,
    config: &SegmentationConfig,
) -> Classification {
    let (points, markers) = split_items(items);
    classify(points, markers, config)
}
