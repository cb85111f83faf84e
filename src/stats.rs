//! Ride filtering, per-type statistics and ride reporting.
//!
//! Statistics are derived purely from an [`ActivityCollection`]. Distances are
//! the unfiltered track length of each ride's points; durations are
//! `end - start`.
//!
//! ## Example
//! ```rust
//! use ride_detector::{aggregate_stats, ActivityCollection, ActivityType, GpsPoint, Ride};
//!
//! let mut activities = ActivityCollection::default();
//! let points: Vec<GpsPoint> = (0..5)
//!     .map(|i| GpsPoint::new(45.5 + i as f64 * 0.01, -73.5, i * 60))
//!     .collect();
//! activities.rides.car.push(Ride::with_points(0, 240, points));
//! activities.filtered_count.car = 2;
//!
//! let stats = aggregate_stats(&activities).into_value();
//! let car = &stats[&ActivityType::Car];
//! assert_eq!(car.count, 1);
//! assert_eq!(car.total_points, 5);
//! assert_eq!(car.total_original_count, 3);
//! ```

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Outcome, Result, SegmentationError};
use crate::geo_utils::track_distance;
use crate::{ActivityCollection, ActivityType, Ride};

/// Keep rides with at least `min_points` points.
///
/// Returns the surviving rides (in order) and how many were dropped.
pub fn filter_rides(rides: Vec<Ride>, min_points: usize) -> (Vec<Ride>, usize) {
    let original_count = rides.len();
    let kept: Vec<Ride> = rides
        .into_iter()
        .filter(|ride| ride.points.len() >= min_points)
        .collect();
    let dropped = original_count - kept.len();
    (kept, dropped)
}

/// Aggregate statistics for one activity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    /// Surviving rides
    pub count: usize,
    /// Kilometers
    pub total_distance: f64,
    /// Seconds
    pub total_duration: i64,
    pub total_points: usize,
    pub filtered_count: usize,
    /// `count + filtered_count`
    pub total_original_count: usize,
}

impl TypeStats {
    /// Average speed over all rides in km/h, 0 when no time was recorded.
    pub fn average_speed_kmh(&self) -> f64 {
        if self.total_duration > 0 {
            self.total_distance / self.total_duration as f64 * 3600.0
        } else {
            0.0
        }
    }
}

/// Statistics keyed by activity type. Empty when aggregation degraded.
pub type ActivityStats = BTreeMap<ActivityType, TypeStats>;

/// Compute per-type ride statistics.
///
/// A ride with a non-finite distance or a negative duration fails the whole
/// aggregation, which degrades to empty statistics rather than a partial
/// result.
pub fn aggregate_stats(activities: &ActivityCollection) -> Outcome<ActivityStats> {
    let outcome = Outcome::from_result(try_aggregate(activities), ActivityStats::new);
    if let Some(cause) = outcome.cause() {
        warn!("[Stats] Aggregation failed, reporting empty statistics: {}", cause);
    }
    outcome
}

fn try_aggregate(activities: &ActivityCollection) -> Result<ActivityStats> {
    let mut stats = ActivityStats::new();

    for (activity, rides) in activities.rides.iter() {
        let mut total_distance = 0.0;
        let mut total_duration = 0;
        let mut total_points = 0;

        for ride in rides {
            let distance = track_distance(&ride.points);
            if !distance.is_finite() {
                return Err(SegmentationError::InvalidStatistic {
                    activity,
                    message: format!("ride starting at {} has non-finite distance", ride.start),
                });
            }
            let duration = ride.duration_secs();
            if duration < 0 {
                return Err(SegmentationError::InvalidStatistic {
                    activity,
                    message: format!("ride starting at {} ends at {}", ride.start, ride.end),
                });
            }

            total_distance += distance;
            total_duration += duration;
            total_points += ride.points.len();
        }

        let filtered_count = activities.filtered_count[activity];
        stats.insert(
            activity,
            TypeStats {
                count: rides.len(),
                total_distance,
                total_duration,
                total_points,
                filtered_count,
                total_original_count: rides.len() + filtered_count,
            },
        );
    }

    Ok(stats)
}

// ============================================================================
// Ride Reporting
// ============================================================================

/// Display-ready summary of a single ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideSummary {
    pub activity: ActivityType,
    /// 1-based position within its activity type
    pub ride_number: usize,
    pub start: i64,
    pub end: i64,
    pub distance_km: f64,
    pub duration_secs: i64,
    pub average_speed_kmh: f64,
    pub point_count: usize,
}

impl RideSummary {
    pub fn from_ride(activity: ActivityType, ride_number: usize, ride: &Ride) -> Self {
        Self {
            activity,
            ride_number,
            start: ride.start,
            end: ride.end,
            distance_km: ride.distance_km(),
            duration_secs: ride.duration_secs(),
            average_speed_kmh: ride.average_speed_kmh(),
            point_count: ride.points.len(),
        }
    }
}

/// Summaries of every ride, newest first.
pub fn summarize_rides(activities: &ActivityCollection) -> Vec<RideSummary> {
    let mut summaries: Vec<RideSummary> = activities
        .rides
        .iter()
        .flat_map(|(activity, rides)| {
            rides
                .iter()
                .enumerate()
                .map(move |(i, ride)| RideSummary::from_ride(activity, i + 1, ride))
        })
        .collect();
    summaries.sort_by(|a, b| b.start.cmp(&a.start));
    summaries
}

/// Format seconds as `DD:HH:MM:SS`. Negative durations format as zero.
///
/// ```
/// use ride_detector::format_duration;
/// assert_eq!(format_duration(90_061), "01:01:01:01");
/// ```
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3600;
    let minutes = seconds % 3600 / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}:{:02}", days, hours, minutes, secs)
}

/// One-line ride description, e.g. `"12.5 km | 35m | 21.4 km/h"`.
pub fn format_ride_text(ride: &Ride) -> String {
    let minutes = ride.duration_secs() / 60;
    let duration = if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes)
    };

    format!(
        "{:.1} km | {} | {:.1} km/h",
        ride.distance_km(),
        duration,
        ride.average_speed_kmh()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsPoint;

    fn ride(start: i64, n: usize) -> Ride {
        let points = (0..n)
            .map(|i| GpsPoint::new(45.5 + i as f64 * 0.001, -73.5, start + i as i64 * 60))
            .collect();
        Ride::with_points(start, start + (n.max(1) as i64 - 1) * 60, points)
    }

    #[test]
    fn test_filter_rides() {
        let rides = vec![ride(0, 5), ride(1000, 3), ride(2000, 8), ride(3000, 0)];
        let (kept, dropped) = filter_rides(rides, 5);
        assert_eq!(dropped, 2);
        assert_eq!(kept.iter().map(|r| r.start).collect::<Vec<_>>(), vec![0, 2000]);
    }

    #[test]
    fn test_stats_consistency() {
        let mut activities = ActivityCollection::default();
        activities.rides.bike = vec![ride(0, 6), ride(5000, 7)];
        activities.rides.other = vec![ride(9000, 5)];
        activities.filtered_count.other = 1;

        let outcome = aggregate_stats(&activities);
        assert!(!outcome.is_degraded());
        let stats = outcome.into_value();

        assert_eq!(stats.len(), 3);
        let bike = &stats[&ActivityType::Bike];
        let expected: f64 = activities
            .rides
            .bike
            .iter()
            .map(|r| track_distance(&r.points))
            .sum();
        assert_eq!(bike.total_distance, expected);
        assert_eq!(bike.total_points, 13);
        assert_eq!(bike.total_duration, 300 + 360);
        assert_eq!(bike.count, 2);

        let other = &stats[&ActivityType::Other];
        assert_eq!(other.filtered_count, 1);
        assert_eq!(other.total_original_count, 2);

        let car = &stats[&ActivityType::Car];
        assert_eq!(*car, TypeStats::default());
    }

    #[test]
    fn test_stats_degrade_on_invalid_distance() {
        let mut activities = ActivityCollection::default();
        let mut bad = ride(0, 5);
        bad.points[2].latitude = f64::NAN;
        activities.rides.car.push(bad);

        let outcome = aggregate_stats(&activities);
        assert!(outcome.is_degraded());
        assert!(matches!(
            outcome.cause(),
            Some(SegmentationError::InvalidStatistic {
                activity: ActivityType::Car,
                ..
            })
        ));
        assert!(outcome.value().is_empty());
    }

    #[test]
    fn test_stats_degrade_on_negative_duration() {
        let mut activities = ActivityCollection::default();
        activities.rides.bike.push(Ride::new(500, 100));
        assert!(aggregate_stats(&activities).is_degraded());
    }

    #[test]
    fn test_average_speed() {
        let stats = TypeStats {
            total_distance: 10.0,
            total_duration: 1800,
            ..TypeStats::default()
        };
        assert_eq!(stats.average_speed_kmh(), 20.0);
        assert_eq!(TypeStats::default().average_speed_kmh(), 0.0);
    }

    #[test]
    fn test_summaries_newest_first() {
        let mut activities = ActivityCollection::default();
        activities.rides.car = vec![ride(0, 5), ride(4000, 5)];
        activities.rides.other = vec![ride(2000, 5)];

        let summaries = summarize_rides(&activities);
        let order: Vec<(ActivityType, usize)> =
            summaries.iter().map(|s| (s.activity, s.ride_number)).collect();
        assert_eq!(
            order,
            vec![
                (ActivityType::Car, 2),
                (ActivityType::Other, 1),
                (ActivityType::Car, 1)
            ]
        );
        assert_eq!(summaries[0].point_count, 5);
        assert_eq!(summaries[0].duration_secs, 240);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00:00");
        assert_eq!(format_duration(3725), "00:01:02:05");
        assert_eq!(format_duration(-5), "00:00:00:00");
    }

    #[test]
    fn test_format_ride_text() {
        let ride = Ride::with_points(
            0,
            3900,
            vec![GpsPoint::new(45.0, -73.0, 0), GpsPoint::new(45.1, -73.0, 3900)],
        );
        assert_eq!(format_ride_text(&ride), "11.1 km | 1h 5m | 10.3 km/h");

        let short = Ride::with_points(
            0,
            600,
            vec![GpsPoint::new(45.0, -73.0, 0), GpsPoint::new(45.01, -73.0, 600)],
        );
        assert_eq!(format_ride_text(&short), "1.1 km | 10m | 6.7 km/h");
    }
}
