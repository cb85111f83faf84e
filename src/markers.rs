//! Marker-driven ride intervals for car and bike.
//!
//! Each marker-based type keeps at most one pending start while markers are
//! scanned in time order. Unmatched markers are tolerated rather than
//! rejected:
//! - a second start overwrites the pending one (last start wins)
//! - an end without a start begins at the first GPS fix of the stream
//! - a start still pending at the end is closed at the last GPS fix

use log::debug;
use serde::Deserialize;

use crate::{ActivityType, GpsPoint, Marker, MarkerKind, PerActivity, Ride};

/// Build empty ride intervals from time-sorted markers.
///
/// `points` must be sorted by timestamp; only its first and last fix are
/// consulted, for orphaned ends and still-open rides. Rides are returned
/// without points (see [`assign_points`](crate::assign_points)). The
/// `other` slot is always empty.
///
/// # Example
/// ```
/// use ride_detector::{segment_markers, GpsPoint, Marker};
///
/// let points = vec![GpsPoint::new(45.5, -73.5, 50), GpsPoint::new(45.6, -73.5, 900)];
/// let markers = vec![
///     Marker::new(100, "car_start"),
///     Marker::new(500, "car_end"),
///     Marker::new(600, "bike_start"),
/// ];
///
/// let rides = segment_markers(&markers, &points);
/// assert_eq!((rides.car[0].start, rides.car[0].end), (100, 500));
/// // Still riding when the window closed
/// assert_eq!((rides.bike[0].start, rides.bike[0].end), (600, 900));
/// ```
pub fn segment_markers(markers: &[Marker], points: &[GpsPoint]) -> PerActivity<Vec<Ride>> {
    let mut rides: PerActivity<Vec<Ride>> = PerActivity::default();
    let mut pending: PerActivity<Option<i64>> = PerActivity::default();

    for marker in markers {
        match marker.kind() {
            MarkerKind::Start(activity) if activity.is_marker_based() => {
                pending[activity] = Some(marker.timestamp);
            }
            MarkerKind::End(activity) if activity.is_marker_based() => {
                let start = pending[activity].take().unwrap_or_else(|| {
                    points
                        .first()
                        .map_or(marker.timestamp, |first| first.timestamp)
                });
                rides[activity].push(Ride::new(start, marker.timestamp));
            }
            _ => {}
        }
    }

    if let Some(last) = points.last() {
        for activity in ActivityType::MARKER_BASED {
            if let Some(start) = pending[activity].take() {
                rides[activity].push(Ride::new(start, last.timestamp));
            }
        }
    }

    rides
}

#[derive(Deserialize)]
struct MarkerRecord {
    tst: i64,
    activity: String,
}

/// Parse the markers file format: one JSON object per line with `tst` and
/// `activity`.
///
/// Blank and malformed lines are skipped. Only markers with
/// `from <= tst <= to` are kept, sorted by timestamp.
pub fn parse_marker_lines(text: &str, from: i64, to: i64) -> Vec<Marker> {
    let mut skipped = 0usize;
    let mut markers: Vec<Marker> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<MarkerRecord>(line) {
            Ok(record) => Some(record),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .filter(|record| from <= record.tst && record.tst <= to)
        .map(|record| Marker::new(record.tst, record.activity))
        .collect();

    if skipped > 0 {
        debug!("[Markers] Skipped {} malformed marker lines", skipped);
    }

    markers.sort_by_key(|m| m.timestamp);
    markers
}
