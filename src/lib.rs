//! # Ride Detector
//!
//! Activity classification for a single device's OwnTracks location stream.
//!
//! This library turns a time-ordered stream of GPS fixes and lifecycle markers
//! into typed activities (car, bike and an unmarked "other" category), each
//! broken into individual rides with distance and duration statistics:
//! - Marker-driven ride intervals for car and bike
//! - Gap, interruption and stationary heuristics for everything else
//! - Noise-suppressed movement boundaries so idling is not reported as travel
//! - Per-type statistics, timelines and ride transition detection
//!
//! ## Features
//!
//! - **`parallel`** - Assign points to rides in parallel with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use ride_detector::{classify, ActivityType, GpsPoint, Marker, SegmentationConfig};
//!
//! // Six fixes, one minute apart, heading north
//! let points: Vec<GpsPoint> = (0..6)
//!     .map(|i| GpsPoint::new(45.5017 + i as f64 * 0.001, -73.5673, 100 + i * 60))
//!     .collect();
//! let markers = vec![Marker::new(100, "car_start"), Marker::new(400, "car_end")];
//!
//! let result = classify(points, markers, &SegmentationConfig::default());
//!
//! let cars = &result.activities.rides[ActivityType::Car];
//! assert_eq!(cars.len(), 1);
//! assert_eq!((cars[0].start, cars[0].end), (100, 400));
//! ```

use std::fmt;
use std::ops::{Index, IndexMut};

use geo::{BoundingRect, Coord, LineString};

use crate::geo_utils::DEFAULT_NOISE_THRESHOLD_M;
use serde::{Deserialize, Serialize};

// Unified error handling and degraded outcomes
pub mod error;
pub use error::{Outcome, Result, SegmentationError};

// Distance geometry (haversine, noise suppression, track length)
pub mod geo_utils;
pub use geo_utils::{haversine_distance, noise_filtered_distance, track_distance};

// Movement boundary and stationary gap detection
pub mod movement;
pub use movement::{detect_stationary_gap, find_movement_boundaries, MovementBoundaries};

// Marker-driven ride intervals
pub mod markers;
pub use markers::{parse_marker_lines, segment_markers};

// Point-to-ride assignment
pub mod assignment;
pub use assignment::assign_points;

// Residual ("other") ride segmentation
pub mod residual;
pub use residual::{is_residual_ride_ended, segment_residual, validate_candidate, ResidualRides};

// Ride filtering, statistics and reporting
pub mod stats;
pub use stats::{
    aggregate_stats, filter_rides, format_duration, format_ride_text, summarize_rides,
    ActivityStats, RideSummary, TypeStats,
};

// OwnTracks record decoding
pub mod input;
pub use input::{parse_items_json, split_items, LwtRecord, TrackItem};

// Full classification pipeline
pub mod engine;
pub use engine::{classify, classify_items, Classification};

// Activity timeline
pub mod timeline;
pub use timeline::{build_timeline, EventSource, TimelineEvent};

// Ride transitions between successive classifications
pub mod transitions;
pub use transitions::{
    detect_marker_transitions, detect_transitions, marker_timestamps, RideSnapshot, RideTransition,
    TransitionKind,
};

// Live session state
pub mod session;
pub use session::LiveSession;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS fix with latitude, longitude and an epoch-seconds UTC timestamp.
///
/// Serializes with the OwnTracks field names `lat`, `lon` and `tst`.
///
/// # Example
/// ```
/// use ride_detector::GpsPoint;
/// let point = GpsPoint::new(45.5017, -73.5673, 1_700_000_000); // Montreal
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    #[serde(rename = "tst")]
    pub timestamp: i64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box for a ride.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points. Returns `None` for an empty slice.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        let line: LineString<f64> = points
            .iter()
            .map(|p| Coord {
                x: p.longitude,
                y: p.latitude,
            })
            .collect();

        line.bounding_rect().map(|rect| Self {
            min_lat: rect.min().y,
            max_lat: rect.max().y,
            min_lng: rect.min().x,
            max_lng: rect.max().x,
        })
    }

    /// Get the center of the bounds as `(latitude, longitude)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// The closed set of activity types a ride can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Car,
    Bike,
    /// Points not claimed by any marker-based ride
    Other,
}

impl ActivityType {
    /// All activity types in priority order.
    pub const ALL: [ActivityType; 3] = [ActivityType::Car, ActivityType::Bike, ActivityType::Other];

    /// Types whose rides come from start/end markers, in assignment priority order.
    pub const MARKER_BASED: [ActivityType; 2] = [ActivityType::Car, ActivityType::Bike];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Car => "car",
            ActivityType::Bike => "bike",
            ActivityType::Other => "other",
        }
    }

    /// Human-facing name used in notifications.
    pub fn display_name(self) -> &'static str {
        match self {
            ActivityType::Car => "Car",
            ActivityType::Bike => "Bike",
            ActivityType::Other => "Walking",
        }
    }

    pub fn is_marker_based(self) -> bool {
        !matches!(self, ActivityType::Other)
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpretation of a marker's activity string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind {
    Start(ActivityType),
    End(ActivityType),
    /// Any activity string outside the marker vocabulary
    Unknown(String),
}

impl MarkerKind {
    /// Parse a marker activity string such as `"car_start"` or `"bike_end"`.
    pub fn parse(activity: &str) -> Self {
        match activity {
            "car_start" => MarkerKind::Start(ActivityType::Car),
            "car_end" => MarkerKind::End(ActivityType::Car),
            "bike_start" => MarkerKind::Start(ActivityType::Bike),
            "bike_end" => MarkerKind::End(ActivityType::Bike),
            other => MarkerKind::Unknown(other.to_string()),
        }
    }
}

/// A lifecycle marker injected by the user or a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(rename = "tst")]
    pub timestamp: i64,
    pub activity: String,
}

impl Marker {
    pub fn new(timestamp: i64, activity: impl Into<String>) -> Self {
        Self {
            timestamp,
            activity: activity.into(),
        }
    }

    pub fn kind(&self) -> MarkerKind {
        MarkerKind::parse(&self.activity)
    }
}

/// One ride of a single activity type.
///
/// Marker-based rides hold the points inside `[start, end]`. Residual rides
/// hold every point of their candidate run, while `start`/`end` are trimmed
/// to the detected movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    /// Epoch seconds
    pub start: i64,
    /// Epoch seconds
    pub end: i64,
    pub points: Vec<GpsPoint>,
}

impl Ride {
    /// Create an empty ride interval.
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            points: Vec::new(),
        }
    }

    pub fn with_points(start: i64, end: i64, points: Vec<GpsPoint>) -> Self {
        Self { start, end, points }
    }

    /// Inclusive interval containment.
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// Track distance in kilometers (unfiltered pairwise sum).
    pub fn distance_km(&self) -> f64 {
        track_distance(&self.points)
    }

    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }

    /// Average speed in km/h, 0 for a zero-length ride.
    pub fn average_speed_kmh(&self) -> f64 {
        let duration = self.duration_secs();
        if duration > 0 {
            self.distance_km() / duration as f64 * 3600.0
        } else {
            0.0
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.points)
    }

    /// A ride is open while its end tracks the newest GPS fix.
    pub fn is_open(&self, last_gps_timestamp: i64, tolerance_secs: i64) -> bool {
        (self.end - last_gps_timestamp).abs() < tolerance_secs
    }
}

/// One value per activity type, indexable by [`ActivityType`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerActivity<T> {
    pub car: T,
    pub bike: T,
    pub other: T,
}

impl<T> PerActivity<T> {
    /// Iterate `(type, value)` pairs in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (ActivityType, &T)> + '_ {
        ActivityType::ALL.into_iter().map(move |t| (t, &self[t]))
    }
}

impl<T> Index<ActivityType> for PerActivity<T> {
    type Output = T;

    fn index(&self, activity: ActivityType) -> &T {
        match activity {
            ActivityType::Car => &self.car,
            ActivityType::Bike => &self.bike,
            ActivityType::Other => &self.other,
        }
    }
}

impl<T> IndexMut<ActivityType> for PerActivity<T> {
    fn index_mut(&mut self, activity: ActivityType) -> &mut T {
        match activity {
            ActivityType::Car => &mut self.car,
            ActivityType::Bike => &mut self.bike,
            ActivityType::Other => &mut self.other,
        }
    }
}

/// Rides per activity type plus how many were discarded by filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityCollection {
    pub rides: PerActivity<Vec<Ride>>,
    pub filtered_count: PerActivity<usize>,
}

impl ActivityCollection {
    pub fn rides(&self, activity: ActivityType) -> &[Ride] {
        &self.rides[activity]
    }

    pub fn total_rides(&self) -> usize {
        self.rides.iter().map(|(_, rides)| rides.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_rides() == 0
    }

    /// Car and bike rides tagged with their type, sorted by start time.
    pub fn marker_rides_by_start(&self) -> Vec<(ActivityType, &Ride)> {
        let mut rides: Vec<(ActivityType, &Ride)> = ActivityType::MARKER_BASED
            .iter()
            .flat_map(|&t| self.rides[t].iter().map(move |ride| (t, ride)))
            .collect();
        rides.sort_by_key(|(_, ride)| ride.start);
        rides
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Thresholds for ride segmentation and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Pairwise movement below this is treated as GPS jitter.
    /// Default: 10.0 meters
    pub stationary_threshold_m: f64,

    /// Time gap (and trailing stationary time) that ends a residual ride.
    /// Default: 1800 seconds (30 minutes)
    pub gap_threshold_secs: i64,

    /// Minimum moving duration of a residual ride.
    /// Default: 300 seconds (5 minutes)
    pub min_ride_duration_secs: i64,

    /// Minimum track distance of a residual ride.
    /// Default: 0.1 km
    pub min_ride_distance_km: f64,

    /// Rides with fewer points are discarded and counted as filtered.
    /// Default: 5
    pub min_ride_points: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            stationary_threshold_m: DEFAULT_NOISE_THRESHOLD_M,
            gap_threshold_secs: 30 * 60,
            min_ride_duration_secs: 5 * 60,
            min_ride_distance_km: 0.1,
            min_ride_points: 5,
        }
    }
}

/// Thresholds used when comparing successive classifications of a live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Transitions older than this (relative to now) are suppressed.
    /// Default: 600 seconds
    pub historical_threshold_secs: i64,

    /// A ride whose end is this close to the newest fix is still open.
    /// Default: 10 seconds
    pub open_ride_tolerance_secs: i64,

    /// A closed ride must move its end by more than this to be re-announced.
    /// Default: 60 seconds
    pub end_change_threshold_secs: i64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            historical_threshold_secs: 600,
            open_ride_tolerance_secs: 10,
            end_change_threshold_secs: 60,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(45.5017, -73.5673, 0).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0, 0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0, 0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0, 0).is_valid());
    }

    #[test]
    fn test_marker_kind_parse() {
        assert_eq!(MarkerKind::parse("car_start"), MarkerKind::Start(ActivityType::Car));
        assert_eq!(MarkerKind::parse("bike_end"), MarkerKind::End(ActivityType::Bike));
        assert_eq!(
            MarkerKind::parse("other_start"),
            MarkerKind::Unknown("other_start".to_string())
        );
    }

    #[test]
    fn test_ride_metrics() {
        let ride = Ride::with_points(
            0,
            3600,
            vec![GpsPoint::new(45.0, -73.0, 0), GpsPoint::new(45.1, -73.0, 3600)],
        );
        let distance = ride.distance_km();
        assert!((distance - 11.12).abs() < 0.01);
        assert!((ride.average_speed_kmh() - distance).abs() < 1e-9);
        assert!(ride.contains(0) && ride.contains(3600) && !ride.contains(3601));

        let bounds = ride.bounds().unwrap();
        assert_eq!(bounds.min_lat, 45.0);
        assert_eq!(bounds.max_lat, 45.1);
        let (lat, lng) = bounds.center();
        assert!((lat - 45.05).abs() < 1e-9);
        assert_eq!(lng, -73.0);
    }

    #[test]
    fn test_zero_duration_speed() {
        let ride = Ride::new(100, 100);
        assert_eq!(ride.average_speed_kmh(), 0.0);
        assert!(ride.bounds().is_none());
    }

    #[test]
    fn test_ride_is_open() {
        let ride = Ride::new(0, 1000);
        assert!(ride.is_open(1005, 10));
        assert!(!ride.is_open(1010, 10));
    }

    #[test]
    fn test_per_activity_indexing() {
        let mut counts: PerActivity<usize> = PerActivity::default();
        counts[ActivityType::Bike] += 2;
        assert_eq!(counts.bike, 2);
        let pairs: Vec<_> = counts.iter().map(|(t, &c)| (t, c)).collect();
        assert_eq!(
            pairs,
            vec![(ActivityType::Car, 0), (ActivityType::Bike, 2), (ActivityType::Other, 0)]
        );
    }

    #[test]
    fn test_point_serializes_with_wire_names() {
        let json = serde_json::to_string(&GpsPoint::new(1.5, 2.5, 10)).unwrap();
        assert_eq!(json, r#"{"lat":1.5,"lon":2.5,"tst":10}"#);
        let json = serde_json::to_string(&ActivityType::Other).unwrap();
        assert_eq!(json, r#""other""#);
    }

    #[test]
    fn test_config_partial_json() {
        let config: SegmentationConfig =
            serde_json::from_str(r#"{"min_ride_points": 3}"#).unwrap();
        assert_eq!(config.min_ride_points, 3);
        assert_eq!(config.gap_threshold_secs, 1800);
        assert_eq!(config.stationary_threshold_m, DEFAULT_NOISE_THRESHOLD_M);
    }
}
