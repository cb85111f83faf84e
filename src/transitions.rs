//! Ride transitions between successive polls of a growing window.
//!
//! Car and bike transitions come straight from new start/end markers, so they
//! are reported before the ride has enough points to survive filtering.
//! Residual rides have no markers: a watcher keeps a [`RideSnapshot`] of the
//! previous classification and asks which rides started or ended since.
//! Delivery of the resulting events is up to the caller.

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{ActivityCollection, ActivityType, LiveConfig, Marker, MarkerKind, PerActivity};

/// Ride counts and newest ride ends per type, as seen by a watcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RideSnapshot {
    pub counts: PerActivity<usize>,
    /// End of the newest ride, 0 when there is none
    pub last_ends: PerActivity<i64>,
}

impl RideSnapshot {
    pub fn from_activities(activities: &ActivityCollection) -> Self {
        let mut snapshot = Self::default();
        for (activity, rides) in activities.rides.iter() {
            snapshot.counts[activity] = rides.len();
            snapshot.last_ends[activity] = rides.last().map_or(0, |ride| ride.end);
        }
        snapshot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    Started,
    Ended,
}

/// A ride that started or ended since the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideTransition {
    pub activity: ActivityType,
    /// 1-based ride number within its type
    pub ride_number: usize,
    pub kind: TransitionKind,
    /// When the ride started or ended (epoch seconds)
    pub timestamp: i64,
}

impl RideTransition {
    /// Notification title, e.g. `"Car Ride 2 Started"`.
    pub fn title(&self) -> String {
        let verb = match self.kind {
            TransitionKind::Started => "Started",
            TransitionKind::Ended => "Ended",
        };
        format!("{} Ride {} {}", self.activity.display_name(), self.ride_number, verb)
    }
}

/// Whether an event is too old to announce, relative to `now`.
fn is_historical(transition: &RideTransition, now: i64, config: &LiveConfig) -> bool {
    let age = now - transition.timestamp;
    if age > config.historical_threshold_secs {
        debug!(
            "[Transitions] Suppressed {} {}m ago",
            transition.title(),
            age / 60
        );
        return true;
    }
    false
}

/// Timestamps of every car/bike start or end marker, for seeding the set of
/// markers a watcher has already seen.
pub fn marker_timestamps(markers: &[Marker]) -> impl Iterator<Item = i64> + '_ {
    markers
        .iter()
        .filter(|m| !matches!(m.kind(), MarkerKind::Unknown(_)))
        .map(|m| m.timestamp)
}

/// Report car/bike start and end markers not yet in `seen`.
///
/// `markers` must hold every marker of the window sorted by timestamp, since
/// ride numbers count the start markers of each type up to the event. New
/// marker timestamps are added to `seen`, including suppressed historical
/// ones.
pub fn detect_marker_transitions(
    markers: &[Marker],
    seen: &mut HashSet<i64>,
    now: i64,
    config: &LiveConfig,
) -> Vec<RideTransition> {
    let mut transitions = Vec::new();
    let mut starts: PerActivity<usize> = PerActivity::default();

    for marker in markers {
        let (activity, kind) = match marker.kind() {
            MarkerKind::Start(activity) => {
                starts[activity] += 1;
                (activity, TransitionKind::Started)
            }
            MarkerKind::End(activity) => (activity, TransitionKind::Ended),
            MarkerKind::Unknown(_) => continue,
        };
        if !seen.insert(marker.timestamp) {
            continue;
        }

        let transition = RideTransition {
            activity,
            // An orphaned end still closes ride 1
            ride_number: starts[activity].max(1),
            kind,
            timestamp: marker.timestamp,
        };
        if !is_historical(&transition, now, config) {
            transitions.push(transition);
        }
    }

    transitions
}

/// Compare the previous snapshot with a fresh classification.
///
/// Per activity type, looking at the newest ride:
/// - more rides than before: `Started` if the ride is still open (its end
///   tracks `last_gps_timestamp`), otherwise `Ended`
/// - same non-zero count: `Ended` once an open ride closes, i.e. it is no
///   longer open and its end moved forward by more than the configured amount
///
/// Events older than `historical_threshold_secs` relative to `now` are
/// suppressed.
pub fn detect_transitions(
    previous: &RideSnapshot,
    activities: &ActivityCollection,
    last_gps_timestamp: i64,
    now: i64,
    config: &LiveConfig,
) -> Vec<RideTransition> {
    let mut transitions = Vec::new();

    for (activity, rides) in activities.rides.iter() {
        let Some(ride) = rides.last() else {
            continue;
        };
        let count = rides.len();
        let previous_count = previous.counts[activity];
        let open = ride.is_open(last_gps_timestamp, config.open_ride_tolerance_secs);

        let event = if count > previous_count {
            if open {
                Some((TransitionKind::Started, ride.start))
            } else {
                Some((TransitionKind::Ended, ride.end))
            }
        } else if count == previous_count
            && !open
            && ride.end - previous.last_ends[activity] > config.end_change_threshold_secs
        {
            Some((TransitionKind::Ended, ride.end))
        } else {
            None
        };

        let Some((kind, timestamp)) = event else {
            continue;
        };

        let transition = RideTransition {
            activity,
            ride_number: count,
            kind,
            timestamp,
        };
        if !is_historical(&transition, now, config) {
            transitions.push(transition);
        }
    }

    transitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ride;

    fn collection(car: Vec<Ride>) -> ActivityCollection {
        let mut activities = ActivityCollection::default();
        activities.rides.car = car;
        activities
    }

    #[test]
    fn test_snapshot() {
        let mut activities = collection(vec![Ride::new(0, 100), Ride::new(200, 300)]);
        activities.rides.other.push(Ride::new(400, 500));
        let snapshot = RideSnapshot::from_activities(&activities);
        assert_eq!(snapshot.counts.car, 2);
        assert_eq!(snapshot.last_ends.car, 300);
        assert_eq!(snapshot.counts.bike, 0);
        assert_eq!(snapshot.last_ends.bike, 0);
        assert_eq!(snapshot.last_ends.other, 500);
    }

    #[test]
    fn test_open_ride_started() {
        let activities = collection(vec![Ride::new(1000, 1300)]);
        let config = LiveConfig::default();
        let transitions =
            detect_transitions(&RideSnapshot::default(), &activities, 1300, 1320, &config);
        assert_eq!(
            transitions,
            vec![RideTransition {
                activity: ActivityType::Car,
                ride_number: 1,
                kind: TransitionKind::Started,
                timestamp: 1000,
            }]
        );
        assert_eq!(transitions[0].title(), "Car Ride 1 Started");
    }

    #[test]
    fn test_closed_ride_appears_ended() {
        let activities = collection(vec![Ride::new(1000, 1300)]);
        let config = LiveConfig::default();
        let transitions =
            detect_transitions(&RideSnapshot::default(), &activities, 1500, 1500, &config);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, TransitionKind::Ended);
        assert_eq!(transitions[0].timestamp, 1300);
    }

    #[test]
    fn test_open_ride_closes() {
        let config = LiveConfig::default();
        let before = collection(vec![Ride::new(1000, 1300)]);
        let previous = RideSnapshot::from_activities(&before);

        // Still open: the end just follows new fixes
        let growing = collection(vec![Ride::new(1000, 1360)]);
        assert!(detect_transitions(&previous, &growing, 1360, 1370, &config).is_empty());

        // End marker arrived at 1400 while fixes continued to 1500
        let closed = collection(vec![Ride::new(1000, 1400)]);
        let transitions = detect_transitions(&previous, &closed, 1500, 1510, &config);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, TransitionKind::Ended);
        assert_eq!(transitions[0].title(), "Car Ride 1 Ended");
    }

    #[test]
    fn test_small_end_change_ignored() {
        let previous = RideSnapshot::from_activities(&collection(vec![Ride::new(1000, 1300)]));
        let closed = collection(vec![Ride::new(1000, 1350)]);
        let config = LiveConfig::default();
        assert!(detect_transitions(&previous, &closed, 2000, 2000, &config).is_empty());
    }

    #[test]
    fn test_historical_events_suppressed() {
        let activities = collection(vec![Ride::new(1000, 1300)]);
        let transitions = detect_transitions(
            &RideSnapshot::default(),
            &activities,
            1300,
            1000 + 601,
            &LiveConfig::default(),
        );
        assert!(transitions.is_empty());
    }

    #[test]
    fn test_new_markers_reported_once() {
        let config = LiveConfig::default();
        let mut markers = vec![Marker::new(100, "car_start"), Marker::new(200, "car_end")];
        let mut seen: HashSet<i64> = marker_timestamps(&markers).collect();

        markers.push(Marker::new(300, "bike_start"));
        markers.push(Marker::new(350, "note"));
        markers.push(Marker::new(400, "car_start"));
        let transitions = detect_marker_transitions(&markers, &mut seen, 450, &config);
        let titles: Vec<String> = transitions.iter().map(RideTransition::title).collect();
        assert_eq!(titles, vec!["Bike Ride 1 Started", "Car Ride 2 Started"]);
        assert_eq!(transitions[1].timestamp, 400);

        // Same window again: nothing new
        assert!(detect_marker_transitions(&markers, &mut seen, 460, &config).is_empty());
    }

    #[test]
    fn test_orphan_end_marker_numbered_one() {
        let markers = vec![Marker::new(100, "bike_end")];
        let mut seen = HashSet::new();
        let transitions =
            detect_marker_transitions(&markers, &mut seen, 150, &LiveConfig::default());
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].title(), "Bike Ride 1 Ended");
    }

    #[test]
    fn test_historical_marker_marked_seen() {
        let markers = vec![Marker::new(100, "car_start")];
        let mut seen = HashSet::new();
        let config = LiveConfig::default();
        assert!(detect_marker_transitions(&markers, &mut seen, 5000, &config).is_empty());
        assert!(seen.contains(&100));
    }

    #[test]
    fn test_walking_title() {
        let transition = RideTransition {
            activity: ActivityType::Other,
            ride_number: 3,
            kind: TransitionKind::Ended,
            timestamp: 0,
        };
        assert_eq!(transition.title(), "Walking Ride 3 Ended");
    }
}
