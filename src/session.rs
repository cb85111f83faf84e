//! # Live Session
//!
//! Stateful wrapper for live tracking: accumulates records polled from the
//! location source and re-classifies the whole buffer on demand.
//!
//! ## Architecture
//!
//! The session owns:
//! - The accumulated record buffer, deduplicated by timestamp
//! - The poll watermark (newest fix seen so far)
//! - The last classification, invalidated whenever new records arrive
//! - The baseline snapshot and seen marker timestamps used to detect ride
//!   transitions
//!
//! It is a plain value: hosts that share it between threads wrap it in their
//! own lock.

use std::collections::HashSet;

use log::{debug, info};

use crate::engine::{classify_items, Classification};
use crate::input::TrackItem;
use crate::residual::is_residual_ride_ended;
use crate::transitions::{
    detect_marker_transitions, detect_transitions, marker_timestamps, RideSnapshot,
    RideTransition, TransitionKind,
};
use crate::{ActivityType, LiveConfig, Marker, SegmentationConfig};

/// Accumulated state of one live tracking session.
#[derive(Debug, Clone)]
pub struct LiveSession {
    start_timestamp: i64,
    items: Vec<TrackItem>,
    seen_timestamps: HashSet<i64>,
    last_poll_timestamp: Option<i64>,
    classification: Option<Classification>,
    baseline: Option<RideSnapshot>,
    seen_markers: HashSet<i64>,
    /// Set once the newest residual ride was announced as ended by its
    /// stationary tail; cleared when movement resumes
    other_ended_notified: bool,
    config: SegmentationConfig,
    live_config: LiveConfig,
}

impl LiveSession {
    /// Create a session starting at `start_timestamp` with default configuration.
    pub fn new(start_timestamp: i64) -> Self {
        Self::with_config(start_timestamp, SegmentationConfig::default(), LiveConfig::default())
    }

    /// Create a session with custom configuration.
    pub fn with_config(
        start_timestamp: i64,
        config: SegmentationConfig,
        live_config: LiveConfig,
    ) -> Self {
        Self {
            start_timestamp,
            items: Vec::new(),
            seen_timestamps: HashSet::new(),
            last_poll_timestamp: None,
            classification: None,
            baseline: None,
            seen_markers: HashSet::new(),
            other_ended_notified: false,
            config,
            live_config,
        }
    }

    pub fn start_timestamp(&self) -> i64 {
        self.start_timestamp
    }

    /// Newest fix timestamp merged so far. Poll from here on the next fetch.
    pub fn last_poll_timestamp(&self) -> Option<i64> {
        self.last_poll_timestamp
    }

    /// Timestamp to fetch from: the watermark, or the session start before
    /// the first fix arrived.
    pub fn fetch_from(&self) -> i64 {
        self.last_poll_timestamp.unwrap_or(self.start_timestamp)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Clear all state and restart the session at `start_timestamp`.
    pub fn reset(&mut self, start_timestamp: i64) {
        info!("[Session] Reset, starting from {}", start_timestamp);
        self.start_timestamp = start_timestamp;
        self.items.clear();
        self.seen_timestamps.clear();
        self.last_poll_timestamp = None;
        self.classification = None;
        self.baseline = None;
        self.seen_markers.clear();
        self.other_ended_notified = false;
    }

    /// Merge polled records into the buffer.
    ///
    /// Records whose timestamp is already buffered are dropped, whatever their
    /// type. Returns the number of new fixes newer than the previous watermark
    /// and advances the watermark to the newest of them.
    pub fn ingest(&mut self, items: impl IntoIterator<Item = TrackItem>) -> usize {
        let watermark = self.last_poll_timestamp.unwrap_or(i64::MIN);
        let mut newest: Option<i64> = None;
        let mut new_points = 0;
        let mut inserted = 0;

        for item in items {
            let Some(timestamp) = item.timestamp() else {
                continue;
            };
            if !self.seen_timestamps.insert(timestamp) {
                continue;
            }
            if item.is_location() && timestamp > watermark {
                new_points += 1;
                newest = Some(newest.map_or(timestamp, |n| n.max(timestamp)));
            }
            self.items.push(item);
            inserted += 1;
        }

        if inserted > 0 {
            self.items.sort_by_key(|item| item.timestamp());
            self.classification = None;
        }
        if let Some(newest) = newest {
            self.last_poll_timestamp = Some(newest);
        }

        debug!(
            "[Session] Ingested {} records ({} new points), {} buffered",
            inserted,
            new_points,
            self.items.len()
        );
        new_points
    }

    /// Classify the accumulated buffer, reusing the cached result when nothing
    /// changed since the last call.
    pub fn classify(&mut self) -> &Classification {
        let items = &self.items;
        let config = &self.config;
        self.classification
            .get_or_insert_with(|| classify_items(items.iter().cloned(), config))
    }

    /// The cached classification, if the buffer has not changed since.
    pub fn last_classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    /// Snapshot of the cached classification.
    pub fn snapshot(&self) -> Option<RideSnapshot> {
        self.classification
            .as_ref()
            .map(|c| RideSnapshot::from_activities(&c.activities))
    }

    /// Custom markers in the buffer, sorted by timestamp.
    fn markers(&self) -> Vec<Marker> {
        self.items
            .iter()
            .filter_map(|item| match item {
                TrackItem::Lwt(record) if record.custom => Some(Marker::new(
                    record.timestamp,
                    record.activity.clone().unwrap_or_default(),
                )),
                _ => None,
            })
            .collect()
    }

    /// Ingest a poll, re-classify and report ride transitions since the
    /// previous poll.
    ///
    /// - Car and bike: every new start or end marker, before point filtering
    /// - Other: a change in ride count, and the end of the newest ride once
    ///   its stationary tail exceeds the gap threshold (reported once until
    ///   movement resumes)
    ///
    /// The first poll of a session only records a baseline: rides and markers
    /// already present when watching began are never reported.
    pub fn poll(
        &mut self,
        items: impl IntoIterator<Item = TrackItem>,
        now: i64,
    ) -> Vec<RideTransition> {
        self.ingest(items);
        let markers = self.markers();
        let config = self.config.clone();
        let live_config = self.live_config.clone();
        let previous = self.baseline.take();
        let mut seen_markers = std::mem::take(&mut self.seen_markers);
        let mut other_ended_notified = self.other_ended_notified;

        let classification = self.classify();
        let activities = &classification.activities;
        let snapshot = RideSnapshot::from_activities(activities);
        let mut transitions = Vec::new();

        match previous {
            None => {
                seen_markers.extend(marker_timestamps(&markers));
                other_ended_notified = false;
                info!(
                    "[Session] Baseline: {} markers, {} rides over {} points",
                    seen_markers.len(),
                    activities.total_rides(),
                    classification.points.len()
                );
            }
            Some(previous) => {
                transitions.extend(detect_marker_transitions(
                    &markers,
                    &mut seen_markers,
                    now,
                    &live_config,
                ));

                let last_gps = classification.last_point_timestamp().unwrap_or(0);
                if snapshot.counts.other != previous.counts.other {
                    transitions.extend(
                        detect_transitions(&previous, activities, last_gps, now, &live_config)
                            .into_iter()
                            .filter(|t| t.activity == ActivityType::Other),
                    );
                    other_ended_notified = false;
                }

                if let Some(ride) = activities.rides.other.last().filter(|_| last_gps > 0) {
                    let ended = is_residual_ride_ended(ride, &config);
                    if ended && !other_ended_notified {
                        transitions.push(RideTransition {
                            activity: ActivityType::Other,
                            ride_number: activities.rides.other.len(),
                            kind: TransitionKind::Ended,
                            timestamp: ride.end,
                        });
                        other_ended_notified = true;
                    } else if !ended && other_ended_notified {
                        debug!("[Session] Movement resumed after stationary end");
                        other_ended_notified = false;
                    }
                }
            }
        }

        for transition in &transitions {
            info!("[Session] {}", transition.title());
        }

        self.seen_markers = seen_markers;
        self.other_ended_notified = other_ended_notified;
        self.baseline = Some(snapshot);
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::LwtRecord;
    use crate::GpsPoint;

    fn fixes(t0: i64, n: usize) -> Vec<TrackItem> {
        (0..n)
            .map(|i| {
                let point = GpsPoint::new(45.5 + i as f64 * 0.002, -73.5, t0 + i as i64 * 60);
                TrackItem::Location(point)
            })
            .collect()
    }

    #[test]
    fn test_ingest_deduplicates() {
        let mut session = LiveSession::new(0);
        assert_eq!(session.fetch_from(), 0);
        assert_eq!(session.ingest(fixes(100, 5)), 5);
        assert_eq!(session.last_poll_timestamp(), Some(340));

        // Overlapping fetch window resends the newest fix
        assert_eq!(session.ingest(fixes(340, 3)), 2);
        assert_eq!(session.item_count(), 7);
        assert_eq!(session.fetch_from(), 460);
    }

    #[test]
    fn test_marker_sharing_a_timestamp_is_dropped() {
        let mut session = LiveSession::new(0);
        session.ingest(fixes(100, 1));
        session.ingest(vec![TrackItem::Lwt(LwtRecord::marker(100, "car_start"))]);
        assert_eq!(session.item_count(), 1);
    }

    #[test]
    fn test_classification_cached_until_new_data() {
        let mut session = LiveSession::new(0);
        session.ingest(fixes(0, 10));
        assert!(session.last_classification().is_none());

        let first = session.classify().clone();
        assert_eq!(first.activities.rides.other.len(), 1);
        assert_eq!(session.last_classification(), Some(&first));

        session.ingest(Vec::new());
        assert!(session.last_classification().is_some());

        session.ingest(fixes(600, 5));
        assert!(session.last_classification().is_none());
        assert_eq!(session.classify().points.len(), 15);
    }

    #[test]
    fn test_reset() {
        let mut session = LiveSession::new(0);
        session.ingest(fixes(0, 10));
        session.classify();
        session.reset(5000);
        assert_eq!(session.start_timestamp(), 5000);
        assert_eq!(session.item_count(), 0);
        assert_eq!(session.last_poll_timestamp(), None);
        assert!(session.snapshot().is_none());
    }

    #[test]
    fn test_poll_reports_transitions_after_baseline() {
        let mut session = LiveSession::new(0);

        // Baseline: nothing reported
        assert!(session.poll(fixes(0, 3), 120).is_empty());

        // Car started at 180 and is still going
        let mut items = vec![TrackItem::Lwt(LwtRecord::marker(170, "car_start"))];
        items.extend(fixes(180, 6));
        let transitions = session.poll(items, 500);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].activity, ActivityType::Car);
        assert_eq!(transitions[0].kind, TransitionKind::Started);
        assert_eq!(transitions[0].timestamp, 170);

        // End marker, then more fixes while parked
        let mut items = vec![TrackItem::Lwt(LwtRecord::marker(600, "car_end"))];
        items.extend(fixes(630, 2));
        let transitions = session.poll(items, 700);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, TransitionKind::Ended);
        assert_eq!(transitions[0].timestamp, 600);
        assert_eq!(session.snapshot().unwrap().counts.car, 1);
    }

    /// Fixes heading north from `lat0`, one minute apart.
    fn walk_from(lat0: f64, t0: i64, n: usize) -> Vec<TrackItem> {
        (0..n)
            .map(|i| {
                let point = GpsPoint::new(lat0 + i as f64 * 0.002, -73.5, t0 + i as i64 * 60);
                TrackItem::Location(point)
            })
            .collect()
    }

    fn parked(lat: f64, timestamps: impl IntoIterator<Item = i64>) -> Vec<TrackItem> {
        timestamps
            .into_iter()
            .map(|t| TrackItem::Location(GpsPoint::new(lat, -73.5, t)))
            .collect()
    }

    #[test]
    fn test_marker_announced_before_ride_has_enough_points() {
        let mut session = LiveSession::new(0);
        assert!(session.poll(fixes(0, 3), 120).is_empty());

        let mut items = vec![TrackItem::Lwt(LwtRecord::marker(170, "car_start"))];
        items.extend(parked(45.6, [180, 240]));
        let transitions = session.poll(items, 260);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].title(), "Car Ride 1 Started");
        assert_eq!(transitions[0].timestamp, 170);
        // Two points: the ride itself is still filtered out
        assert!(session.classify().activities.rides.car.is_empty());

        let end = vec![TrackItem::Lwt(LwtRecord::marker(300, "car_end"))];
        let transitions = session.poll(end, 310);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].title(), "Car Ride 1 Ended");

        // Nothing new on the next poll
        assert!(session.poll(Vec::new(), 320).is_empty());
    }

    #[test]
    fn test_baseline_markers_never_announced() {
        let mut session = LiveSession::new(0);
        let mut items = vec![TrackItem::Lwt(LwtRecord::marker(0, "bike_start"))];
        items.extend(fixes(10, 8));
        assert!(session.poll(items, 500).is_empty());
        assert!(session.poll(fixes(600, 2), 700).is_empty());
    }

    #[test]
    fn test_walking_end_reported_once_after_long_stop() {
        let mut session = LiveSession::new(0);
        assert!(session.poll(walk_from(45.5, 0, 10), 540).is_empty());

        // Parked for 40 minutes at the last walked position
        let stop = 45.5 + 9.0 * 0.002;
        let transitions = session.poll(parked(stop, (1..=8).map(|i| 540 + i * 300)), 2950);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].activity, ActivityType::Other);
        assert_eq!(transitions[0].kind, TransitionKind::Ended);
        assert_eq!(transitions[0].timestamp, 540);
        assert_eq!(transitions[0].title(), "Walking Ride 1 Ended");
        assert!(session.other_ended_notified);

        // Still parked: not reported again
        assert!(session.poll(parked(stop, [3240]), 3250).is_empty());

        // Walking again opens a new ride and re-arms end detection
        let transitions = session.poll(walk_from(stop, 3300, 10), 3840);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].title(), "Walking Ride 2 Started");
        assert_eq!(transitions[0].timestamp, 3300);
        assert!(!session.other_ended_notified);
    }

    #[test]
    fn test_reset_clears_transition_state() {
        let mut session = LiveSession::new(0);
        session.poll(vec![TrackItem::Lwt(LwtRecord::marker(5, "car_start"))], 10);
        session.reset(100);
        assert!(session.seen_markers.is_empty());

        // After a reset the first poll is a new baseline
        let items = vec![TrackItem::Lwt(LwtRecord::marker(150, "car_start"))];
        assert!(session.poll(items, 160).is_empty());
    }
}
