//! Chronological activity timeline.
//!
//! When residual rides exist, the stretches between car and bike rides are
//! reported as generated `other_start`/`other_end` events around the real
//! marker rides. Otherwise the raw markers are listed as they arrived.

use serde::{Deserialize, Serialize};

use crate::{ActivityCollection, GpsPoint, Marker};

/// Whether an event came from a real marker ride or was inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Real,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: i64,
    /// e.g. `car_start`, `other_end`, or a raw marker activity
    pub event: String,
    #[serde(rename = "type")]
    pub source: EventSource,
}

impl TimelineEvent {
    fn new(timestamp: i64, event: impl Into<String>, source: EventSource) -> Self {
        Self {
            timestamp,
            event: event.into(),
            source,
        }
    }
}

/// Build the timeline for a classified window, sorted by timestamp.
pub fn build_timeline(
    points: &[GpsPoint],
    activities: &ActivityCollection,
    markers: &[Marker],
) -> Vec<TimelineEvent> {
    let mut timeline = Vec::new();

    if activities.rides.other.is_empty() {
        timeline.extend(
            markers
                .iter()
                .map(|m| TimelineEvent::new(m.timestamp, m.activity.clone(), EventSource::Real)),
        );
    } else {
        let first = points.iter().map(|p| p.timestamp).min().unwrap_or(0);
        let last = points.iter().map(|p| p.timestamp).max().unwrap_or(0);
        let mut cursor = first;

        for (activity, ride) in activities.marker_rides_by_start() {
            if cursor < ride.start {
                timeline.push(TimelineEvent::new(cursor, "other_start", EventSource::Generated));
                timeline.push(TimelineEvent::new(ride.start, "other_end", EventSource::Generated));
            }
            timeline.push(TimelineEvent::new(
                ride.start,
                format!("{}_start", activity),
                EventSource::Real,
            ));
            timeline.push(TimelineEvent::new(
                ride.end,
                format!("{}_end", activity),
                EventSource::Real,
            ));
            cursor = ride.end;
        }

        if cursor < last {
            timeline.push(TimelineEvent::new(cursor, "other_start", EventSource::Generated));
            timeline.push(TimelineEvent::new(last, "other_end", EventSource::Generated));
        }
    }

    timeline.sort_by_key(|event| event.timestamp);
    timeline
}
