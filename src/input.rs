//! OwnTracks record decoding.
//!
//! The location source delivers a JSON array of records tagged by `_type`:
//! `location` records are GPS fixes and `lwt` records flagged `custom: true`
//! are lifecycle markers. Every other record type is ignored.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::{GpsPoint, Marker};

/// An `lwt` record. Only records with `custom == true` are activity markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwtRecord {
    #[serde(rename = "tst")]
    pub timestamp: i64,
    #[serde(default)]
    pub custom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
}

impl LwtRecord {
    /// Build a custom activity marker record.
    pub fn marker(timestamp: i64, activity: impl Into<String>) -> Self {
        Self {
            timestamp,
            custom: true,
            activity: Some(activity.into()),
        }
    }
}

/// A single record from the location source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "lowercase")]
pub enum TrackItem {
    Location(GpsPoint),
    Lwt(LwtRecord),
    #[serde(other)]
    Unknown,
}

impl TrackItem {
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            TrackItem::Location(point) => Some(point.timestamp),
            TrackItem::Lwt(record) => Some(record.timestamp),
            TrackItem::Unknown => None,
        }
    }

    pub fn is_location(&self) -> bool {
        matches!(self, TrackItem::Location(_))
    }
}

/// Separate GPS fixes from activity markers.
///
/// Order is preserved; callers sort before classification.
///
/// # Example
/// ```
/// use ride_detector::{parse_items_json, split_items};
///
/// let items = parse_items_json(r#"[
///     {"_type": "location", "lat": 45.5, "lon": -73.5, "tst": 100, "acc": 5},
///     {"_type": "lwt", "tst": 90, "custom": true, "activity": "car_start"},
///     {"_type": "lwt", "tst": 95},
///     {"_type": "transition", "tst": 99}
/// ]"#).unwrap();
///
/// let (points, markers) = split_items(items);
/// assert_eq!(points.len(), 1);
/// assert_eq!(markers.len(), 1);
/// assert_eq!(markers[0].activity, "car_start");
/// ```
pub fn split_items(items: impl IntoIterator<Item = TrackItem>) -> (Vec<GpsPoint>, Vec<Marker>) {
    let mut points = Vec::new();
    let mut markers = Vec::new();

    for item in items {
        match item {
            TrackItem::Location(point) => points.push(point),
            TrackItem::Lwt(record) if record.custom => {
                markers.push(Marker::new(
                    record.timestamp,
                    record.activity.unwrap_or_default(),
                ));
            }
            TrackItem::Lwt(_) | TrackItem::Unknown => {}
        }
    }

    (points, markers)
}

/// Decode a JSON array of OwnTracks records.
pub fn parse_items_json(json: &str) -> Result<Vec<TrackItem>> {
    Ok(serde_json::from_str(json)?)
}
