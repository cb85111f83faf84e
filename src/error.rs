//! Unified error handling for the ride-detector library.
//!
//! Classification never aborts: a stage that fails falls back to a
//! best-effort value and reports the cause through [`Outcome::Degraded`].

use std::fmt;

use serde::{Serialize, Serializer};

use crate::ActivityType;

/// Unified error type for ride-detector operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentationError {
    /// A GPS fix has non-finite or out-of-range coordinates
    InvalidCoordinates {
        timestamp: i64,
        latitude: f64,
        longitude: f64,
    },
    /// A ride produced a statistic that cannot be aggregated
    InvalidStatistic {
        activity: ActivityType,
        message: String,
    },
    /// Input records could not be decoded
    InvalidInput { message: String },
}

impl fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentationError::InvalidCoordinates {
                timestamp,
                latitude,
                longitude,
            } => {
                write!(
                    f,
                    "Point at {} has invalid coordinates ({}, {})",
                    timestamp, latitude, longitude
                )
            }
            SegmentationError::InvalidStatistic { activity, message } => {
                write!(f, "Invalid {} statistic: {}", activity, message)
            }
            SegmentationError::InvalidInput { message } => {
                write!(f, "Invalid input: {}", message)
            }
        }
    }
}

impl std::error::Error for SegmentationError {}

impl From<serde_json::Error> for SegmentationError {
    fn from(err: serde_json::Error) -> Self {
        SegmentationError::InvalidInput {
            message: err.to_string(),
        }
    }
}

// Surfaced to JSON consumers as the human-readable message.
impl Serialize for SegmentationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result type alias for ride-detector operations.
pub type Result<T> = std::result::Result<T, SegmentationError>;

/// Result of a stage that degrades instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The stage ran to completion
    Complete(T),
    /// The stage failed and `value` is its fallback
    Degraded { value: T, cause: SegmentationError },
}

impl<T> Outcome<T> {
    /// Build an outcome from a fallible computation and its fallback.
    pub fn from_result(result: Result<T>, fallback: impl FnOnce() -> T) -> Self {
        match result {
            Ok(value) => Outcome::Complete(value),
            Err(cause) => Outcome::Degraded {
                value: fallback(),
                cause,
            },
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Complete(value) | Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        self.into_parts().0
    }

    /// Split into the value and the degradation cause, if any.
    pub fn into_parts(self) -> (T, Option<SegmentationError>) {
        match self {
            Outcome::Complete(value) => (value, None),
            Outcome::Degraded { value, cause } => (value, Some(cause)),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn cause(&self) -> Option<&SegmentationError> {
        match self {
            Outcome::Complete(_) => None,
            Outcome::Degraded { cause, .. } => Some(cause),
        }
    }
}
