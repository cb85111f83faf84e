//! Point-to-ride assignment.
//!
//! Every fix lands in exactly one place: the first car ride containing it,
//! else the first bike ride containing it, else the residual set. Overlapping
//! car and bike intervals are not rejected; the fixed priority order keeps the
//! result deterministic.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{ActivityType, GpsPoint, PerActivity, Ride};

/// Locate the ride containing a timestamp, in priority order.
fn locate(timestamp: i64, rides: &PerActivity<Vec<Ride>>) -> Option<(ActivityType, usize)> {
    ActivityType::MARKER_BASED.iter().find_map(|&activity| {
        rides[activity]
            .iter()
            .position(|ride| ride.contains(timestamp))
            .map(|index| (activity, index))
    })
}

/// Append each point to its containing marker-based ride and return the rest.
///
/// `points` should be sorted by timestamp so that every ride's points stay
/// in time order. The residual points are returned in input order.
pub fn assign_points(points: &[GpsPoint], rides: &mut PerActivity<Vec<Ride>>) -> Vec<GpsPoint> {
    #[cfg(feature = "parallel")]
    let slots: Vec<Option<(ActivityType, usize)>> = {
        let rides: &PerActivity<Vec<Ride>> = rides;
        points.par_iter().map(|p| locate(p.timestamp, rides)).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let slots: Vec<Option<(ActivityType, usize)>> =
        points.iter().map(|p| locate(p.timestamp, rides)).collect();

    let mut residual = Vec::new();
    for (point, slot) in points.iter().zip(slots) {
        match slot {
            Some((activity, index)) => rides[activity][index].points.push(*point),
            None => residual.push(*point),
        }
    }

    residual
}
