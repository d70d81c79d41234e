//! Geofence containment evaluation.
//!
//! Pure functions only: deterministic given inputs, no I/O, which is what
//! makes containment independently unit-testable.

use crate::api::models::Geofence;

/// Earth's mean radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two coordinates, using the
/// haversine formula.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Whether a point lies inside a geofence (boundary counts as inside).
pub fn contains(lat: f64, lon: f64, fence: &Geofence) -> bool {
    haversine_distance_m(lat, lon, fence.lat, fence.lon) <= f64::from(fence.radius_meters)
}
