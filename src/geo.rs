//! Advisory geofence evaluation.
//!
//! The attendance service owns the authoritative distance check against a
//! course's registered coordinates; what lives here only powers
//! "you appear far from class" hints before a submission. It must never
//! gate the flow.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance between two points, in meters (haversine).
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi_a = a.lat.to_radians();
    let phi_b = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// Whether `device` lies within `radius_meters` of `reference`.
///
/// Inclusive at the boundary. Pure function of its inputs; no caching.
pub fn within_radius(device: GeoPoint, reference: GeoPoint, radius_meters: f64) -> bool {
    distance_meters(device, reference) <= radius_meters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_within_itself() {
        let p = GeoPoint::new(-17.3935, -66.157);
        assert!(within_radius(p, p, 0.0));
        assert!(within_radius(p, p, 50.0));
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = distance_meters(a, b);
        // One degree of latitude is ~111.2 km on the mean sphere
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(-17.3935, -66.157);
        let b = GeoPoint::new(-17.3942, -66.1485);
        assert!((distance_meters(a, b) - distance_meters(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_outside_radius() {
        // Two corners of a campus, roughly 900 m apart
        let classroom = GeoPoint::new(-17.3935, -66.157);
        let device = GeoPoint::new(-17.3935, -66.1485);
        assert!(!within_radius(device, classroom, 100.0));
        assert!(within_radius(device, classroom, 2_000.0));
    }
}
