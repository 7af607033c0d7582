//! Great-circle distance.

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Distance in metres between two points given in degrees, by the spherical
/// law of cosines.
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dlambda = (lon2 - lon1).to_radians();
    // Rounding can push the cosine just outside [-1, 1] for (anti)podal points.
    let cos_c = (phi1.sin() * phi2.sin() + phi1.cos() * phi2.cos() * dlambda.cos())
        .clamp(-1.0, 1.0);
    cos_c.acos() * EARTH_RADIUS_M
}

/// Returns `true` if `(lat, lon)` is strictly closer than `radius_m` to the
/// centre point.
pub fn within(center_lat: f64, center_lon: f64, lat: f64, lon: f64, radius_m: f64) -> bool {
    distance_m(center_lat, center_lon, lat, lon) < radius_m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_near_zero() {
        assert!(distance_m(38.8977, -77.0366, 38.8977, -77.0366) < 1.0);
    }

    #[test]
    fn one_degree_of_longitude_on_equator() {
        let d = distance_m(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn washington_to_new_york() {
        let d = distance_m(38.8977, -77.0366, 40.7128, -74.0060);
        assert!((325_000.0..335_000.0).contains(&d), "got {d}");
        assert!(within(38.8977, -77.0366, 40.7128, -74.0060, 400_000.0));
        assert!(!within(38.8977, -77.0366, 40.7128, -74.0060, 300_000.0));
    }

    #[test]
    fn radius_is_exclusive() {
        let d = distance_m(0.0, 0.0, 0.0, 1.0);
        assert!(!within(0.0, 0.0, 0.0, 1.0, d));
    }
}
