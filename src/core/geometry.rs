//! Source-receiver geometry: great-circle distance, azimuth and backazimuth.

use crate::types::{BackazimuthGeometry, EventRecord, RotError, RotResult, StationCoordinates};

/// WGS84 semi-major axis in meters
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Distance and forward/backward azimuths between two points on the WGS84
/// ellipsoid (Vincenty inverse formula).
///
/// Returns `(distance_m, azimuth_ab_deg, azimuth_ba_deg)` with azimuths in
/// [0, 360) clockwise from North.
pub fn dist_azimuth(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> RotResult<(f64, f64, f64)> {
    if !(-90.0..=90.0).contains(&lat_a) || !(-90.0..=90.0).contains(&lat_b) {
        return Err(RotError::Processing(format!(
            "latitude out of range: {} / {}",
            lat_a, lat_b
        )));
    }

    let b = WGS84_A * (1.0 - WGS84_F);

    let u1 = ((1.0 - WGS84_F) * lat_a.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * lat_b.to_radians().tan()).atan();
    let l = (lon_b - lon_a).to_radians();

    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    let mut iterations = 0;
    let (mut sin_sigma, mut cos_sigma, mut sigma);
    let (mut cos_sq_alpha, mut cos2_sigma_m);
    loop {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            // coincident points
            return Ok((0.0, 0.0, 0.0));
        }
        cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        cos2_sigma_m = if cos_sq_alpha.abs() < 1e-15 {
            0.0 // equatorial line
        } else {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let lambda_prev = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos2_sigma_m
                            + c * cos_sigma * (-1.0 + 2.0 * cos2_sigma_m * cos2_sigma_m)));
        iterations += 1;
        if (lambda - lambda_prev).abs() < 1e-12 || iterations > 200 {
            break;
        }
    }

    let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - b * b) / (b * b);
    let big_a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
    let delta_sigma = big_b
        * sin_sigma
        * (cos2_sigma_m
            + big_b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * cos2_sigma_m * cos2_sigma_m)
                    - big_b / 6.0
                        * cos2_sigma_m
                        * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                        * (-3.0 + 4.0 * cos2_sigma_m * cos2_sigma_m)));
    let distance = b * big_a * (sigma - delta_sigma);

    let (sin_lambda, cos_lambda) = lambda.sin_cos();
    let alpha12 = (cos_u2 * sin_lambda).atan2(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda);
    let alpha21 = (cos_u1 * sin_lambda).atan2(-sin_u1 * cos_u2 + cos_u1 * sin_u2 * cos_lambda);

    let az_ab = (alpha12.to_degrees() + 360.0) % 360.0;
    let az_ba = (alpha21.to_degrees() + 180.0 + 360.0) % 360.0;

    Ok((distance, az_ab, az_ba))
}

/// Great circle distance in degrees between two points on a sphere
/// (haversine formula).
pub fn locations2degrees(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let lat1 = lat_a.to_radians();
    let lat2 = lat_b.to_radians();
    let dlat = (lat_b - lat_a).to_radians();
    let dlon = (lon_b - lon_a).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    (2.0 * h.sqrt().asin()).to_degrees()
}

impl BackazimuthGeometry {
    /// Derive event-station geometry once per event. The backazimuth is the
    /// azimuth station -> event, the key parameter for rotation and windowing.
    pub fn from_event(event: &EventRecord, station: &StationCoordinates) -> RotResult<Self> {
        let (distance_m, azimuth_deg, backazimuth_deg) = dist_azimuth(
            event.latitude,
            event.longitude,
            station.latitude,
            station.longitude,
        )?;
        let distance_deg = locations2degrees(
            event.latitude,
            event.longitude,
            station.latitude,
            station.longitude,
        );
        Ok(Self {
            distance_m,
            azimuth_deg,
            backazimuth_deg,
            distance_deg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_equator_quarter_circle() {
        let (d, az_ab, az_ba) = dist_azimuth(0.0, 0.0, 0.0, 90.0).unwrap();
        // quarter of the equatorial circumference (2 * pi * a / 4)
        assert_relative_eq!(d, 10_018_754.17, epsilon = 1.0);
        assert_relative_eq!(az_ab, 90.0, epsilon = 1e-6);
        assert_relative_eq!(az_ba, 270.0, epsilon = 1e-6);
    }

    #[test]
    fn test_meridian_azimuths() {
        let (_, az_ab, az_ba) = dist_azimuth(10.0, 20.0, 40.0, 20.0).unwrap();
        assert_relative_eq!(az_ab, 0.0, epsilon = 1e-6);
        assert_relative_eq!(az_ba, 180.0, epsilon = 1e-6);
    }

    #[test]
    fn test_coincident_points() {
        let (d, _, _) = dist_azimuth(49.144001, 12.8782, 49.144001, 12.8782).unwrap();
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_locations2degrees_pole_to_equator() {
        let deg = locations2degrees(90.0, 0.0, 0.0, 0.0);
        assert_relative_eq!(deg, 90.0, epsilon = 1e-9);
    }
}
