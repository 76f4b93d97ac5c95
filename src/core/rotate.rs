//! Horizontal component rotation into the ray-aligned frame.

use crate::types::{RotError, RotResult};

/// Rotate north/east components to radial/transverse for a given backazimuth
/// in degrees.
///
/// Returns `(radial, transverse)`. The sign convention makes the radial
/// component point from the station towards the event.
pub fn rotate_ne_rt(north: &[f64], east: &[f64], backazimuth_deg: f64) -> RotResult<(Vec<f64>, Vec<f64>)> {
    if north.len() != east.len() {
        return Err(RotError::Processing(format!(
            "component length mismatch: north {} vs east {}",
            north.len(),
            east.len()
        )));
    }
    if !(0.0..=360.0).contains(&backazimuth_deg) {
        return Err(RotError::Processing(format!(
            "backazimuth out of range: {}",
            backazimuth_deg
        )));
    }
    let ba = backazimuth_deg.to_radians();
    let (sin_ba, cos_ba) = ba.sin_cos();
    let radial = north
        .iter()
        .zip(east)
        .map(|(&n, &e)| -e * sin_ba - n * cos_ba)
        .collect();
    let transverse = north
        .iter()
        .zip(east)
        .map(|(&n, &e)| -e * cos_ba + n * sin_ba)
        .collect();
    Ok((radial, transverse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_backazimuth_maps_north_to_negative_radial() {
        let n = vec![1.0, 2.0];
        let e = vec![0.0, 0.0];
        let (r, t) = rotate_ne_rt(&n, &e, 0.0).unwrap();
        assert_relative_eq!(r[0], -1.0);
        assert_relative_eq!(r[1], -2.0);
        assert_relative_eq!(t[0], 0.0);
    }

    #[test]
    fn test_full_turn_equals_zero() {
        let n = vec![0.3, -1.2, 0.7];
        let e = vec![-0.5, 0.9, 0.1];
        let (r0, t0) = rotate_ne_rt(&n, &e, 0.0).unwrap();
        let (r1, t1) = rotate_ne_rt(&n, &e, 360.0).unwrap();
        for i in 0..3 {
            assert_relative_eq!(r0[i], r1[i], epsilon = 1e-12);
            assert_relative_eq!(t0[i], t1[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ninety_degrees_swaps_components() {
        let n = vec![1.0];
        let e = vec![2.0];
        let (r, t) = rotate_ne_rt(&n, &e, 90.0).unwrap();
        assert_relative_eq!(r[0], -2.0, epsilon = 1e-12);
        assert_relative_eq!(t[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(rotate_ne_rt(&[1.0], &[1.0, 2.0], 10.0).is_err());
    }

    #[test]
    fn test_out_of_range_backazimuth_rejected() {
        assert!(rotate_ne_rt(&[1.0], &[1.0], 400.0).is_err());
    }
}
