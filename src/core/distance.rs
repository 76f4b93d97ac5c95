//! Event distance classification.

use crate::types::DistanceClass;

/// Classify an event from the great circle distance in meters.
///
/// Events under roughly 333 km epicentral distance are "close", under
/// 1111 km "local", everything else "non-local". The nested form with the
/// shared outer `< 10.0` gate is kept on purpose: the inner `< 3.0`
/// refinement only applies inside the outer branch, and downstream window
/// parameters depend on exactly this split.
pub fn classify(distance_m: f64) -> DistanceClass {
    if 0.001 * distance_m / 111.11 < 10.0 {
        if 0.001 * distance_m / 111.11 < 3.0 {
            DistanceClass::Close
        } else {
            DistanceClass::Local
        }
    } else {
        DistanceClass::NonLocal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_boundaries_are_strict() {
        // exactly 3.0 deg -> local, exactly 10.0 deg -> non-local
        let m3 = 3.0 * 111.11 * 1000.0;
        let m10 = 10.0 * 111.11 * 1000.0;
        assert_eq!(classify(m3), DistanceClass::Local);
        assert_eq!(classify(m10), DistanceClass::NonLocal);
        assert_eq!(classify(m3 - 1.0), DistanceClass::Close);
        assert_eq!(classify(m10 - 1.0), DistanceClass::Local);
    }

    #[test]
    fn test_teleseismic_is_non_local() {
        assert_eq!(classify(5_000_000.0), DistanceClass::NonLocal);
    }

    #[test]
    fn test_nearby_is_close() {
        assert_eq!(classify(50_000.0), DistanceClass::Close);
    }
}
