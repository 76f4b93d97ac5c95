//! Horizontal phase velocity from amplitude ratios in well-correlated
//! windows.

use crate::types::BandVelocitySummary;

/// Correlation threshold below which a window yields no velocity
pub const VELOCITY_THRESHOLD: f64 = 0.75;

/// Phase velocities in km/s per correlation window.
///
/// For windows at or above the correlation threshold the velocity is half
/// the ratio of peak transverse acceleration (nm/s^2) to peak rotation rate
/// (nrad/s), scaled to km/s; below the threshold the window is undefined.
/// `start_index` skips the pre-surface-wave windows of the broadband signal
/// (the band signals start at 0).
pub fn phase_velocities(
    rotation: &[f64],
    sampling_rate_hz: f64,
    window_seconds: usize,
    coefficients: &[f64],
    transverse: &[f64],
    start_index: usize,
) -> Vec<Option<f64>> {
    let sr = sampling_rate_hz as usize;
    let step = sr * window_seconds;
    let mut velocities = Vec::with_capacity(coefficients.len().saturating_sub(start_index));
    for (i, &coeff) in coefficients.iter().enumerate().skip(start_index) {
        if coeff < VELOCITY_THRESHOLD || step == 0 {
            velocities.push(None);
            continue;
        }
        let r0 = (step * i).min(rotation.len());
        let r1 = (step * (i + 1)).min(rotation.len());
        let t0 = (step * i).min(transverse.len());
        let t1 = (step * (i + 1)).min(transverse.len());
        let rot_peak = rotation[r0..r1].iter().fold(0.0_f64, |m, &v| m.max(v.abs()));
        let acc_peak = transverse[t0..t1].iter().fold(0.0_f64, |m, &v| m.max(v.abs()));
        if rot_peak == 0.0 {
            velocities.push(None);
        } else {
            velocities.push(Some(0.001 * 0.5 * acc_peak / rot_peak));
        }
    }
    velocities
}

/// Mean and population standard deviation over the defined velocities only.
///
/// Returns `(None, None)` when every window is undefined.
pub fn velocity_statistics(velocities: &[Option<f64>]) -> (Option<f64>, Option<f64>) {
    let defined: Vec<f64> = velocities.iter().filter_map(|v| *v).collect();
    if defined.is_empty() {
        return (None, None);
    }
    let n = defined.len() as f64;
    let mean = defined.iter().sum::<f64>() / n;
    let var = defined.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (Some(mean), Some(var.sqrt()))
}

/// Per-band summary record from the band's velocity windows
pub fn band_summary(
    freqmin: f64,
    freqmax: f64,
    velocities: &[Option<f64>],
) -> BandVelocitySummary {
    let (mean_km_s, std_km_s) = velocity_statistics(velocities);
    BandVelocitySummary {
        freqmin,
        freqmax,
        mean_km_s,
        std_km_s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_velocity_from_amplitude_ratio() {
        // transverse = 8000 x rotation: v = 0.001 * 0.5 * 8000 = 4 km/s
        let rotation: Vec<f64> = (0..100).map(|i| (i as f64 * 0.3).sin()).collect();
        let transverse: Vec<f64> = rotation.iter().map(|v| 8000.0 * v).collect();
        let coeffs = vec![1.0, 1.0];
        let v = phase_velocities(&rotation, 5.0, 10, &coeffs, &transverse, 0);
        assert_eq!(v.len(), 2);
        assert_relative_eq!(v[0].unwrap(), 4.0, epsilon = 1e-9);
        assert_relative_eq!(v[1].unwrap(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_threshold_gates_windows() {
        let rotation = vec![1.0; 100];
        let transverse = vec![2.0; 100];
        let coeffs = vec![0.74, 0.75, 0.9];
        let v = phase_velocities(&rotation, 5.0, 4, &coeffs, &transverse, 0);
        assert!(v[0].is_none());
        assert!(v[1].is_some());
        assert!(v[2].is_some());
    }

    #[test]
    fn test_start_index_skips_early_windows() {
        let rotation = vec![1.0; 200];
        let transverse = vec![2.0; 200];
        let coeffs = vec![1.0; 5];
        let v = phase_velocities(&rotation, 5.0, 4, &coeffs, &transverse, 3);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_statistics_ignore_undefined() {
        let v = vec![Some(3.0), None, Some(5.0), None];
        let (mean, std) = velocity_statistics(&v);
        assert_relative_eq!(mean.unwrap(), 4.0);
        assert_relative_eq!(std.unwrap(), 1.0);
    }

    #[test]
    fn test_statistics_all_undefined() {
        let (mean, std) = velocity_statistics(&[None, None]);
        assert!(mean.is_none());
        assert!(std.is_none());
    }
}
