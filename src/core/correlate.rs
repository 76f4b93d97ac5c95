//! Windowed zero-lag cross-correlation and backazimuth grid searches.

use ndarray::Array2;

use crate::core::rotate::rotate_ne_rt;
use crate::types::{BackazimuthEstimate, BackazimuthGrid, CorrelationSeries, RotResult};

/// Normalized zero-lag cross-correlation of two demeaned windows.
///
/// Windows of unequal length are compared over their common prefix. Zero
/// energy on either side yields 0.0 rather than a division error.
pub fn xcorr_zero_lag(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut ea = 0.0;
    let mut eb = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        num += da * db;
        ea += da * da;
        eb += db * db;
    }
    if ea == 0.0 || eb == 0.0 {
        return 0.0;
    }
    num / (ea * eb).sqrt()
}

/// Correlation coefficients for consecutive non-overlapping windows.
///
/// The window count comes from the rotation side; a trailing partial window
/// is dropped. Each side is indexed with its own sampling rate, so the two
/// signals may run at different rates.
pub fn windowed_correlation(
    rotation: &[f64],
    rotation_rate_hz: f64,
    target: &[f64],
    target_rate_hz: f64,
    window_seconds: usize,
) -> CorrelationSeries {
    let rot_sr = rotation_rate_hz as usize;
    let tgt_sr = target_rate_hz as usize;
    let rot_step = rot_sr * window_seconds;
    let tgt_step = tgt_sr * window_seconds;
    let count = if rot_step == 0 {
        0
    } else {
        rotation.len() / rot_step
    };

    let mut coefficients = Vec::with_capacity(count);
    for w in 0..count {
        let rot_win = &rotation[rot_step * w..rot_step * (w + 1)];
        let t0 = (tgt_step * w).min(target.len());
        let t1 = (tgt_step * (w + 1)).min(target.len());
        coefficients.push(xcorr_zero_lag(rot_win, &target[t0..t1]));
    }
    CorrelationSeries {
        window_seconds,
        coefficients,
    }
}

/// Coarse backazimuth scan in 10 degree steps.
///
/// For each candidate azimuth the horizontals are re-rotated (optionally only
/// their first `limit` samples) and correlated window by window against the
/// rotation signal. The window count follows the reference correlation
/// series so grid columns line up with it.
pub fn coarse_backazimuth_grid(
    rotation: &[f64],
    rotation_rate_hz: f64,
    north: &[f64],
    east: &[f64],
    target_rate_hz: f64,
    window_seconds: usize,
    window_count: usize,
    limit: Option<usize>,
) -> RotResult<BackazimuthGrid> {
    let azimuths: Vec<f64> = (0..36).map(|i| 10.0 * i as f64).collect();
    let end = limit
        .unwrap_or_else(|| north.len().min(east.len()))
        .min(north.len())
        .min(east.len());

    let mut grid = Array2::<f64>::zeros((azimuths.len(), window_count));
    for (ai, &az) in azimuths.iter().enumerate() {
        let (_, transverse) = rotate_ne_rt(&north[..end], &east[..end], az)?;
        let series = windowed_correlation(
            rotation,
            rotation_rate_hz,
            &transverse,
            target_rate_hz,
            window_seconds,
        );
        for w in 0..window_count {
            grid[[ai, w]] = series.coefficients.get(w).copied().unwrap_or(0.0);
        }
    }

    let mut best_azimuth = Vec::with_capacity(window_count);
    let mut max_coefficient = Vec::with_capacity(window_count);
    for w in 0..window_count {
        let mut best = 0usize;
        let mut best_val = f64::NEG_INFINITY;
        for ai in 0..azimuths.len() {
            if grid[[ai, w]] > best_val {
                best_val = grid[[ai, w]];
                best = ai;
            }
        }
        best_azimuth.push(azimuths[best]);
        max_coefficient.push(best_val);
    }

    Ok(BackazimuthGrid {
        azimuths,
        grid,
        best_azimuth,
        max_coefficient,
    })
}

/// Correlation sum threshold for the fine estimate
const EBA_THRESHOLD: f64 = 0.9;
/// Sub-window length for the fine estimate, seconds
const EBA_WINDOW_SECONDS: usize = 30;

/// Fine backazimuth estimate over the S-wave to late surface-wave interval.
///
/// All three signals are sliced to [min_sw, max_lwf] (nearest sample) and
/// correlated in 30 s sub-windows for every whole-degree candidate. Per
/// candidate, coefficients at or above 0.9 are summed; the estimate is the
/// candidate with the largest sum, undefined when no window anywhere reaches
/// the threshold.
pub fn estimate_backazimuth(
    rotation: &[f64],
    north: &[f64],
    east: &[f64],
    sampling_rate_hz: f64,
    min_sw: f64,
    max_lwf: f64,
) -> RotResult<BackazimuthEstimate> {
    let i0 = ((min_sw * sampling_rate_hz).round() as usize).min(rotation.len());
    let i1 = ((max_lwf * sampling_rate_hz).round() as usize).min(rotation.len());
    let i1 = i1.min(north.len()).min(east.len());
    let i0 = i0.min(i1);

    let rot = &rotation[i0..i1];
    let n = &north[i0..i1];
    let e = &east[i0..i1];

    let mut correlation_sums = Vec::with_capacity(360);
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(360);
    for az in 0..360 {
        let (_, transverse) = rotate_ne_rt(n, e, az as f64)?;
        let series = windowed_correlation(
            rot,
            sampling_rate_hz,
            &transverse,
            sampling_rate_hz,
            EBA_WINDOW_SECONDS,
        );
        let sum: f64 = series
            .coefficients
            .iter()
            .map(|&c| if c >= EBA_THRESHOLD { c } else { 0.0 })
            .sum();
        correlation_sums.push(sum);
        rows.push(series.coefficients);
    }

    let max_sum = correlation_sums.iter().cloned().fold(0.0, f64::max);
    if max_sum == 0.0 {
        return Ok(BackazimuthEstimate {
            backazimuth_deg: None,
            max_coefficient: None,
            correlation_sums,
        });
    }

    let best = correlation_sums
        .iter()
        .enumerate()
        .fold((0usize, f64::NEG_INFINITY), |acc, (i, &s)| {
            if s > acc.1 {
                (i, s)
            } else {
                acc
            }
        })
        .0;
    let max_coefficient = rows[best].iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    log::debug!(
        "estimated backazimuth {} deg, max coefficient {:.3}",
        best,
        max_coefficient
    );
    Ok(BackazimuthEstimate {
        backazimuth_deg: Some(best as f64),
        max_coefficient: Some(max_coefficient),
        correlation_sums,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_self_correlation_is_one() {
        let x = sine(0.05, 5.0, 600);
        assert_relative_eq!(xcorr_zero_lag(&x, &x), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_negated_correlation_is_minus_one() {
        let x = sine(0.05, 5.0, 600);
        let y: Vec<f64> = x.iter().map(|v| -3.0 * v).collect();
        assert_relative_eq!(xcorr_zero_lag(&x, &y), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_offset_does_not_change_correlation() {
        // coefficients are computed on demeaned windows
        let x = sine(0.05, 5.0, 600);
        let y: Vec<f64> = x.iter().map(|v| v + 100.0).collect();
        assert_relative_eq!(xcorr_zero_lag(&x, &y), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_signal_yields_zero() {
        let x = vec![2.0; 100];
        let y = sine(0.05, 5.0, 100);
        assert_eq!(xcorr_zero_lag(&x, &y), 0.0);
    }

    #[test]
    fn test_window_count_drops_partial() {
        // 1000 samples at 5 Hz with 30 s windows: 1000 / 150 = 6
        let x = sine(0.05, 5.0, 1000);
        let series = windowed_correlation(&x, 5.0, &x, 5.0, 30);
        assert_eq!(series.len(), 6);
        for &c in &series.coefficients {
            assert_relative_eq!(c, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_mixed_rates_window_alignment() {
        // rotation at 5 Hz, target at 10 Hz: window counts follow the
        // rotation side, target windows twice as many samples
        let rot = sine(0.05, 5.0, 600);
        let tgt = sine(0.05, 10.0, 1200);
        let series = windowed_correlation(&rot, 5.0, &tgt, 10.0, 30);
        assert_eq!(series.len(), 4);
    }

    /// Build north/east so that at `ba_deg` the transverse equals `t` and
    /// the radial equals `r` (inverse of `rotate_ne_rt`).
    fn ne_from_rt(r: &[f64], t: &[f64], ba_deg: f64) -> (Vec<f64>, Vec<f64>) {
        let ba = ba_deg.to_radians();
        let (sin_ba, cos_ba) = ba.sin_cos();
        let north = r
            .iter()
            .zip(t)
            .map(|(&rv, &tv)| -rv * cos_ba + tv * sin_ba)
            .collect();
        let east = r
            .iter()
            .zip(t)
            .map(|(&rv, &tv)| -rv * sin_ba - tv * cos_ba)
            .collect();
        (north, east)
    }

    #[test]
    fn test_coarse_grid_recovers_rotation_azimuth() {
        // transverse follows the rotation at backazimuth 140; a stronger
        // off-frequency radial makes the correlation fall off the true
        // azimuth
        let fs = 5.0;
        let rot = sine(0.04, fs, 3000);
        let radial: Vec<f64> = sine(0.09, fs, 3000).iter().map(|v| 2.0 * v).collect();
        let (north, east) = ne_from_rt(&radial, &rot, 140.0);
        let series = windowed_correlation(&rot, fs, &rot, fs, 60);
        let grid =
            coarse_backazimuth_grid(&rot, fs, &north, &east, fs, 60, series.len(), None).unwrap();
        for w in 0..series.len() {
            assert_eq!(grid.best_azimuth[w], 140.0);
            assert_relative_eq!(grid.max_coefficient[w], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fine_estimate_recovers_azimuth() {
        let fs = 5.0;
        let rot = sine(0.04, fs, 6000);
        let radial: Vec<f64> = sine(0.09, fs, 6000).iter().map(|v| 2.0 * v).collect();
        let (north, east) = ne_from_rt(&radial, &rot, 73.0);
        let est = estimate_backazimuth(&rot, &north, &east, fs, 0.0, 1200.0).unwrap();
        assert_eq!(est.backazimuth_deg, Some(73.0));
        assert_relative_eq!(est.max_coefficient.unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fine_estimate_undefined_on_noise() {
        // uncorrelated deterministic pseudo noise never reaches 0.9
        let fs = 5.0;
        let rot: Vec<f64> = (0..3000).map(|i| ((i * 2654435761_usize) % 1000) as f64).collect();
        let north = sine(0.04, fs, 3000);
        let east = sine(0.09, fs, 3000);
        let est = estimate_backazimuth(&rot, &north, &east, fs, 0.0, 600.0).unwrap();
        assert_eq!(est.backazimuth_deg, None);
        assert_eq!(est.max_coefficient, None);
        assert_eq!(est.correlation_sums.len(), 360);
    }
}
