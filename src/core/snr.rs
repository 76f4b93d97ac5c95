//! Signal-to-noise ratio against a pre-arrival noise window.

use crate::types::{RotError, RotResult};

/// SNR of a full wave train.
///
/// Peak absolute amplitude over the whole signal divided by the mean
/// amplitude in the noise window [p - 180 s, p - 100 s), where `p_arrival`
/// is the first theoretical P pick in seconds after data start. A noise
/// window or a P pick falling outside the data is a `Processing` error;
/// callers must ensure at least 180 s of pre-event data and a trace covering
/// the pick.
pub fn sn_ratio(signal: &[f64], p_arrival: f64, sampling_rate_hz: f64) -> RotResult<f64> {
    let sr = sampling_rate_hz as usize;
    let p = p_arrival.round() as i64;
    let n0 = sr as i64 * (p - 180);
    let n1 = sr as i64 * (p - 100);
    if n0 < 0 || n0 >= n1 || sr as i64 * p > signal.len() as i64 {
        return Err(RotError::Processing(format!(
            "noise window [{}, {}) for pick at {} s outside signal of {} samples",
            n0,
            n1,
            p,
            signal.len()
        )));
    }
    let noise_window = &signal[n0 as usize..n1 as usize];
    let noise = (noise_window.iter().sum::<f64>() / noise_window.len() as f64).abs();
    if noise == 0.0 {
        return Err(RotError::Processing("zero-mean noise window".into()));
    }
    let peak = signal.iter().fold(0.0_f64, |m, &v| m.max(v.abs()));
    Ok(peak / noise)
}
