//! Distance-class dependent truncation and decimation.
//!
//! Keeps the undecimated (close/local) or lightly decimated (non-local)
//! P-coda copies alongside the heavier decimated main signals.

use crate::core::filter::{zero_phase, FilterBand};
use crate::types::{DistanceClass, RotError, RotResult, WaveformBundle};

/// Processing parameters fixed by the distance class.
#[derive(Debug, Clone, Copy)]
pub struct ClassParams {
    /// Correlation window length for the main signal, seconds
    pub window_seconds: usize,
    /// Lowpass cutoff for the main signal, Hz
    pub cutoff: f64,
    /// Highpass cutoff for the P-coda variants, Hz
    pub cutoff_pc: f64,
    /// Correlation window length for the P-coda signal, seconds
    pub pcoda_window_seconds: usize,
}

impl ClassParams {
    pub fn for_class(class: DistanceClass) -> Self {
        match class {
            DistanceClass::Close => Self {
                window_seconds: 3,
                cutoff: 4.0,
                cutoff_pc: 0.5,
                pcoda_window_seconds: 2,
            },
            DistanceClass::Local => Self {
                window_seconds: 5,
                cutoff: 2.0,
                cutoff_pc: 0.5,
                pcoda_window_seconds: 2,
            },
            DistanceClass::NonLocal => Self {
                window_seconds: 120,
                cutoff: 1.0,
                cutoff_pc: 0.5,
                pcoda_window_seconds: 5,
            },
        }
    }
}

/// Main and P-coda bundles after class-dependent resampling
#[derive(Debug, Clone)]
pub struct ResampleOutput {
    pub main: WaveformBundle,
    pub pcoda: WaveformBundle,
    pub params: ClassParams,
}

/// Decimate a channel in place by an integer factor.
///
/// An anti-alias zero-phase lowpass at 0.4x the new sampling rate runs first.
/// A zero factor is a programming defect and reported as `Aliasing`.
pub fn decimate(
    channel: &mut crate::types::WaveformChannel,
    factor: usize,
) -> RotResult<()> {
    if factor == 0 {
        return Err(RotError::Aliasing("decimation factor must be >= 1".into()));
    }
    if factor == 1 {
        return Ok(());
    }
    let new_rate = channel.sampling_rate / factor as f64;
    // anti-alias guard band below the new Nyquist
    zero_phase(channel, FilterBand::Lowpass(0.4 * new_rate), 4)?;
    channel.data = channel.data.iter().step_by(factor).copied().collect();
    channel.sampling_rate = new_rate;
    Ok(())
}

fn truncate(channel: &mut crate::types::WaveformChannel, seconds: f64) {
    let keep = ((seconds * channel.sampling_rate) as usize).min(channel.len());
    channel.data = channel.data.slice(ndarray::s![..keep]).to_owned();
}

/// Resample the raw bundle per distance class.
///
/// Close/local events keep only the first 1800 s and decimate the main
/// signal by 2; the P-coda copy stays at the original rate. Non-local events
/// keep the full window, decimate the P-coda copy by 2 and the main signal
/// by 4.
pub fn resample(class: DistanceClass, bundle: WaveformBundle) -> RotResult<ResampleOutput> {
    let params = ClassParams::for_class(class);
    let mut main = bundle;

    let output = match class {
        DistanceClass::Close | DistanceClass::Local => {
            for ch in main.channels_mut() {
                truncate(ch, 1800.0);
            }
            let pcoda = main.clone();
            for ch in main.channels_mut() {
                decimate(ch, 2)?;
            }
            ResampleOutput {
                main,
                pcoda,
                params,
            }
        }
        DistanceClass::NonLocal => {
            let mut pcoda = main.clone();
            for ch in pcoda.channels_mut() {
                decimate(ch, 2)?;
            }
            for ch in main.channels_mut() {
                decimate(ch, 4)?;
            }
            ResampleOutput {
                main,
                pcoda,
                params,
            }
        }
    };

    log::debug!(
        "resampled as {}: main {} Hz, pcoda {} Hz, sec {} s",
        class,
        output.main.rotation.sampling_rate,
        output.pcoda.rotation.sampling_rate,
        output.params.window_seconds
    );
    Ok(output)
}
