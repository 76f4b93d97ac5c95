//! Instrument response removal.
//!
//! Rotation-rate channels carry a flat response and only need the scalar
//! ring-laser calibration. Acceleration channels are deconvolved in the
//! frequency domain with the seismometer poles and zeros, water-level
//! stabilized.

use num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

use crate::core::filter::{detrend_linear, taper, zero_phase, FilterBand};
use crate::types::{
    Polarity, RingLaser, RotError, RotResult, Seismometer, StationConfig, Units, WaveformBundle,
    WaveformChannel,
};

/// Water level for spectral division, dB below the response maximum
pub const WATER_LEVEL_DB: f64 = 600.0;

/// Poles-and-zeros transfer function in the Laplace domain.
///
/// The constants are scaled so that deconvolving raw counts yields
/// acceleration in nm/s^2 directly.
#[derive(Debug, Clone)]
pub struct PazResponse {
    pub poles: Vec<Complex64>,
    pub zeros: Vec<Complex64>,
    pub gain: f64,
    pub sensitivity: f64,
}

impl PazResponse {
    /// STS-2 broadband, one zero for acceleration output
    pub fn sts2() -> Self {
        Self {
            poles: vec![
                Complex64::new(-0.0367429, 0.036754),
                Complex64::new(-0.0367429, -0.036754),
            ],
            zeros: vec![Complex64::new(0.0, 0.0)],
            gain: 1.0,
            sensitivity: 0.944019640,
        }
    }

    /// Lennartz LE-3D 5s
    pub fn lennartz() -> Self {
        Self {
            poles: vec![
                Complex64::new(-0.22, 0.235),
                Complex64::new(-0.22, -0.235),
                Complex64::new(-0.23, 0.0),
            ],
            zeros: vec![Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)],
            gain: 1.0,
            sensitivity: 1.0,
        }
    }

    /// Transfer function value at angular frequency `2*pi*f`
    fn evaluate(&self, freq_hz: f64) -> Complex64 {
        let s = Complex64::new(0.0, 2.0 * PI * freq_hz);
        let num = self
            .zeros
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, z| acc * (s - z));
        let den = self
            .poles
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, p| acc * (s - p));
        self.gain * num / den
    }
}

/// Deconvolve the instrument response from a channel in place.
///
/// Spectral division with a water level: response values more than
/// `water_level_db` below the response maximum are raised to that floor
/// before inversion, which keeps near-zero bins (DC for an acceleration
/// response) from exploding.
pub fn remove_response(
    channel: &mut WaveformChannel,
    paz: &PazResponse,
    water_level_db: f64,
) -> RotResult<()> {
    let n = channel.len();
    if n == 0 {
        return Err(RotError::DataGap("empty channel in response removal".into()));
    }

    let mut spectrum: Vec<Complex64> = channel
        .data
        .iter()
        .map(|&v| Complex64::new(v, 0.0))
        .collect();
    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(n).process(&mut spectrum);

    // response at every FFT bin, negative frequencies in the upper half
    let df = channel.sampling_rate / n as f64;
    let mut response: Vec<Complex64> = (0..n)
        .map(|k| {
            let freq = if k <= n / 2 {
                k as f64 * df
            } else {
                (k as f64 - n as f64) * df
            };
            paz.evaluate(freq)
        })
        .collect();

    let max_amp = response.iter().map(|r| r.norm()).fold(0.0, f64::max);
    if max_amp == 0.0 {
        return Err(RotError::Processing("all-zero instrument response".into()));
    }
    let floor = max_amp * 10f64.powf(-water_level_db / 20.0);
    for r in response.iter_mut() {
        let amp = r.norm();
        if amp < floor {
            *r = if amp == 0.0 {
                Complex64::new(floor, 0.0)
            } else {
                *r * (floor / amp)
            };
        }
    }

    for (s, r) in spectrum.iter_mut().zip(&response) {
        *s /= r;
    }
    // the acceleration response has no DC passband; drop the zero-frequency
    // bin instead of letting the water-level floor amplify a residual offset
    spectrum[0] = Complex64::new(0.0, 0.0);
    planner.plan_fft_inverse(n).process(&mut spectrum);

    let scale = 1.0 / (n as f64 * paz.sensitivity);
    for (v, s) in channel.data.iter_mut().zip(&spectrum) {
        *v = s.re * scale;
    }
    channel.units = Units::NanometersPerSecondSquared;
    Ok(())
}

/// Standard preprocessing plus response removal for the main and P-coda
/// bundles.
///
/// Detrends all eight channels, tapers the main bundle only, applies the
/// ring-laser calibration (negating first on reverse polarity), deconvolves
/// the seismometer response from the acceleration channels and finally trims
/// everything to the common overlap of the main channels.
pub fn remove_instrument_response(
    main: &mut WaveformBundle,
    pcoda: &mut WaveformBundle,
    config: &StationConfig,
) -> RotResult<()> {
    if config.ring_laser == RingLaser::Pfo {
        // PFO needs an inventory-based acceleration response that neither
        // PAZ family models
        return Err(RotError::Processing(
            "no acceleration response available for the PFO configuration".into(),
        ));
    }
    for ch in main.channels_mut() {
        detrend_linear(ch);
    }
    for ch in pcoda.channels_mut() {
        detrend_linear(ch);
    }
    for ch in main.channels_mut() {
        taper(ch, 0.05);
    }

    let calibration = config.ring_laser.calibration();
    for rot in [&mut main.rotation, &mut pcoda.rotation] {
        if config.polarity == Polarity::Reverse {
            rot.data.mapv_inplace(|v| -v);
        }
        rot.data.mapv_inplace(|v| v * calibration);
        rot.units = Units::NanoradiansPerSecond;
    }

    let paz = match config.seismometer {
        Seismometer::Sts2 => PazResponse::sts2(),
        Seismometer::Lennartz => PazResponse::lennartz(),
    };
    for acc in [
        &mut main.east,
        &mut main.north,
        &mut main.vertical,
        &mut pcoda.east,
        &mut pcoda.north,
        &mut pcoda.vertical,
    ] {
        remove_response(acc, &paz, WATER_LEVEL_DB)?;
        if config.seismometer == Seismometer::Lennartz {
            // the LE-3D response is unreliable below its corner
            zero_phase(acc, FilterBand::Highpass(0.04), 3)?;
        }
    }

    // align on the overlap of the main channels
    let start = main
        .channels()
        .iter()
        .map(|c| c.start_time)
        .max()
        .ok_or_else(|| RotError::DataGap("empty bundle".into()))?;
    let end = main
        .channels()
        .iter()
        .map(|c| c.end_time())
        .min()
        .ok_or_else(|| RotError::DataGap("empty bundle".into()))?;
    for ch in main.channels_mut() {
        ch.trim(start, end)?;
    }
    for ch in pcoda.channels_mut() {
        ch.trim(start, end)?;
    }

    log::debug!(
        "response removed: {} / {}, overlap [{}, {}]",
        config.ring_laser.calibration(),
        match config.seismometer {
            Seismometer::Sts2 => "STS-2",
            Seismometer::Lennartz => "Lennartz",
        },
        start,
        end
    );
    Ok(())
}
