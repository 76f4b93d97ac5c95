//! Zero-phase Butterworth filtering and the filter/rotate pipeline stage.
//!
//! Filters are designed as analog Butterworth prototypes, frequency
//! transformed in the zpk domain, discretized with the bilinear transform and
//! applied as cascaded biquad sections forward and backward (zero phase), so
//! the phase relation between rotation rate and acceleration is preserved
//! for the correlation analysis.

use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

use crate::core::rotate::rotate_ne_rt;
use crate::types::{
    DistanceClass, FrequencyBand, RotError, RotResult, WaveformBundle, WaveformChannel,
    FREQUENCY_BANDS,
};

/// Filter passband specification in Hz
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterBand {
    Lowpass(f64),
    Highpass(f64),
    Bandpass(f64, f64),
    Bandstop(f64, f64),
}

/// One second-order section, direct form II transposed
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn process(&self, data: &mut [f64]) {
        let mut w1 = 0.0;
        let mut w2 = 0.0;
        for x in data.iter_mut() {
            let y = self.b0 * *x + w1;
            w1 = self.b1 * *x - self.a1 * y + w2;
            w2 = self.b2 * *x - self.a2 * y;
            *x = y;
        }
    }
}

/// Cascade of second-order sections with the overall gain folded into the
/// first section.
#[derive(Debug, Clone)]
pub struct Sos {
    sections: Vec<Biquad>,
}

impl Sos {
    /// Single forward pass
    pub fn filter(&self, data: &[f64]) -> Vec<f64> {
        let mut out = data.to_vec();
        for section in &self.sections {
            section.process(&mut out);
        }
        out
    }

    /// Forward-backward (zero phase) pass
    pub fn filtfilt(&self, data: &[f64]) -> Vec<f64> {
        let mut out = self.filter(data);
        out.reverse();
        let mut out = self.filter(&out);
        out.reverse();
        out
    }
}

/// Design a digital Butterworth filter of the given order.
pub fn butter_sos(order: usize, band: FilterBand, sampling_rate: f64) -> RotResult<Sos> {
    if order == 0 {
        return Err(RotError::Processing("filter order must be > 0".into()));
    }
    let nyquist = sampling_rate / 2.0;
    let wn: Vec<f64> = match band {
        FilterBand::Lowpass(f) | FilterBand::Highpass(f) => vec![f / nyquist],
        FilterBand::Bandpass(f1, f2) | FilterBand::Bandstop(f1, f2) => {
            if f1 >= f2 {
                return Err(RotError::Processing(format!(
                    "band corners out of order: {} >= {}",
                    f1, f2
                )));
            }
            vec![f1 / nyquist, f2 / nyquist]
        }
    };
    for &w in &wn {
        if w <= 0.0 || w >= 1.0 {
            return Err(RotError::Processing(format!(
                "corner frequency outside (0, nyquist): {} Hz at fs {}",
                w * nyquist,
                sampling_rate
            )));
        }
    }

    // analog lowpass prototype: poles evenly spaced on the left unit circle
    let mut poles: Vec<Complex64> = (0..order)
        .map(|k| {
            let angle = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
            Complex64::new(angle.cos(), angle.sin())
        })
        .collect();
    let mut zeros: Vec<Complex64> = Vec::new();
    let mut gain = 1.0;

    // pre-warp the corner frequencies for the bilinear transform (fs = 2)
    let fs = 2.0;
    let warped: Vec<f64> = wn.iter().map(|&w| 2.0 * fs * (PI * w / fs).tan()).collect();

    match band {
        FilterBand::Lowpass(_) => {
            let wo = warped[0];
            let degree = poles.len() - zeros.len();
            for p in poles.iter_mut() {
                *p *= wo;
            }
            gain *= wo.powi(degree as i32);
        }
        FilterBand::Highpass(_) => {
            let wo = warped[0];
            let degree = poles.len() - zeros.len();
            // k * prod(-z) / prod(-p) is real for a realizable filter
            let prod: Complex64 = poles.iter().fold(Complex64::new(1.0, 0.0), |acc, p| acc * -p);
            gain *= (Complex64::new(1.0, 0.0) / prod).re;
            for p in poles.iter_mut() {
                *p = Complex64::new(wo, 0.0) / *p;
            }
            zeros = vec![Complex64::new(0.0, 0.0); degree];
        }
        FilterBand::Bandpass(_, _) => {
            let wo = (warped[0] * warped[1]).sqrt();
            let bw = warped[1] - warped[0];
            let degree = poles.len() - zeros.len();
            let mut bp_poles = Vec::with_capacity(2 * poles.len());
            for p in &poles {
                let scaled = p * bw / 2.0;
                let disc = (scaled * scaled - wo * wo).sqrt();
                bp_poles.push(scaled + disc);
                bp_poles.push(scaled - disc);
            }
            poles = bp_poles;
            zeros = vec![Complex64::new(0.0, 0.0); degree];
            gain *= bw.powi(degree as i32);
        }
        FilterBand::Bandstop(_, _) => {
            let wo = (warped[0] * warped[1]).sqrt();
            let bw = warped[1] - warped[0];
            let degree = poles.len() - zeros.len();
            let prod: Complex64 = poles.iter().fold(Complex64::new(1.0, 0.0), |acc, p| acc * -p);
            gain *= (Complex64::new(1.0, 0.0) / prod).re;
            let mut bs_poles = Vec::with_capacity(2 * poles.len());
            for p in &poles {
                let inv = Complex64::new(bw / 2.0, 0.0) / p;
                let disc = (inv * inv - wo * wo).sqrt();
                bs_poles.push(inv + disc);
                bs_poles.push(inv - disc);
            }
            poles = bs_poles;
            zeros = Vec::with_capacity(2 * degree);
            for _ in 0..degree {
                zeros.push(Complex64::new(0.0, wo));
                zeros.push(Complex64::new(0.0, -wo));
            }
        }
    }

    // bilinear transform, fs = 2
    let fs2 = 2.0 * fs;
    let num: Complex64 = zeros
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, z| acc * (fs2 - z));
    let den: Complex64 = poles
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, p| acc * (fs2 - p));
    gain *= (num / den).re;
    let degree = poles.len() - zeros.len();
    let mut z_digital: Vec<Complex64> = zeros.iter().map(|z| (fs2 + z) / (fs2 - z)).collect();
    let p_digital: Vec<Complex64> = poles.iter().map(|p| (fs2 + p) / (fs2 - p)).collect();
    z_digital.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));

    Ok(zpk2sos(&z_digital, &p_digital, gain))
}

/// Group roots into complex-conjugate pairs and leftover reals.
fn conjugate_pairs(roots: &[Complex64]) -> (Vec<(Complex64, Complex64)>, Vec<f64>) {
    let mut reals: Vec<f64> = Vec::new();
    let mut complex: Vec<Complex64> = Vec::new();
    for r in roots {
        if r.im.abs() < 1e-10 * (1.0 + r.norm()) {
            reals.push(r.re);
        } else {
            complex.push(*r);
        }
    }
    let mut pairs = Vec::new();
    let mut used = vec![false; complex.len()];
    for i in 0..complex.len() {
        if used[i] || complex[i].im < 0.0 {
            continue;
        }
        // closest conjugate partner in the lower half plane
        let mut best = None;
        let mut best_err = f64::INFINITY;
        for (j, c) in complex.iter().enumerate() {
            if used[j] || j == i || c.im >= 0.0 {
                continue;
            }
            let err = (complex[i].re - c.re).abs() + (complex[i].im + c.im).abs();
            if err < best_err {
                best_err = err;
                best = Some(j);
            }
        }
        if let Some(j) = best {
            used[i] = true;
            used[j] = true;
            pairs.push((complex[i], complex[j]));
        }
    }
    reals.sort_by(|a, b| a.total_cmp(b));
    (pairs, reals)
}

/// Pair digital poles and zeros into biquad sections. The overall gain is
/// folded into the first section.
fn zpk2sos(zeros: &[Complex64], poles: &[Complex64], gain: f64) -> Sos {
    let (pole_pairs, real_poles) = conjugate_pairs(poles);
    let (zero_pairs, real_zeros) = conjugate_pairs(zeros);

    // quadratic factors (1, c1, c2) from pairs, then leftover reals two at a
    // time; Butterworth designs never leave more than one unmatched real root
    let mut pole_quads: Vec<(f64, f64)> = pole_pairs
        .iter()
        .map(|(a, b)| (-(a + b).re, (a * b).re))
        .collect();
    let mut i = 0;
    while i + 1 < real_poles.len() {
        pole_quads.push((-(real_poles[i] + real_poles[i + 1]), real_poles[i] * real_poles[i + 1]));
        i += 2;
    }
    let leftover_pole = if real_poles.len() % 2 == 1 {
        Some(real_poles[real_poles.len() - 1])
    } else {
        None
    };

    let mut zero_quads: Vec<(f64, f64)> = zero_pairs
        .iter()
        .map(|(a, b)| (-(a + b).re, (a * b).re))
        .collect();
    let mut j = 0;
    while j + 1 < real_zeros.len() {
        zero_quads.push((-(real_zeros[j] + real_zeros[j + 1]), real_zeros[j] * real_zeros[j + 1]));
        j += 2;
    }
    let leftover_zero = if real_zeros.len() % 2 == 1 {
        Some(real_zeros[real_zeros.len() - 1])
    } else {
        None
    };

    let mut sections = Vec::new();
    let n = pole_quads.len().max(zero_quads.len());
    for k in 0..n {
        let (a1, a2) = pole_quads.get(k).copied().unwrap_or((0.0, 0.0));
        let (b1, b2) = zero_quads.get(k).copied().unwrap_or((0.0, 0.0));
        sections.push(Biquad {
            b0: 1.0,
            b1,
            b2,
            a1,
            a2,
        });
    }
    if leftover_pole.is_some() || leftover_zero.is_some() {
        sections.push(Biquad {
            b0: 1.0,
            b1: leftover_zero.map_or(0.0, |z| -z),
            b2: 0.0,
            a1: leftover_pole.map_or(0.0, |p| -p),
            a2: 0.0,
        });
    }
    if let Some(first) = sections.first_mut() {
        first.b0 *= gain;
        first.b1 *= gain;
        first.b2 *= gain;
    }
    Sos { sections }
}

/// Zero-phase filter a channel in place.
pub fn zero_phase(channel: &mut WaveformChannel, band: FilterBand, corners: usize) -> RotResult<()> {
    let sos = butter_sos(corners, band, channel.sampling_rate)?;
    let filtered = sos.filtfilt(channel.samples());
    channel.data = Array1::from_vec(filtered);
    Ok(())
}

/// Remove a least-squares straight line from the samples.
pub fn detrend_linear(channel: &mut WaveformChannel) {
    let n = channel.data.len();
    if n < 2 {
        return;
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = channel.data.sum() / nf;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &y) in channel.data.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    for (i, y) in channel.data.iter_mut().enumerate() {
        *y -= slope * i as f64 + intercept;
    }
}

/// Cosine (Hann) taper over `max_percentage` of the trace on each side.
pub fn taper(channel: &mut WaveformChannel, max_percentage: f64) {
    let n = channel.data.len();
    let wlen = ((n as f64 * max_percentage) as usize).min(n / 2);
    if wlen == 0 {
        return;
    }
    for i in 0..wlen {
        let w = 0.5 * (1.0 - (PI * i as f64 / wlen as f64).cos());
        channel.data[i] *= w;
        channel.data[n - 1 - i] *= w;
    }
}

/// One bandpassed rotation/transverse-acceleration pair
#[derive(Debug, Clone)]
pub struct BandSignals {
    pub band: FrequencyBand,
    pub rotation: WaveformChannel,
    pub transverse: Vec<f64>,
}

/// Output of the filter/rotate stage.
///
/// The main bundle is filtered in place; everything here is the family of
/// independent copies the later stages correlate against.
#[derive(Debug, Clone)]
pub struct FilteredSignals {
    /// Transverse acceleration at the theoretical backazimuth (filtered main)
    pub transverse: Vec<f64>,
    /// Radial acceleration at the theoretical backazimuth (filtered main)
    pub radial: Vec<f64>,
    /// Highpass copy of the main rotation at the P-coda cutoff
    pub cop_rotation: WaveformChannel,
    /// Transverse of the highpass copy of the main acceleration
    pub cop_transverse: Vec<f64>,
    /// Transverse of the raw (unfiltered) P-coda acceleration
    pub pcoda_transverse: Vec<f64>,
    /// Highpassed P-coda rotation
    pub pcoda_rotation_hp: WaveformChannel,
    /// Highpassed P-coda horizontals (needed for the P-coda azimuth scan)
    pub pcoda_north_hp: WaveformChannel,
    pub pcoda_east_hp: WaveformChannel,
    /// Transverse of the highpassed P-coda acceleration
    pub pcoda_transverse_hp: Vec<f64>,
    /// Eight independent bandpass pairs
    pub bands: Vec<BandSignals>,
}

/// Filter the main bundle in place and build all rotated variants.
///
/// The eight band copies are taken from the pre-filter signal, so none of the
/// main-chain filters cascade into them.
pub fn filter_and_rotate(
    main: &mut WaveformBundle,
    pcoda: &WaveformBundle,
    cutoff: f64,
    cutoff_pc: f64,
    class: DistanceClass,
    backazimuth_deg: f64,
) -> RotResult<FilteredSignals> {
    log::debug!(
        "filtering: lowpass {} Hz, highpass 0.005 Hz, pcoda highpass {} Hz",
        cutoff,
        cutoff_pc
    );

    // band copies of the unfiltered signal, one rotation + one horizontal
    // pair per band
    let band_sources: Vec<(FrequencyBand, WaveformChannel, WaveformChannel, WaveformChannel)> =
        FREQUENCY_BANDS
            .iter()
            .map(|b| (*b, main.rotation.clone(), main.north.clone(), main.east.clone()))
            .collect();

    // highpass copies at the P-coda cutoff, preserved separately
    let mut cop_rotation = main.rotation.clone();
    let mut cop_north = main.north.clone();
    let mut cop_east = main.east.clone();
    zero_phase(&mut cop_rotation, FilterBand::Highpass(cutoff_pc), 2)?;
    zero_phase(&mut cop_north, FilterBand::Highpass(cutoff_pc), 2)?;
    zero_phase(&mut cop_east, FilterBand::Highpass(cutoff_pc), 2)?;

    // main chain: lowpass at the class cutoff, then a long-period highpass
    for ch in main.channels_mut() {
        zero_phase(ch, FilterBand::Lowpass(cutoff), 2)?;
        zero_phase(ch, FilterBand::Highpass(0.005), 2)?;
    }

    // secondary microseism notch for distant events
    if class == DistanceClass::NonLocal {
        for ch in main.channels_mut() {
            zero_phase(ch, FilterBand::Bandstop(0.083, 0.2), 4)?;
            taper(ch, 0.05);
        }
    }

    let (radial, transverse) = rotate_ne_rt(
        main.north.samples(),
        main.east.samples(),
        backazimuth_deg,
    )?;
    let (_, cop_transverse) = rotate_ne_rt(
        cop_north.samples(),
        cop_east.samples(),
        backazimuth_deg,
    )?;
    let (_, pcoda_transverse) = rotate_ne_rt(
        pcoda.north.samples(),
        pcoda.east.samples(),
        backazimuth_deg,
    )?;

    let mut bands = Vec::with_capacity(FREQUENCY_BANDS.len());
    for (band, mut rotation, mut north, mut east) in band_sources {
        let bp = FilterBand::Bandpass(band.freqmin, band.freqmax);
        zero_phase(&mut rotation, bp, 3)?;
        zero_phase(&mut north, bp, 3)?;
        zero_phase(&mut east, bp, 3)?;
        let (_, t) = rotate_ne_rt(
            north.samples(),
            east.samples(),
            backazimuth_deg,
        )?;
        bands.push(BandSignals {
            band,
            rotation,
            transverse: t,
        });
    }

    // highpassed P-coda variants
    let mut pcoda_rotation_hp = pcoda.rotation.clone();
    let mut pcoda_north_hp = pcoda.north.clone();
    let mut pcoda_east_hp = pcoda.east.clone();
    zero_phase(&mut pcoda_rotation_hp, FilterBand::Highpass(cutoff_pc), 2)?;
    zero_phase(&mut pcoda_north_hp, FilterBand::Highpass(cutoff_pc), 2)?;
    zero_phase(&mut pcoda_east_hp, FilterBand::Highpass(cutoff_pc), 2)?;
    let (_, pcoda_transverse_hp) = rotate_ne_rt(
        pcoda_north_hp.samples(),
        pcoda_east_hp.samples(),
        backazimuth_deg,
    )?;

    Ok(FilteredSignals {
        transverse,
        radial,
        cop_rotation,
        cop_transverse,
        pcoda_transverse,
        pcoda_rotation_hp,
        pcoda_north_hp,
        pcoda_east_hp,
        pcoda_transverse_hp,
        bands,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::Array1;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_lowpass_attenuates_high_frequency() {
        let fs = 20.0;
        let sos = butter_sos(2, FilterBand::Lowpass(1.0), fs).unwrap();
        let lo = sos.filtfilt(&sine(0.1, fs, 4000));
        let hi = sos.filtfilt(&sine(5.0, fs, 4000));
        assert!(rms(&lo) > 0.9 * rms(&sine(0.1, fs, 4000)));
        assert!(rms(&hi) < 0.01 * rms(&sine(5.0, fs, 4000)));
    }

    #[test]
    fn test_highpass_removes_offset() {
        let fs = 20.0;
        let sos = butter_sos(2, FilterBand::Highpass(0.5), fs).unwrap();
        let data: Vec<f64> = sine(2.0, fs, 4000).iter().map(|v| v + 5.0).collect();
        let out = sos.filtfilt(&data);
        // DC gone, 2 Hz carrier kept
        let mean = out.iter().sum::<f64>() / out.len() as f64;
        assert!(mean.abs() < 0.05);
        assert!(rms(&out[200..3800]) > 0.6);
    }

    #[test]
    fn test_bandpass_selects_band() {
        let fs = 20.0;
        let sos = butter_sos(3, FilterBand::Bandpass(0.2, 0.3), fs).unwrap();
        let inside = sos.filtfilt(&sine(0.25, fs, 8000));
        let outside = sos.filtfilt(&sine(2.0, fs, 8000));
        assert!(rms(&inside[1000..7000]) > 0.5);
        assert!(rms(&outside[1000..7000]) < 0.01);
    }

    #[test]
    fn test_bandstop_notches_band() {
        let fs = 20.0;
        let sos = butter_sos(4, FilterBand::Bandstop(0.083, 0.2), fs).unwrap();
        let notched = sos.filtfilt(&sine(0.13, fs, 16000));
        let kept = sos.filtfilt(&sine(0.5, fs, 16000));
        assert!(rms(&notched[2000..14000]) < 0.05);
        assert!(rms(&kept[2000..14000]) > 0.6);
    }

    #[test]
    fn test_zero_phase_has_no_lag() {
        // a single causal pass would delay the passband sine; the
        // forward-backward pass must leave the input/output cross-correlation
        // peaked at zero lag
        let fs = 20.0;
        let n = 8000;
        let data = sine(0.1, fs, n);
        let sos = butter_sos(2, FilterBand::Lowpass(1.0), fs).unwrap();
        let out = sos.filtfilt(&data);
        let dot = |lag: i64| -> f64 {
            (1000..7000)
                .map(|i: i64| data[i as usize] * out[(i + lag) as usize])
                .sum()
        };
        let zero = dot(0);
        for lag in 1..=10 {
            assert!(zero > dot(lag), "lag {}", lag);
            assert!(zero > dot(-lag), "lag -{}", lag);
        }
    }

    #[test]
    fn test_invalid_corner_rejected() {
        assert!(butter_sos(2, FilterBand::Lowpass(15.0), 20.0).is_err());
        assert!(butter_sos(2, FilterBand::Bandpass(0.3, 0.2), 20.0).is_err());
    }

    #[test]
    fn test_detrend_removes_line() {
        let t0 = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        let data: Vec<f64> = (0..100).map(|i| 3.0 + 0.5 * i as f64).collect();
        let mut ch = WaveformChannel::new(Array1::from_vec(data), 1.0, t0, crate::types::Units::Counts);
        detrend_linear(&mut ch);
        for &v in ch.data.iter() {
            assert_relative_eq!(v, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_taper_zeroes_endpoints() {
        let t0 = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        let mut ch = WaveformChannel::new(Array1::ones(1000), 1.0, t0, crate::types::Units::Counts);
        taper(&mut ch, 0.05);
        assert_eq!(ch.data[0], 0.0);
        assert_eq!(ch.data[999], 0.0);
        // middle untouched
        assert_eq!(ch.data[500], 1.0);
    }
}
