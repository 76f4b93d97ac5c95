//! End-to-end pipeline run on a synthetic teleseismic event.
//!
//! The rotation rate is a clean 0.045 Hz carrier; the horizontal
//! accelerations are synthesized so that, at the theoretical backazimuth,
//! the transverse component is 8000 times the rotation rate (4 km/s phase
//! velocity) and the radial carries an independent 0.03 Hz signal. The
//! acceleration channels are forward-convolved with the STS-2 response so
//! the pipeline's deconvolution has real work to do.

use chrono::{Duration, TimeZone, Utc};
use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

use rotowave::core::arrivals::{Arrival, TravelTimeModel};
use rotowave::core::response::PazResponse;
use rotowave::{
    BackazimuthGeometry, DistanceClass, EventProcessor, EventRecord, RingLaser, StationConfig,
    Units, WaveformBundle, WaveformChannel,
};

const FS_RAW: f64 = 20.0;
const DURATION_S: f64 = 3780.0;
// chosen so the 80 s noise window never spans a whole number of periods
const CARRIER_HZ: f64 = 0.045;
const RADIAL_HZ: f64 = 0.03;
const AMPLITUDE_RATIO: f64 = 8000.0;

struct FixedModel;

impl TravelTimeModel for FixedModel {
    fn travel_times(&self, _distance_deg: f64, _depth_km: f64) -> Vec<Arrival> {
        vec![
            Arrival {
                phase: "P".into(),
                seconds: 540.0,
            },
            Arrival {
                phase: "PP".into(),
                seconds: 660.0,
            },
            Arrival {
                phase: "S".into(),
                seconds: 990.0,
            },
        ]
    }
}

fn paz_transfer(paz: &PazResponse, freq_hz: f64) -> Complex64 {
    let s = Complex64::new(0.0, 2.0 * PI * freq_hz);
    let num = paz
        .zeros
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, z| acc * (s - z));
    let den = paz
        .poles
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, p| acc * (s - p));
    paz.gain * num / den
}

/// Raw counts for a sum of sinusoids seen through the STS-2.
fn observed(terms: &[(f64, f64)], paz: &PazResponse, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64 / FS_RAW;
            terms
                .iter()
                .map(|&(amp, freq)| {
                    let h = paz_transfer(paz, freq);
                    amp * h.norm() * paz.sensitivity * (2.0 * PI * freq * t + h.arg()).sin()
                })
                .sum()
        })
        .collect()
}

fn synthetic_bundle(
    config: &StationConfig,
    backazimuth_deg: f64,
    start: chrono::DateTime<Utc>,
) -> WaveformBundle {
    let n = (DURATION_S * FS_RAW) as usize;
    let paz = PazResponse::sts2();
    let ba = backazimuth_deg.to_radians();
    let (sin_ba, cos_ba) = ba.sin_cos();

    // physical transverse/radial amplitudes, projected onto north/east
    // (inverse of the NE -> RT rotation)
    let t_amp = AMPLITUDE_RATIO;
    let r_amp = 3000.0;
    let north = observed(
        &[(-r_amp * cos_ba, RADIAL_HZ), (t_amp * sin_ba, CARRIER_HZ)],
        &paz,
        n,
    );
    let east = observed(
        &[(-r_amp * sin_ba, RADIAL_HZ), (-t_amp * cos_ba, CARRIER_HZ)],
        &paz,
        n,
    );
    let vertical = observed(&[(500.0, 0.04)], &paz, n);

    // rotation in raw counts so that calibration restores unit amplitude
    let calib = RingLaser::Rlas.calibration();
    let rotation: Vec<f64> = (0..n)
        .map(|i| (2.0 * PI * CARRIER_HZ * i as f64 / FS_RAW).sin() / calib)
        .collect();

    let channel =
        |data: Vec<f64>| WaveformChannel::new(Array1::from_vec(data), FS_RAW, start, Units::Counts);
    WaveformBundle {
        rotation: channel(rotation),
        east: channel(east),
        north: channel(north),
        vertical: channel(vertical),
        station: config.coordinates,
    }
}

#[test]
fn test_synthetic_teleseism_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = StationConfig::rlas_wettzell();
    let origin = Utc.with_ymd_and_hms(2017, 9, 23, 12, 53, 2).unwrap();
    let event = EventRecord {
        id: "test-teleseism".into(),
        origin_time: origin,
        latitude: 5.0,
        longitude: 5.0,
        depth_km: 10.0,
        magnitude: 6.5,
        magnitude_type: "Mw".into(),
    };

    let geometry = BackazimuthGeometry::from_event(&event, &config.coordinates).unwrap();
    assert!(geometry.distance_deg > 40.0 && geometry.distance_deg < 50.0);

    let start = origin - Duration::seconds(180);
    let bundle = synthetic_bundle(&config, geometry.backazimuth_deg, start);

    let processor = EventProcessor::new(config);
    let analysis = processor.process(bundle, &event, &FixedModel).unwrap();
    let summary = &analysis.summary;

    // classification and resampling
    assert_eq!(summary.distance_class, DistanceClass::NonLocal);
    assert_eq!(analysis.correlation.window_seconds, 120);

    // the transverse acceleration tracks the rotation rate almost perfectly
    assert!(
        summary.peak_correlation_coefficient > 0.99,
        "peak cc = {}",
        summary.peak_correlation_coefficient
    );
    let good_windows = analysis
        .correlation
        .coefficients
        .iter()
        .filter(|&&c| c > 0.9)
        .count();
    assert!(good_windows > analysis.correlation.len() / 2);

    // backazimuth recovery on the one-degree grid
    let eba = summary
        .estimated_backazimuth_deg
        .expect("estimate should be defined for a clean signal");
    let err = (eba - geometry.backazimuth_deg).abs();
    assert!(err <= 1.5, "EBA {} vs theoretical {}", eba, geometry.backazimuth_deg);
    assert!(summary.max_ebaz_coefficient.unwrap() > 0.99);

    // the coarse scan agrees within its 10 degree step for a mid-signal
    // window
    let mid = analysis.correlation.len() / 2;
    let coarse_err = (analysis.coarse_grid.best_azimuth[mid] - geometry.backazimuth_deg).abs();
    assert!(coarse_err <= 10.0);

    // amplitude ratio 8000 -> 4 km/s in every defined window
    let defined: Vec<f64> = analysis.phase_velocity.iter().filter_map(|v| *v).collect();
    assert!(!defined.is_empty());
    for v in &defined {
        assert!((v - 4.0).abs() < 0.4, "velocity {} km/s", v);
    }

    // the band holding the carrier correlates strongly
    let carrier_band = &analysis.band_correlations[2];
    assert_eq!(carrier_band.window_seconds, 50);
    let band_max = carrier_band
        .coefficients
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    assert!(band_max > 0.9, "band cc max = {}", band_max);
    assert_eq!(analysis.band_correlations.len(), 8);
    assert_eq!(summary.phase_velocities.len(), 8);

    // P-coda outputs are shaped consistently
    assert_eq!(
        analysis.pcoda_best_azimuth_over50.len(),
        analysis.pcoda_correlation.len()
    );
    assert_eq!(analysis.pcoda_grid.azimuths.len(), 36);

    // SNR defined and positive for both instruments
    assert!(summary.rotation_rate_snr.is_finite() && summary.rotation_rate_snr > 1.0);
    assert!(
        summary.transverse_acceleration_snr.is_finite()
            && summary.transverse_acceleration_snr > 1.0
    );

    // peak amplitudes keep the synthetic ratio
    let ratio = summary.peak_transverse_acceleration_nm_s2 / summary.peak_rotation_rate_nrad_s;
    assert!((ratio - AMPLITUDE_RATIO).abs() / AMPLITUDE_RATIO < 0.1, "ratio {}", ratio);
}
