//! Per-event processing pipeline and the catalog batch driver.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::arrivals::{ps_arrival_times, time_windows, TravelTimeModel};
use crate::core::correlate::{
    coarse_backazimuth_grid, estimate_backazimuth, windowed_correlation,
};
use crate::core::distance::classify;
use crate::core::filter::filter_and_rotate;
use crate::core::phase_velocity::{band_summary, phase_velocities};
use crate::core::resample::resample;
use crate::core::response::remove_instrument_response;
use crate::core::snr::sn_ratio;
use crate::types::{
    seconds_between, BackazimuthGeometry, EventAnalysis, EventRecord, EventSummary, RotError,
    RotResult, StationConfig, WaveformBundle,
};

fn peak_abs(signal: &[f64]) -> f64 {
    signal.iter().fold(0.0_f64, |m, &v| m.max(v.abs()))
}

/// Runs the full analysis for one event against one station.
#[derive(Debug, Clone, Copy)]
pub struct EventProcessor {
    pub config: StationConfig,
}

impl EventProcessor {
    pub fn new(config: StationConfig) -> Self {
        Self { config }
    }

    /// Process one event: classify, resample, correct, filter, correlate,
    /// grid-search the backazimuth, estimate phase velocities and SNR.
    pub fn process(
        &self,
        bundle: WaveformBundle,
        event: &EventRecord,
        model: &dyn TravelTimeModel,
    ) -> RotResult<EventAnalysis> {
        let geometry = BackazimuthGeometry::from_event(event, &self.config.coordinates)?;
        let class = classify(geometry.distance_m);
        log::info!(
            "event {}: M{} at {:.1} km ({}), backazimuth {:.1} deg",
            event.id,
            event.magnitude,
            0.001 * geometry.distance_m,
            class,
            geometry.backazimuth_deg
        );

        let out = resample(class, bundle)?;
        let (mut main, mut pcoda, params) = (out.main, out.pcoda, out.params);
        remove_instrument_response(&mut main, &mut pcoda, &self.config)?;

        let init_sec = seconds_between(event.origin_time, main.rotation.start_time);
        let (arriv_p, arriv_s) =
            ps_arrival_times(model, geometry.distance_m, event.depth_km, init_sec)?;
        let windows = time_windows(geometry.distance_m, arriv_p, arriv_s, init_sec, class);
        log::debug!(
            "picks: P {} s, S {} s, surface [{:.0}, {:.0}] s",
            arriv_p,
            arriv_s,
            windows.min_lwi,
            windows.max_lwf
        );

        let filtered = filter_and_rotate(
            &mut main,
            &pcoda,
            params.cutoff,
            params.cutoff_pc,
            class,
            geometry.backazimuth_deg,
        )?;

        let sr = main.rotation.sampling_rate;
        let sec = params.window_seconds;
        let rotation = main.rotation.samples();

        let correlation = windowed_correlation(rotation, sr, &filtered.transverse, sr, sec);
        if correlation.is_empty() {
            return Err(RotError::DataGap(format!(
                "signal shorter than one {} s correlation window",
                sec
            )));
        }

        let coarse_grid = coarse_backazimuth_grid(
            rotation,
            sr,
            main.north.samples(),
            main.east.samples(),
            sr,
            sec,
            correlation.len(),
            None,
        )?;
        let estimate = estimate_backazimuth(
            rotation,
            main.north.samples(),
            main.east.samples(),
            sr,
            windows.min_sw,
            windows.max_lwf,
        )?;

        // band velocity picks run from window 0; the broadband pick skips
        // the body-wave windows before the initial surface-wave onset
        let ind_surf = (windows.min_lwi / sec as f64) as usize;
        let phase_velocity = phase_velocities(
            rotation,
            sr,
            sec,
            &correlation.coefficients,
            &filtered.transverse,
            ind_surf,
        );

        let mut band_correlations = Vec::with_capacity(filtered.bands.len());
        let mut band_phase_velocity = Vec::with_capacity(filtered.bands.len());
        let mut band_summaries = Vec::with_capacity(filtered.bands.len());
        for band in &filtered.bands {
            let series = windowed_correlation(
                band.rotation.samples(),
                sr,
                &band.transverse,
                sr,
                band.band.window_seconds,
            );
            let velocities = phase_velocities(
                band.rotation.samples(),
                sr,
                band.band.window_seconds,
                &series.coefficients,
                &band.transverse,
                0,
            );
            band_summaries.push(band_summary(band.band.freqmin, band.band.freqmax, &velocities));
            band_correlations.push(series);
            band_phase_velocity.push(velocities);
        }

        // P-coda: highpassed variants truncated at the midpoint of the
        // initial surface-wave window
        let psr = pcoda.rotation.sampling_rate;
        let lwi_average = ((windows.min_lwi + windows.max_lwi) / 2.0).round();
        let pc_end = ((lwi_average * psr) as usize)
            .min(filtered.pcoda_rotation_hp.len())
            .min(filtered.pcoda_transverse_hp.len());
        let pc_rotation = &filtered.pcoda_rotation_hp.samples()[..pc_end];
        let pc_transverse = &filtered.pcoda_transverse_hp[..pc_end];
        let pcoda_correlation = windowed_correlation(
            pc_rotation,
            psr,
            pc_transverse,
            psr,
            params.pcoda_window_seconds,
        );
        let ind = (windows.max_lwi * psr).round() as usize;
        let pcoda_grid = coarse_backazimuth_grid(
            pc_rotation,
            psr,
            filtered.pcoda_north_hp.samples(),
            filtered.pcoda_east_hp.samples(),
            psr,
            params.pcoda_window_seconds,
            pcoda_correlation.len(),
            Some(ind),
        )?;
        let pcoda_best_azimuth_over50: Vec<f64> = (0..pcoda_correlation.len())
            .map(|w| {
                if pcoda_grid.max_coefficient[w] >= 0.5 {
                    pcoda_grid.best_azimuth[w]
                } else {
                    0.0
                }
            })
            .collect();

        let rotation_rate_snr = sn_ratio(rotation, arriv_p, sr)?;
        let transverse_acceleration_snr = sn_ratio(&filtered.transverse, arriv_p, sr)?;

        let peak_cc = correlation
            .coefficients
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let min_cc = correlation
            .coefficients
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);

        let summary = EventSummary {
            event_id: event.id.clone(),
            origin_time: event.origin_time,
            event_latitude: event.latitude,
            event_longitude: event.longitude,
            magnitude: event.magnitude,
            magnitude_type: event.magnitude_type.clone(),
            depth_km: event.depth_km,
            station_latitude: self.config.coordinates.latitude,
            station_longitude: self.config.coordinates.longitude,
            distance_class: class,
            epicentral_distance_km: 0.001 * geometry.distance_m,
            epicentral_distance_deg: geometry.distance_deg,
            theoretical_backazimuth_deg: geometry.backazimuth_deg,
            estimated_backazimuth_deg: estimate.backazimuth_deg,
            max_ebaz_coefficient: estimate.max_coefficient,
            peak_rotation_rate_nrad_s: peak_abs(rotation),
            peak_transverse_acceleration_nm_s2: peak_abs(&filtered.transverse),
            peak_correlation_coefficient: peak_cc,
            minimum_correlation_coefficient: min_cc,
            rotation_rate_snr,
            transverse_acceleration_snr,
            phase_velocities: band_summaries,
        };

        log::info!(
            "event {} done: peak cc {:.3}, estimated backazimuth {:?}",
            event.id,
            peak_cc,
            estimate.backazimuth_deg
        );

        Ok(EventAnalysis {
            summary,
            windows,
            correlation,
            band_correlations,
            coarse_grid,
            estimate,
            phase_velocity,
            band_phase_velocity,
            pcoda_correlation,
            pcoda_grid,
            pcoda_best_azimuth_over50,
        })
    }
}

/// Waveform acquisition collaborator.
///
/// `is_processed` lets the driver skip events a previous run already handled;
/// the default never skips.
pub trait WaveformProvider {
    fn fetch(&self, event: &EventRecord) -> RotResult<WaveformBundle>;

    fn is_processed(&self, _tag: &str) -> bool {
        false
    }
}

/// Unique event handle, e.g. `GCMT_2017-09-23T125302Z_6.05`.
pub fn event_tag(catalog: &str, event: &EventRecord) -> String {
    let time_tag = event.origin_time.format("%Y-%m-%dT%H%M%SZ");
    // magnitude with a decimal point, zero padded to 4 characters
    let mag = if event.magnitude.fract() == 0.0 {
        format!("{:.1}", event.magnitude)
    } else {
        event.magnitude.to_string()
    };
    format!("{}_{}_{:0^4}", catalog, time_tag, mag)
}

/// Catalog run outcome: per-event analyses plus bookkeeping counts.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub analyses: Vec<(String, EventAnalysis)>,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Tags of events that failed, for the error log
    pub failed_events: Vec<String>,
}

/// Run the pipeline over a catalog, isolating failures per event.
///
/// With the `parallel` feature events are distributed over the rayon pool.
pub fn process_catalog(
    processor: &EventProcessor,
    events: &[EventRecord],
    provider: &(dyn WaveformProvider + Sync),
    model: &(dyn TravelTimeModel + Sync),
    catalog: &str,
) -> BatchReport {
    log::info!("processing {} event(s) from {}", events.len(), catalog);

    let run = |event: &EventRecord| {
        let tag = event_tag(catalog, event);
        if provider.is_processed(&tag) {
            log::info!("{}: already processed", tag);
            return (tag, None);
        }
        let result = provider
            .fetch(event)
            .and_then(|bundle| processor.process(bundle, event, model));
        (tag, Some(result))
    };

    #[cfg(feature = "parallel")]
    let outcomes: Vec<(String, Option<RotResult<EventAnalysis>>)> =
        events.par_iter().map(run).collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<(String, Option<RotResult<EventAnalysis>>)> =
        events.iter().map(run).collect();

    let mut report = BatchReport::default();
    for (tag, outcome) in outcomes {
        match outcome {
            None => report.skipped += 1,
            Some(Ok(analysis)) => {
                report.processed += 1;
                report.analyses.push((tag, analysis));
            }
            Some(Err(e)) => {
                log::warn!("{}: {}", tag, e);
                report.failed += 1;
                report.failed_events.push(tag);
            }
        }
    }

    log::info!(
        "catalog complete: {} processed, {} failed, {} already processed",
        report.processed,
        report.failed,
        report.skipped
    );
    report
}
