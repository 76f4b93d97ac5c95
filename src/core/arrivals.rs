//! Body-wave picks, surface-wave travel-time estimate and analysis windows.

use crate::types::{DistanceClass, RotError, RotResult, TimeWindowSet};

/// One theoretical arrival from a travel-time model
#[derive(Debug, Clone)]
pub struct Arrival {
    pub phase: String,
    /// Travel time in seconds after origin
    pub seconds: f64,
}

/// External travel-time collaborator (e.g. a taup table lookup).
pub trait TravelTimeModel {
    fn travel_times(&self, distance_deg: f64, depth_km: f64) -> Vec<Arrival>;
}

const P_PHASES: [&str; 9] = ["P", "p", "Pdiff", "PKiKP", "PKIKP", "PP", "Pb", "Pn", "Pg"];
const S_PHASES: [&str; 9] = ["S", "s", "Sdiff", "SKiKS", "SKIKS", "SS", "Sb", "Sn", "Sg"];

fn earliest(arrivals: &[Arrival], family: &[&str]) -> Option<f64> {
    arrivals
        .iter()
        .filter(|a| family.contains(&a.phase.as_str()))
        .map(|a| a.seconds)
        .fold(None, |acc, t| match acc {
            Some(m) if m <= t => Some(m),
            _ => Some(t),
        })
}

/// First P and S arrivals in seconds after data start.
///
/// `init_sec` is the event origin time relative to data start. Picks are
/// floored to whole seconds.
pub fn ps_arrival_times(
    model: &dyn TravelTimeModel,
    distance_m: f64,
    depth_km: f64,
    init_sec: f64,
) -> RotResult<(f64, f64)> {
    let distance_deg = 0.001 * distance_m / 111.11;
    let arrivals = model.travel_times(distance_deg, depth_km);

    let p = earliest(&arrivals, &P_PHASES).ok_or(RotError::NoArrivalFound {
        family: "P",
        distance_deg,
        depth_km,
    })?;
    let s = earliest(&arrivals, &S_PHASES).ok_or(RotError::NoArrivalFound {
        family: "S",
        distance_deg,
        depth_km,
    })?;

    Ok(((init_sec + p).floor(), (init_sec + s).floor()))
}

/// Reference surface-wave travel times, 5 degree steps up to 135 degrees
const SURF_DELTAS_DEG: usize = 28;
const SURF_TTS_MIN: [f64; SURF_DELTAS_DEG] = [
    0.0, 2.0, 4.0, 6.2, 8.4, 11.0, 13.0, 15.2, 17.8, 19.4, 22.0, 24.1, 26.6, 28.6, 30.8, 33.0,
    35.6, 37.4, 39.8, 42.0, 44.2, 46.4, 48.8, 50.9, 53.6, 55.2, 57.8, 60.0,
];

/// Surface-wave arrival estimate in seconds after data start.
///
/// A straight line is fit to the reference table, evaluated on a 0.01 degree
/// grid (slope only, the intercept is dropped), and the grid point nearest
/// the event distance gives the Love-wave pick; the offset between that grid
/// value and the nearest tabulated entry is then added back as a bias term.
pub fn surf_tts(distance_m: f64, start_time_sec: f64) -> f64 {
    let distance_deg = 0.001 * distance_m / 111.11;

    let deltas: Vec<f64> = (0..SURF_DELTAS_DEG).map(|i| 5.0 * i as f64).collect();
    let tts: Vec<f64> = SURF_TTS_MIN.iter().map(|&t| 60.0 * t).collect();

    // least squares line through the table
    let n = deltas.len() as f64;
    let d_mean = deltas.iter().sum::<f64>() / n;
    let t_mean = tts.iter().sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (d, t) in deltas.iter().zip(&tts) {
        sxy += (d - d_mean) * (t - t_mean);
        sxx += (d - d_mean) * (d - d_mean);
    }
    let slope = sxy / sxx;

    // grid 0.00 .. 180.09 degrees in 0.01 steps, first-minimum tie break
    let grid_len = 18_010;
    let mut best = 0usize;
    let mut best_err = f64::INFINITY;
    for i in 0..grid_len {
        let err = (distance_deg - 0.01 * i as f64).abs();
        if err < best_err {
            best_err = err;
            best = i;
        }
    }
    let grid_deg = 0.01 * best as f64;
    let curve_tt = slope * grid_deg;

    let arriv_lov = (start_time_sec + curve_tt).floor();

    let mut nearest = 0usize;
    let mut nearest_err = f64::INFINITY;
    for (j, d) in deltas.iter().enumerate() {
        let err = (grid_deg - d).abs();
        if err < nearest_err {
            nearest_err = err;
            nearest = j;
        }
    }
    let bias = curve_tt - tts[nearest];

    arriv_lov + bias
}

/// Analysis window boundaries per distance class, seconds after data start.
pub fn time_windows(
    distance_m: f64,
    arriv_p: f64,
    arriv_s: f64,
    init_sec: f64,
    class: DistanceClass,
) -> TimeWindowSet {
    match class {
        DistanceClass::NonLocal => {
            let min_pw = arriv_p;
            let max_pw = min_pw + ((arriv_s - arriv_p) / 4.0).floor();
            let min_sw = arriv_s - 0.001 * (arriv_s - arriv_p);
            let max_sw = arriv_s + 150.0;
            let min_lwi = surf_tts(distance_m, init_sec) - 20.0;
            // surface-wave windows grow 50 resp. 60 s per 1000 km
            let max_lwi = min_lwi + (distance_m / 1_000_000.0) * 50.0;
            let min_lwf = max_lwi;
            let max_lwf = min_lwf + (distance_m / 1_000_000.0) * 60.0;
            TimeWindowSet {
                min_pw,
                max_pw,
                min_sw,
                max_sw,
                min_lwi,
                max_lwi,
                min_lwf,
                max_lwf,
            }
        }
        DistanceClass::Local => {
            let min_pw = arriv_p;
            let max_pw = min_pw + 20.0;
            let min_sw = arriv_s - 5.0;
            let max_sw = min_sw + 20.0;
            let min_lwi = surf_tts(distance_m, init_sec) + 20.0;
            let max_lwi = min_lwi + 50.0;
            let min_lwf = max_lwi;
            let max_lwf = min_lwf + 80.0;
            TimeWindowSet {
                min_pw,
                max_pw,
                min_sw,
                max_sw,
                min_lwi,
                max_lwi,
                min_lwf,
                max_lwf,
            }
        }
        DistanceClass::Close => {
            let min_pw = arriv_p;
            let max_pw = min_pw + 7.0;
            let min_sw = arriv_s;
            let max_sw = min_sw + 7.0;
            let min_lwi = surf_tts(distance_m, init_sec) + 5.0;
            let max_lwi = min_lwi + 12.0;
            let min_lwf = max_lwi;
            let max_lwf = min_lwf + 80.0;
            TimeWindowSet {
                min_pw,
                max_pw,
                min_sw,
                max_sw,
                min_lwi,
                max_lwi,
                min_lwf,
                max_lwf,
            }
        }
    }
}
