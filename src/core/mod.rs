//! Core rotational processing modules

pub mod arrivals;
pub mod correlate;
pub mod distance;
pub mod filter;
pub mod geometry;
pub mod phase_velocity;
pub mod resample;
pub mod response;
pub mod rotate;
pub mod snr;

// Re-export main types
pub use arrivals::{ps_arrival_times, surf_tts, time_windows, Arrival, TravelTimeModel};
pub use correlate::{
    coarse_backazimuth_grid, estimate_backazimuth, windowed_correlation, xcorr_zero_lag,
};
pub use distance::classify;
pub use filter::{
    butter_sos, detrend_linear, filter_and_rotate, taper, zero_phase, BandSignals, FilterBand,
    FilteredSignals, Sos,
};
pub use geometry::{dist_azimuth, locations2degrees};
pub use phase_velocity::{band_summary, phase_velocities, velocity_statistics, VELOCITY_THRESHOLD};
pub use resample::{decimate, resample, ClassParams, ResampleOutput};
pub use response::{remove_instrument_response, remove_response, PazResponse, WATER_LEVEL_DB};
pub use rotate::rotate_ne_rt;
pub use snr::sn_ratio;
