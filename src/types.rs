use chrono::{DateTime, Duration, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Physical units carried by a waveform channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    /// Raw digitizer counts (before response removal)
    Counts,
    /// Rotation rate in nrad/s
    NanoradiansPerSecond,
    /// Acceleration in nm/s^2
    NanometersPerSecondSquared,
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Units::Counts => write!(f, "counts"),
            Units::NanoradiansPerSecond => write!(f, "nrad/s"),
            Units::NanometersPerSecondSquared => write!(f, "nm/s^2"),
        }
    }
}

/// Seconds between two timestamps as a float (a - b)
pub fn seconds_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let d = a.signed_duration_since(b);
    d.num_microseconds()
        .map(|us| us as f64 * 1e-6)
        .unwrap_or_else(|| d.num_milliseconds() as f64 * 1e-3)
}

/// A single evenly sampled time series.
///
/// Pipeline stages mutate channels in place; any stage that needs an earlier
/// variant later (e.g. the undecimated P-coda copies) clones first.
#[derive(Debug, Clone)]
pub struct WaveformChannel {
    pub data: Array1<f64>,
    pub sampling_rate: f64,
    pub start_time: DateTime<Utc>,
    pub units: Units,
}

impl WaveformChannel {
    pub fn new(
        data: Array1<f64>,
        sampling_rate: f64,
        start_time: DateTime<Utc>,
        units: Units,
    ) -> Self {
        Self {
            data,
            sampling_rate,
            start_time,
            units,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Contiguous view of the samples. Owned one-dimensional arrays are
    /// always standard layout, so this never truncates.
    pub fn samples(&self) -> &[f64] {
        self.data.as_slice().unwrap_or(&[])
    }

    /// Sample spacing in seconds
    pub fn delta(&self) -> f64 {
        1.0 / self.sampling_rate
    }

    /// Timestamp of the last sample
    pub fn end_time(&self) -> DateTime<Utc> {
        let span_ns = if self.data.is_empty() {
            0.0
        } else {
            (self.data.len() - 1) as f64 / self.sampling_rate * 1e9
        };
        self.start_time + Duration::nanoseconds(span_ns as i64)
    }

    /// Trim to [start, end] with nearest-sample rounding.
    ///
    /// The resulting channel keeps the sample grid of the original; an empty
    /// or inverted interval is a `DataGap` error.
    pub fn trim(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> RotResult<()> {
        let i0 = (seconds_between(start, self.start_time) * self.sampling_rate).round() as i64;
        let i1 = (seconds_between(end, self.start_time) * self.sampling_rate).round() as i64;
        let i0 = i0.max(0) as usize;
        let i1 = ((i1 + 1).max(0) as usize).min(self.data.len());
        if i0 >= i1 {
            return Err(RotError::DataGap(format!(
                "empty overlap after trimming to [{}, {}]",
                start, end
            )));
        }
        self.start_time =
            self.start_time + Duration::nanoseconds((i0 as f64 / self.sampling_rate * 1e9) as i64);
        self.data = self.data.slice(ndarray::s![i0..i1]).to_owned();
        Ok(())
    }
}

/// Station coordinates in decimal degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StationCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One rotation-rate channel plus three orthogonal acceleration channels.
#[derive(Debug, Clone)]
pub struct WaveformBundle {
    pub rotation: WaveformChannel,
    pub east: WaveformChannel,
    pub north: WaveformChannel,
    pub vertical: WaveformChannel,
    pub station: StationCoordinates,
}

impl WaveformBundle {
    pub fn channels_mut(&mut self) -> [&mut WaveformChannel; 4] {
        [
            &mut self.rotation,
            &mut self.east,
            &mut self.north,
            &mut self.vertical,
        ]
    }

    pub fn channels(&self) -> [&WaveformChannel; 4] {
        [&self.rotation, &self.east, &self.north, &self.vertical]
    }
}

/// Event metadata from the catalog collaborator. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub origin_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
    pub magnitude: f64,
    pub magnitude_type: String,
}

/// Source-receiver geometry, derived once per event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackazimuthGeometry {
    /// Great circle distance in meters
    pub distance_m: f64,
    /// Azimuth source -> station, degrees clockwise from North
    pub azimuth_deg: f64,
    /// Backazimuth station -> source, degrees clockwise from North
    pub backazimuth_deg: f64,
    /// Great circle distance in degrees
    pub distance_deg: f64,
}

/// Event distance classes driving all downstream parameter choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceClass {
    Close,
    Local,
    NonLocal,
}

impl std::fmt::Display for DistanceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceClass::Close => write!(f, "close"),
            DistanceClass::Local => write!(f, "local"),
            DistanceClass::NonLocal => write!(f, "non-local"),
        }
    }
}

/// Ring-laser device, fixing the scalar calibration to nrad/s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingLaser {
    /// Wettzell G-ring (RLAS)
    Rlas,
    /// Fuerstenfeldbruck ROMY vertical component
    Romy,
    /// Pinon Flat Observatory ring
    Pfo,
}

impl RingLaser {
    /// Multiplicative factor converting raw counts to nrad/s
    pub fn calibration(&self) -> f64 {
        match self {
            RingLaser::Rlas => 1.0 / 6.3191e3,
            RingLaser::Romy => 1.0 / 1.01821e4,
            RingLaser::Pfo => 1.0 / 2.5284 * 1e-3,
        }
    }
}

/// Broadband seismometer family co-located with the ring laser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seismometer {
    Sts2,
    Lennartz,
}

/// Rotation-data polarity. A few catalog periods have flipped signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Normal,
    Reverse,
}

/// Per-run station/instrument configuration, passed explicitly through every
/// pipeline stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StationConfig {
    pub coordinates: StationCoordinates,
    pub ring_laser: RingLaser,
    pub seismometer: Seismometer,
    pub polarity: Polarity,
}

impl StationConfig {
    /// RLAS ring laser with the co-located WET STS-2
    pub fn rlas_wettzell() -> Self {
        Self {
            coordinates: StationCoordinates {
                latitude: 49.144001,
                longitude: 12.8782,
            },
            ring_laser: RingLaser::Rlas,
            seismometer: Seismometer::Sts2,
            polarity: Polarity::Normal,
        }
    }

    /// ROMY vertical ring with the co-located FUR STS-2
    pub fn romy_fuerstenfeldbruck() -> Self {
        Self {
            coordinates: StationCoordinates {
                latitude: 48.162941,
                longitude: 11.275476,
            },
            ring_laser: RingLaser::Romy,
            seismometer: Seismometer::Sts2,
            polarity: Polarity::Normal,
        }
    }
}

/// Window boundaries in seconds after data start for the P-coda, S-wave,
/// initial and later surface-wave intervals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindowSet {
    pub min_pw: f64,
    pub max_pw: f64,
    pub min_sw: f64,
    pub max_sw: f64,
    pub min_lwi: f64,
    pub max_lwi: f64,
    pub min_lwf: f64,
    pub max_lwf: f64,
}

/// Zero-lag correlation coefficients for consecutive fixed-length windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationSeries {
    /// Window length in seconds
    pub window_seconds: usize,
    pub coefficients: Vec<f64>,
}

impl CorrelationSeries {
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

/// Coarse grid-search result over candidate backazimuths
#[derive(Debug, Clone)]
pub struct BackazimuthGrid {
    /// Candidate azimuths in degrees
    pub azimuths: Vec<f64>,
    /// (candidate azimuth, window) -> correlation coefficient
    pub grid: Array2<f64>,
    /// Per window, the candidate azimuth with the highest coefficient
    pub best_azimuth: Vec<f64>,
    /// Per window, the highest coefficient over all candidates
    pub max_coefficient: Vec<f64>,
}

/// Fine-grid backazimuth estimate from thresholded correlation sums
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackazimuthEstimate {
    /// Estimated backazimuth in degrees; `None` when no window ever reached
    /// the correlation threshold
    pub backazimuth_deg: Option<f64>,
    /// Maximum coefficient attained at the winning candidate
    pub max_coefficient: Option<f64>,
    /// Per-candidate sum of thresholded coefficients (1 degree steps)
    pub correlation_sums: Vec<f64>,
}

/// Frequency band used for the bandpassed correlation/velocity analysis
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub freqmin: f64,
    pub freqmax: f64,
    /// Correlation window length in seconds for this band
    pub window_seconds: usize,
}

/// The eight fixed analysis bands with their correlation window lengths
pub const FREQUENCY_BANDS: [FrequencyBand; 8] = [
    FrequencyBand { freqmin: 0.01, freqmax: 0.02, window_seconds: 200 },
    FrequencyBand { freqmin: 0.02, freqmax: 0.04, window_seconds: 100 },
    FrequencyBand { freqmin: 0.04, freqmax: 0.10, window_seconds: 50 },
    FrequencyBand { freqmin: 0.10, freqmax: 0.20, window_seconds: 20 },
    FrequencyBand { freqmin: 0.20, freqmax: 0.30, window_seconds: 12 },
    FrequencyBand { freqmin: 0.30, freqmax: 0.40, window_seconds: 10 },
    FrequencyBand { freqmin: 0.40, freqmax: 0.60, window_seconds: 8 },
    FrequencyBand { freqmin: 0.60, freqmax: 1.00, window_seconds: 6 },
];

/// Phase velocity statistics for one frequency band.
///
/// `mean`/`std` are `None` when no window in the band passed the correlation
/// threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandVelocitySummary {
    pub freqmin: f64,
    pub freqmax: f64,
    pub mean_km_s: Option<f64>,
    pub std_km_s: Option<f64>,
}

/// Flat per-event summary record exposed to reporting collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: String,
    pub origin_time: DateTime<Utc>,
    pub event_latitude: f64,
    pub event_longitude: f64,
    pub magnitude: f64,
    pub magnitude_type: String,
    pub depth_km: f64,
    pub station_latitude: f64,
    pub station_longitude: f64,
    pub distance_class: DistanceClass,
    pub epicentral_distance_km: f64,
    pub epicentral_distance_deg: f64,
    pub theoretical_backazimuth_deg: f64,
    pub estimated_backazimuth_deg: Option<f64>,
    pub max_ebaz_coefficient: Option<f64>,
    pub peak_rotation_rate_nrad_s: f64,
    pub peak_transverse_acceleration_nm_s2: f64,
    pub peak_correlation_coefficient: f64,
    pub minimum_correlation_coefficient: f64,
    pub rotation_rate_snr: f64,
    pub transverse_acceleration_snr: f64,
    pub phase_velocities: Vec<BandVelocitySummary>,
}

/// Complete analysis output: the flat summary plus the per-window series and
/// grids that plotting collaborators consume.
#[derive(Debug, Clone)]
pub struct EventAnalysis {
    pub summary: EventSummary,
    pub windows: TimeWindowSet,
    /// Main-signal correlation series (class-dependent window length)
    pub correlation: CorrelationSeries,
    /// One correlation series per frequency band
    pub band_correlations: Vec<CorrelationSeries>,
    /// Coarse (10 degree) backazimuth grid for the main signal
    pub coarse_grid: BackazimuthGrid,
    /// Fine (1 degree) backazimuth estimate
    pub estimate: BackazimuthEstimate,
    /// Phase velocities per window of the main signal
    pub phase_velocity: Vec<Option<f64>>,
    /// Phase velocities per window and band
    pub band_phase_velocity: Vec<Vec<Option<f64>>>,
    /// P-coda correlation series (highpassed, truncated at the surface-wave
    /// window midpoint)
    pub pcoda_correlation: CorrelationSeries,
    /// Coarse backazimuth grid for the P-coda signal
    pub pcoda_grid: BackazimuthGrid,
    /// Per P-coda window, the best azimuth where the max coefficient reached
    /// 0.5, else 0.0
    pub pcoda_best_azimuth_over50: Vec<f64>,
}

/// Error types for rotational processing
#[derive(Debug, thiserror::Error)]
pub enum RotError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("data gap: {0}")]
    DataGap(String),

    #[error("no {family}-wave arrival found at {distance_deg:.2} deg / {depth_km:.1} km")]
    NoArrivalFound {
        family: &'static str,
        distance_deg: f64,
        depth_km: f64,
    },

    #[error("aliasing risk: {0}")]
    Aliasing(String),

    #[error("processing error: {0}")]
    Processing(String),
}

/// Result type for rotational processing operations
pub type RotResult<T> = Result<T, RotError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_channel_trim_nearest_sample() {
        let t0 = Utc.with_ymd_and_hms(2017, 9, 23, 12, 0, 0).unwrap();
        let mut ch =
            WaveformChannel::new(Array1::linspace(0.0, 99.0, 100), 10.0, t0, Units::Counts);
        let start = t0 + Duration::milliseconds(2040); // nearest sample: 20
        let end = t0 + Duration::milliseconds(5060); // nearest sample: 51
        ch.trim(start, end).unwrap();
        assert_eq!(ch.len(), 32);
        assert_eq!(ch.data[0], 20.0);
        assert_eq!(ch.data[31], 51.0);
    }

    #[test]
    fn test_channel_trim_empty_interval_is_gap() {
        let t0 = Utc.with_ymd_and_hms(2017, 9, 23, 12, 0, 0).unwrap();
        let mut ch = WaveformChannel::new(Array1::zeros(10), 1.0, t0, Units::Counts);
        let err = ch
            .trim(t0 + Duration::seconds(100), t0 + Duration::seconds(200))
            .unwrap_err();
        assert!(matches!(err, RotError::DataGap(_)));
    }

    #[test]
    fn test_ring_laser_calibrations() {
        assert!((RingLaser::Rlas.calibration() - 1.0 / 6319.1).abs() < 1e-12);
        assert!((RingLaser::Romy.calibration() - 1.0 / 10182.1).abs() < 1e-12);
        assert!((RingLaser::Pfo.calibration() - 3.955070399936719e-4).abs() < 1e-12);
    }
}
