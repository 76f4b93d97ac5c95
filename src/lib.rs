//! rotowave: A Fast, Modular Rotational Seismology Waveform Comparison Processor
//!
//! Compares ring-laser rotation-rate recordings against co-located broadband
//! acceleration: windowed zero-lag cross-correlation, backazimuth grid
//! search, phase-velocity estimation and signal-to-noise characterization,
//! per event and per frequency band.

pub mod core;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BackazimuthEstimate, BackazimuthGeometry, BackazimuthGrid, BandVelocitySummary,
    CorrelationSeries, DistanceClass, EventAnalysis, EventRecord, EventSummary, FrequencyBand,
    Polarity, RingLaser, RotError, RotResult, Seismometer, StationConfig, StationCoordinates,
    TimeWindowSet, Units, WaveformBundle, WaveformChannel, FREQUENCY_BANDS,
};

pub use core::{Arrival, TravelTimeModel};
pub use pipeline::{process_catalog, BatchReport, EventProcessor, WaveformProvider};
