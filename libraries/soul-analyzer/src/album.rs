//! Album-level summary over analyzed tracks
//!
//! Album loudness is the energy mean of the track loudness values, so one
//! loud track moves the album more than one quiet track. The ReplayGain 2.0
//! album gain is derived from it the same way track gain is.

use crate::results::{replaygain_gain, TrackAnalysis};
use serde::Serialize;
use std::collections::BTreeMap;

/// Spread of per-track integrated loudness
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoudnessStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation, zero for a single track
    pub std_dev: f64,
}

/// Summary of an album or any other set of tracks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumSummary {
    /// Tracks summarized
    pub track_count: usize,
    /// Tracks that carried loudness measurements
    pub measured_count: usize,
    /// Energy mean of track loudness in LUFS
    pub album_loudness: Option<f64>,
    /// ReplayGain 2.0 album gain in dB
    pub album_gain: Option<f64>,
    /// Highest sample peak across tracks
    pub album_peak: Option<f64>,
    pub loudness: Option<LoudnessStats>,
    pub total_duration_secs: u64,
    pub formats: BTreeMap<String, usize>,
    pub sample_rates: BTreeMap<u32, usize>,
    pub bit_depths: BTreeMap<u32, usize>,
}

impl AlbumSummary {
    /// Summarize `tracks`, `None` when there are none
    pub fn from_tracks(tracks: &[TrackAnalysis]) -> Option<Self> {
        if tracks.is_empty() {
            return None;
        }

        let mut formats = BTreeMap::new();
        let mut sample_rates = BTreeMap::new();
        let mut bit_depths = BTreeMap::new();
        for track in tracks {
            *formats.entry(track.format_name.clone()).or_insert(0) += 1;
            *sample_rates.entry(track.sample_rate).or_insert(0) += 1;
            *bit_depths.entry(track.bit_depth).or_insert(0) += 1;
        }

        let measured: Vec<&TrackAnalysis> = tracks
            .iter()
            .filter(|track| track.loudness_measured && track.integrated_loudness.is_finite())
            .collect();
        let values: Vec<f64> = measured.iter().map(|t| t.integrated_loudness).collect();

        let album_loudness = energy_mean(&values);
        let album_peak = measured
            .iter()
            .map(|track| track.sample_peak)
            .reduce(f64::max);

        Some(Self {
            track_count: tracks.len(),
            measured_count: measured.len(),
            album_loudness,
            album_gain: album_loudness.map(replaygain_gain),
            album_peak,
            loudness: loudness_stats(&values),
            total_duration_secs: tracks.iter().map(|t| u64::from(t.duration_secs)).sum(),
            formats,
            sample_rates,
            bit_depths,
        })
    }

    /// Most common container format
    pub fn dominant_format(&self) -> Option<&str> {
        self.formats
            .iter()
            .max_by_key(|&(_, count)| *count)
            .map(|(name, _)| name.as_str())
    }
}

/// Loudness of the mean energy of `values` in LUFS
pub fn energy_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let energy: f64 =
        values.iter().map(|lufs| 10.0_f64.powf(lufs / 10.0)).sum::<f64>() / values.len() as f64;
    Some(10.0 * energy.log10())
}

fn loudness_stats(values: &[f64]) -> Option<LoudnessStats> {
    let first = *values.first()?;
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let std_dev = if values.len() > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1.0);
        variance.sqrt()
    } else {
        0.0
    };

    Some(LoudnessStats {
        min: values.iter().copied().fold(first, f64::min),
        max: values.iter().copied().fold(first, f64::max),
        mean,
        std_dev,
    })
}
