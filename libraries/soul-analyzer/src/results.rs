//! Per-track analysis results

use serde::{Deserialize, Serialize};
use std::fmt;

/// ReplayGain 2.0 reference loudness in LUFS
pub const REPLAYGAIN_REFERENCE_LUFS: f64 = -18.0;

/// Absolute gating threshold of BS.1770, used when no relative threshold is available
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;

/// Everything learned about one audio file
///
/// Numeric fields use zero for "not measured". The bit rate is the one
/// exception since an unknown bit rate is common and not a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    /// Short container name, e.g. "flac" or "wav"
    pub format_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Bits per second, `None` when no heuristic could determine it
    pub bit_rate: Option<u32>,
    pub bit_depth: u32,
    /// Rounded duration in seconds
    pub duration_secs: u32,
    /// Absolute difference between metadata and sample-counted duration
    pub duration_diff: u32,
    /// Decoded frames per channel, zero when the file was not decoded
    pub total_frames: u64,

    /// Whether the loudness fields below were measured
    pub loudness_measured: bool,
    /// Integrated loudness in LUFS
    pub integrated_loudness: f64,
    /// Relative gating threshold in LUFS
    pub relative_threshold: f64,
    /// Loudness range in LU, only when requested
    pub loudness_range: Option<f64>,
    /// Highest absolute sample value across channels, linear
    pub sample_peak: f64,
    /// ReplayGain 2.0 track gain in dB
    pub rg2_gain: f64,
}

impl TrackAnalysis {
    /// Sample peak in dBFS
    pub fn sample_peak_dbfs(&self) -> f64 {
        if self.sample_peak > 0.0 {
            20.0 * self.sample_peak.log10()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Bit rate in kbit/s
    pub fn bit_rate_kbps(&self) -> Option<f64> {
        self.bit_rate.map(|rate| f64::from(rate) / 1000.0)
    }
}

impl fmt::Display for TrackAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} Hz {}-bit, {} s",
            self.format_name, self.sample_rate, self.bit_depth, self.duration_secs
        )?;
        if self.loudness_measured {
            write!(
                f,
                ", {:.2} LUFS, gain {:+.2} dB",
                self.integrated_loudness, self.rg2_gain
            )?;
        }
        Ok(())
    }
}

/// ReplayGain 2.0 gain for a measured loudness
pub fn replaygain_gain(loudness_lufs: f64) -> f64 {
    REPLAYGAIN_REFERENCE_LUFS - loudness_lufs
}
