//! Analysis options

use serde::{Deserialize, Serialize};

/// Limits for the rate the loudness meter runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Highest decoder rate fed to the meter unchanged
    pub max_meter_rate: u32,
    /// Rate used for streams above `max_meter_rate`
    pub fallback_meter_rate: u32,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            max_meter_rate: 384_000,
            fallback_meter_rate: 48_000,
        }
    }
}

impl ConversionSettings {
    /// Meter rate for a stream decoded at `decoder_rate`
    pub fn meter_rate(&self, decoder_rate: u32) -> u32 {
        if decoder_rate > self.max_meter_rate {
            self.fallback_meter_rate
        } else {
            decoder_rate
        }
    }
}

/// What an analysis run does beyond reading metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Decode the whole stream (counts frames, reconciles duration)
    pub decode: bool,
    /// Measure EBU R128 loudness, ignored unless `decode` is set
    pub measure_loudness: bool,
    /// Also measure loudness range, ignored unless loudness is measured
    pub measure_range: bool,
    pub conversion: ConversionSettings,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            decode: true,
            measure_loudness: true,
            measure_range: false,
            conversion: ConversionSettings::default(),
        }
    }
}

impl AnalysisOptions {
    /// Metadata only, nothing is decoded
    pub fn metadata_only() -> Self {
        Self {
            decode: false,
            measure_loudness: false,
            measure_range: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn decode(mut self, decode: bool) -> Self {
        self.decode = decode;
        self
    }

    #[must_use]
    pub fn measure_loudness(mut self, measure: bool) -> Self {
        self.measure_loudness = measure;
        self
    }

    #[must_use]
    pub fn measure_range(mut self, measure: bool) -> Self {
        self.measure_range = measure;
        self
    }

    #[must_use]
    pub fn conversion(mut self, conversion: ConversionSettings) -> Self {
        self.conversion = conversion;
        self
    }

    /// Whether a loudness meter is needed for this run
    pub fn meters_loudness(&self) -> bool {
        self.decode && self.measure_loudness
    }
}
