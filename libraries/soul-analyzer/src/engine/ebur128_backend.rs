//! EBU R128 measurement with the ebur128 crate

use super::{LoudnessMeter, MeterMode};
use crate::error::EngineError;
use ebur128::{EbuR128, Mode};

/// Native code for a successful call
pub const LOUDNESS_SUCCESS: i32 = 0;

/// Human-readable text for a loudness engine code
pub fn loudness_error_message(code: i32) -> String {
    match code {
        LOUDNESS_SUCCESS => "Success".to_string(),
        1 => "Not enough memory".to_string(),
        2 => "Invalid mode".to_string(),
        3 => "Invalid channel index".to_string(),
        4 => "No change".to_string(),
        other => format!("Unknown loudness engine error: {}", other),
    }
}

fn native_code(err: ebur128::Error) -> i32 {
    match err {
        ebur128::Error::NoMem => 1,
        ebur128::Error::InvalidMode => 2,
        ebur128::Error::InvalidChannelIndex => 3,
    }
}

impl From<ebur128::Error> for EngineError {
    fn from(err: ebur128::Error) -> Self {
        Self::loudness(native_code(err))
    }
}

/// [`LoudnessMeter`] backed by [`EbuR128`]
pub struct Ebur128Meter {
    inner: EbuR128,
    channels: u32,
    frames: u64,
}

impl Ebur128Meter {
    pub fn new(channels: u32, sample_rate: u32, mode: MeterMode) -> Result<Self, EngineError> {
        let mut flags = Mode::empty();
        if mode.integrated {
            flags |= Mode::I;
        }
        if mode.sample_peak {
            flags |= Mode::SAMPLE_PEAK;
        }
        if mode.loudness_range {
            flags |= Mode::LRA;
        }

        let inner = EbuR128::new(channels, sample_rate, flags)?;
        tracing::debug!(channels, sample_rate, ?mode, "Loudness meter ready");

        Ok(Self {
            inner,
            channels,
            frames: 0,
        })
    }

    /// Frames added so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl LoudnessMeter for Ebur128Meter {
    fn add_frames(&mut self, samples: &[f32]) -> Result<(), EngineError> {
        if samples.is_empty() {
            return Ok(());
        }
        self.inner.add_frames_f32(samples)?;
        self.frames += (samples.len() / self.channels.max(1) as usize) as u64;
        Ok(())
    }

    fn loudness_global(&self) -> Result<f64, EngineError> {
        Ok(self.inner.loudness_global()?)
    }

    fn relative_threshold(&self) -> Result<f64, EngineError> {
        Ok(self.inner.relative_threshold()?)
    }

    fn loudness_range(&self) -> Result<f64, EngineError> {
        Ok(self.inner.loudness_range()?)
    }

    fn sample_peak(&self, channel: u32) -> Result<f64, EngineError> {
        Ok(self.inner.sample_peak(channel)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(frequency: f32, amplitude: f32, sample_rate: u32, seconds: f32, channels: usize) -> Vec<f32> {
        let frames = (sample_rate as f32 * seconds) as usize;
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let value = amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin();
            for _ in 0..channels {
                samples.push(value);
            }
        }
        samples
    }

    #[test]
    fn test_messages() {
        assert_eq!(loudness_error_message(0), "Success");
        assert_eq!(loudness_error_message(1), "Not enough memory");
        assert_eq!(loudness_error_message(4), "No change");
        assert_eq!(loudness_error_message(99), "Unknown loudness engine error: 99");
    }

    #[test]
    fn test_codes_match_messages() {
        let err: EngineError = ebur128::Error::InvalidChannelIndex.into();
        assert_eq!(err.code, Some(3));
        assert_eq!(err.message, "Invalid channel index");
    }

    #[test]
    fn test_every_crate_error_has_a_code() {
        let cases = [
            (ebur128::Error::NoMem, 1, "Not enough memory"),
            (ebur128::Error::InvalidMode, 2, "Invalid mode"),
            (ebur128::Error::InvalidChannelIndex, 3, "Invalid channel index"),
        ];
        for (native, code, message) in cases {
            let err: EngineError = native.into();
            assert_eq!(err.code, Some(code));
            assert_eq!(err.message, message);
        }
        // Code 4 only exists in the native numbering
        assert_eq!(loudness_error_message(4), "No change");
    }

    #[test]
    fn test_sine_loudness() {
        let mut meter = Ebur128Meter::new(2, 48000, MeterMode::new(false)).unwrap();
        meter
            .add_frames(&sine(1000.0, 0.5, 48000, 5.0, 2))
            .unwrap();

        let loudness = meter.loudness_global().unwrap();
        // Stereo 1 kHz at -6 dBFS sits near -6 LUFS
        assert!(loudness > -8.0 && loudness < -4.0, "got {}", loudness);

        let peak = meter.sample_peak(0).unwrap();
        assert!((peak - 0.5).abs() < 0.01, "got {}", peak);
        assert_eq!(meter.frames(), 240_000);
    }

    #[test]
    fn test_range_requires_mode() {
        let meter = Ebur128Meter::new(1, 48000, MeterMode::new(false)).unwrap();
        assert_eq!(meter.loudness_range().unwrap_err().code, Some(2));
    }

    #[test]
    fn test_invalid_channel_index() {
        let meter = Ebur128Meter::new(2, 48000, MeterMode::new(false)).unwrap();
        let err = meter.sample_peak(5).unwrap_err();
        assert_eq!(err.code, Some(3));
    }
}
