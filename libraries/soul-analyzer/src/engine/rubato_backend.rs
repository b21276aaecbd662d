//! Sample conversion with rubato
//!
//! Every decoded frame becomes interleaved f32. When the meter runs at a
//! different rate than the decoder a sinc resampler sits behind the format
//! conversion. Its filter delay is trimmed from the front of the output and
//! the tail is recovered on drain, so the output length matches the input
//! length scaled by the rate ratio.

use super::{ConversionBuffer, ConverterSpec, DecodedFrame, SampleConverter};
use crate::error::EngineError;
use rubato::{
    Resampler as RubatoResamplerTrait, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use std::collections::VecDeque;

const CHUNK_FRAMES: usize = 1024;

/// Zero-filled chunks pushed through on drain before giving up on the tail
const MAX_DRAIN_CHUNKS: usize = 8;

/// Format conversion plus optional rate conversion
pub struct RubatoConverter {
    channels: usize,
    output_rate: u32,
    resampler: Option<RateConverter>,
    scratch: Vec<f32>,
}

impl RubatoConverter {
    pub fn new(spec: ConverterSpec) -> Result<Self, EngineError> {
        if spec.channels == 0 {
            return Err(EngineError::resampler("converter needs at least one channel"));
        }
        if spec.input_rate == 0 || spec.output_rate == 0 {
            return Err(EngineError::resampler(format!(
                "invalid conversion rates {} Hz -> {} Hz",
                spec.input_rate, spec.output_rate
            )));
        }

        let resampler = if spec.input_rate == spec.output_rate {
            None
        } else {
            Some(RateConverter::new(
                spec.input_rate,
                spec.output_rate,
                spec.channels,
            )?)
        };

        tracing::debug!(
            input_format = ?spec.input_format,
            input_rate = spec.input_rate,
            output_rate = spec.output_rate,
            channels = spec.channels,
            resampling = resampler.is_some(),
            "Sample converter ready"
        );

        Ok(Self {
            channels: spec.channels,
            output_rate: spec.output_rate,
            resampler,
            scratch: Vec::new(),
        })
    }
}

impl SampleConverter for RubatoConverter {
    fn delay(&self) -> Result<u64, EngineError> {
        Ok(self.resampler.as_ref().map_or(0, RateConverter::delay))
    }

    fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn convert(
        &mut self,
        input: Option<&DecodedFrame>,
        output: &mut ConversionBuffer,
    ) -> Result<usize, EngineError> {
        output.clear();

        let Some(frame) = input else {
            return match &mut self.resampler {
                Some(resampler) => resampler.drain(output),
                None => Ok(0),
            };
        };

        if frame.channels != self.channels {
            return Err(EngineError::resampler(format!(
                "channel count changed from {} to {}",
                self.channels, frame.channels
            )));
        }
        if frame.data.len() != frame.nb_samples * frame.channels {
            return Err(EngineError::resampler(format!(
                "frame holds {} samples, expected {}",
                frame.data.len(),
                frame.nb_samples * frame.channels
            )));
        }

        self.scratch.clear();
        frame.data.append_f32(&mut self.scratch);

        match &mut self.resampler {
            Some(resampler) => resampler.push(&self.scratch, output),
            None => {
                output.push_interleaved(&self.scratch);
                Ok(frame.nb_samples)
            }
        }
    }
}

struct RateConverter {
    inner: SincFixedIn<f32>,
    channels: usize,
    ratio: f64,
    /// Interleaved input not yet forming a full chunk
    pending: VecDeque<f32>,
    /// Output frames still to discard for the filter delay
    skip: usize,
    frames_in: u64,
    frames_out: u64,
}

impl RateConverter {
    fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self, EngineError> {
        let ratio = f64::from(output_rate) / f64::from(input_rate);
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, channels)
            .map_err(|e| EngineError::resampler(format!("SincFixedIn creation failed: {}", e)))?;
        let skip = inner.output_delay();

        Ok(Self {
            inner,
            channels,
            ratio,
            pending: VecDeque::new(),
            skip,
            frames_in: 0,
            frames_out: 0,
        })
    }

    fn delay(&self) -> u64 {
        let pending_frames = (self.pending.len() / self.channels) as f64;
        (pending_frames * self.ratio).ceil() as u64 + self.inner.output_delay() as u64
    }

    fn push(&mut self, samples: &[f32], output: &mut ConversionBuffer) -> Result<usize, EngineError> {
        self.pending.extend(samples.iter().copied());
        self.frames_in += (samples.len() / self.channels) as u64;

        let mut written = 0;
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending.len() < needed * self.channels {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed * self.channels).collect();
            let planes = self.deinterleave(&chunk);
            let resampled = self
                .inner
                .process(&planes, None)
                .map_err(|e| EngineError::resampler(format!("resampling failed: {}", e)))?;
            written += self.emit(&resampled, None, output);
        }
        Ok(written)
    }

    fn drain(&mut self, output: &mut ConversionBuffer) -> Result<usize, EngineError> {
        let expected = (self.frames_in as f64 * self.ratio).round() as u64;
        let mut written = 0;

        if !self.pending.is_empty() {
            let chunk: Vec<f32> = self.pending.drain(..).collect();
            let planes = self.deinterleave(&chunk);
            let resampled = self
                .inner
                .process_partial(Some(planes.as_slice()), None)
                .map_err(|e| EngineError::resampler(format!("flush failed: {}", e)))?;
            written += self.emit(&resampled, Some(expected), output);
        }

        let mut chunks = 0;
        while self.frames_out < expected && chunks < MAX_DRAIN_CHUNKS {
            let resampled = self
                .inner
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|e| EngineError::resampler(format!("flush failed: {}", e)))?;
            written += self.emit(&resampled, Some(expected), output);
            chunks += 1;
        }

        Ok(written)
    }

    fn deinterleave(&self, interleaved: &[f32]) -> Vec<Vec<f32>> {
        let frames = interleaved.len() / self.channels;
        let mut planes = vec![Vec::with_capacity(frames); self.channels];
        for frame in interleaved.chunks_exact(self.channels) {
            for (plane, &sample) in planes.iter_mut().zip(frame) {
                plane.push(sample);
            }
        }
        planes
    }

    /// Interleave resampled planes into `output`, honoring the delay skip and an optional cap
    fn emit(&mut self, planes: &[Vec<f32>], cap: Option<u64>, output: &mut ConversionBuffer) -> usize {
        let frames = planes.first().map_or(0, Vec::len);
        let mut written = 0;
        for index in 0..frames {
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if cap.is_some_and(|cap| self.frames_out >= cap) {
                break;
            }
            output.push_frame(planes.iter().map(|plane| plane[index]));
            self.frames_out += 1;
            written += 1;
        }
        written
    }
}
