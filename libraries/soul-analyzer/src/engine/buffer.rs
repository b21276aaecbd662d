//! Output buffer shared by converter and meter

use std::collections::TryReserveError;

/// Interleaved f32 frames produced by a [`SampleConverter`](super::SampleConverter)
///
/// The buffer only grows. Growth goes through `try_reserve` so an allocation
/// failure surfaces as an error instead of aborting.
#[derive(Debug, Clone)]
pub struct ConversionBuffer {
    samples: Vec<f32>,
    channels: usize,
    capacity_frames: usize,
    grow_count: usize,
}

impl ConversionBuffer {
    pub fn try_new(frames: usize, channels: usize) -> Result<Self, TryReserveError> {
        let channels = channels.max(1);
        let mut samples = Vec::new();
        samples.try_reserve_exact(frames * channels)?;
        Ok(Self {
            samples,
            channels,
            capacity_frames: frames,
            grow_count: 0,
        })
    }

    /// Make room for `frames` frames. Returns whether the allocation grew.
    pub fn reserve_frames(&mut self, frames: usize) -> Result<bool, TryReserveError> {
        if frames <= self.capacity_frames {
            return Ok(false);
        }
        let wanted = frames * self.channels;
        self.samples
            .try_reserve_exact(wanted.saturating_sub(self.samples.len()))?;
        self.capacity_frames = frames;
        self.grow_count += 1;
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Append interleaved samples, growing past the reserved size if needed
    pub fn push_interleaved(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
        let frames = self.frames();
        if frames > self.capacity_frames {
            self.capacity_frames = frames;
            self.grow_count += 1;
        }
    }

    pub fn push_frame(&mut self, frame: impl IntoIterator<Item = f32>) {
        self.samples.extend(frame);
        let frames = self.frames();
        if frames > self.capacity_frames {
            self.capacity_frames = frames;
            self.grow_count += 1;
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames currently held
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Bytes reserved for samples
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_frames * self.channels * std::mem::size_of::<f32>()
    }

    /// How many times the buffer had to grow
    pub fn grow_count(&self) -> usize {
        self.grow_count
    }
}
