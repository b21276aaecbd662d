//! Per-file analysis state

use crate::engine::{ConversionBuffer, Decoder, Demuxer, LoudnessMeter, SampleConverter};
use crate::options::AnalysisOptions;
use crate::results::TrackAnalysis;

/// Engines and results for one file
///
/// Created by [`Analyzer::open`](crate::Analyzer::open). Stages run in order:
/// [`fill_basic_info`](Self::fill_basic_info), then optionally
/// [`process`](Self::process). Engines are released exactly once, either by
/// [`close`](Self::close) or on drop, whichever comes first.
pub struct Session {
    pub(crate) demuxer: Option<Box<dyn Demuxer>>,
    pub(crate) decoder: Option<Box<dyn Decoder>>,
    pub(crate) converter: Option<Box<dyn SampleConverter>>,
    pub(crate) conversion_buffer: Option<ConversionBuffer>,
    pub(crate) meter: Option<Box<dyn LoudnessMeter>>,
    pub(crate) audio_stream: usize,
    pub(crate) options: AnalysisOptions,
    pub(crate) results: TrackAnalysis,
    released: bool,
}

impl Session {
    pub(crate) fn new(options: AnalysisOptions) -> Self {
        Self {
            demuxer: None,
            decoder: None,
            converter: None,
            conversion_buffer: None,
            meter: None,
            audio_stream: 0,
            options,
            results: TrackAnalysis::default(),
            released: false,
        }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Results gathered so far
    pub fn results(&self) -> &TrackAnalysis {
        &self.results
    }

    /// Index of the selected audio stream
    pub fn audio_stream(&self) -> usize {
        self.audio_stream
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release all engines and hand back the results
    pub fn close(mut self) -> TrackAnalysis {
        self.release();
        std::mem::take(&mut self.results)
    }

    /// Drop every engine handle that is present. Safe to call repeatedly.
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Decoder before the demuxer that feeds it
        self.decoder.take();
        self.demuxer.take();
        self.meter.take();
        self.converter.take();
        self.conversion_buffer.take();

        tracing::trace!("Analysis session released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("demuxer", &self.demuxer.is_some())
            .field("decoder", &self.decoder.is_some())
            .field("converter", &self.converter.is_some())
            .field("meter", &self.meter.is_some())
            .field("audio_stream", &self.audio_stream)
            .field("options", &self.options)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
