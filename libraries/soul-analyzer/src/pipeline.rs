//! Session initialization and basic track information

use crate::engine::{
    Backend, ConversionBuffer, ConverterSpec, MediaType, MeterMode, NativeBackend, SampleFormat,
};
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::heuristics::{
    container_duration_secs, resolve_bit_depth, resolve_bit_rate, stream_duration_secs,
    BitDepthInputs, BitRateInputs,
};
use crate::options::AnalysisOptions;
use crate::results::TrackAnalysis;
use crate::session::Session;
use std::path::Path;

/// Entry point for analyzing files
///
/// Holds the engine [`Backend`]. The default backend decodes with symphonia,
/// converts with rubato and measures with ebur128.
pub struct Analyzer {
    backend: Box<dyn Backend>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").finish_non_exhaustive()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self::with_backend(NativeBackend)
    }

    pub fn with_backend(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Run every stage the options ask for
    ///
    /// Metadata failures return no partial results. Failures while decoding
    /// carry the basic track information gathered before decoding started.
    pub fn analyze(&self, path: impl AsRef<Path>, options: AnalysisOptions) -> Result<TrackAnalysis> {
        let path = path.as_ref();
        let mut session = self.open(path, options)?;
        session.fill_basic_info()?;

        if options.decode {
            let basic = session.results().clone();
            if let Err(err) = session.process() {
                tracing::debug!(path = %path.display(), error = %err, "Decoding failed");
                return Err(err.with_partial(basic));
            }
        }

        let results = session.close();
        tracing::info!(
            path = %path.display(),
            format = %results.format_name,
            sample_rate = results.sample_rate,
            duration_secs = results.duration_secs,
            loudness = results.loudness_measured.then_some(results.integrated_loudness),
            "Track analyzed"
        );
        Ok(results)
    }

    /// Open a file and prepare every engine the options need
    ///
    /// On failure all engines created so far are released before returning.
    pub fn open(&self, path: impl AsRef<Path>, options: AnalysisOptions) -> Result<Session> {
        let mut session = Session::new(options);
        match initialize(&mut session, self.backend.as_ref(), path.as_ref()) {
            Ok(()) => Ok(session),
            Err(err) => {
                session.release();
                Err(err)
            }
        }
    }
}

fn initialize(session: &mut Session, backend: &dyn Backend, path: &Path) -> Result<()> {
    backend.quiet_engine_logging();
    tracing::debug!(path = %path.display(), "Opening input");

    let demuxer = session.demuxer.insert(
        backend
            .open_input(path)
            .map_err(AnalysisError::from_engine(ErrorKind::FileNotFound))?,
    );

    demuxer
        .find_stream_info()
        .map_err(AnalysisError::from_engine(ErrorKind::NoAudioStream))?;

    let stream_index = demuxer
        .best_audio_stream()
        .ok_or_else(|| AnalysisError::new(ErrorKind::NoAudioStream))?;
    let stream = demuxer
        .streams()
        .get(stream_index)
        .filter(|stream| stream.params.media_type == MediaType::Audio)
        .ok_or_else(|| AnalysisError::new(ErrorKind::NoAudioStream))?;
    let params = stream.params.clone();
    session.audio_stream = stream_index;

    let mut builder = demuxer
        .find_decoder(stream_index)
        .ok_or_else(|| AnalysisError::new(ErrorKind::NoDecoder))?;
    builder
        .apply_parameters(&params)
        .map_err(AnalysisError::from_engine(ErrorKind::DecoderInit))?;
    builder
        .request_sample_format(SampleFormat::F32)
        .map_err(AnalysisError::from_engine(ErrorKind::DecoderInit))?;
    let decoder = session.decoder.insert(
        builder
            .open()
            .map_err(AnalysisError::from_engine(ErrorKind::DecoderInit))?,
    );

    tracing::debug!(
        stream = stream_index,
        codec = ?params.codec,
        sample_rate = decoder.sample_rate(),
        channels = decoder.channels(),
        "Decoder ready"
    );

    if !session.options.meters_loudness() {
        return Ok(());
    }

    let decoder_rate = decoder.sample_rate();
    let channels = decoder.channels();
    let meter_rate = session.options.conversion.meter_rate(decoder_rate);
    if meter_rate != decoder_rate {
        tracing::warn!(
            decoder_rate,
            meter_rate,
            "Sample rate above meter limit, resampling for loudness"
        );
    }

    session.meter = Some(
        backend
            .new_meter(
                channels as u32,
                meter_rate,
                MeterMode::new(session.options.measure_range),
            )
            .map_err(AnalysisError::from_engine(ErrorKind::LoudnessInit))?,
    );

    let input_format = decoder.sample_format();
    if input_format == Some(SampleFormat::F32) && meter_rate == decoder_rate {
        return Ok(());
    }

    let frames = decoder
        .frame_size()
        .filter(|&frames| frames > 0)
        .unwrap_or(decoder_rate as usize);
    session.conversion_buffer = Some(
        ConversionBuffer::try_new(frames, channels)
            .map_err(|_| AnalysisError::new(ErrorKind::OutOfMemory))?,
    );

    session.converter = Some(
        backend
            .new_converter(ConverterSpec {
                input_format,
                input_rate: decoder_rate,
                output_rate: meter_rate,
                channels,
            })
            .map_err(AnalysisError::from_engine(ErrorKind::ResamplerInit))?,
    );

    Ok(())
}

impl Session {
    /// Populate format, rates, bit depth, bit rate and duration from metadata
    pub fn fill_basic_info(&mut self) -> Result<()> {
        let (Some(demuxer), Some(decoder)) = (self.demuxer.as_deref(), self.decoder.as_deref())
        else {
            return Err(AnalysisError::new(ErrorKind::MalformedStreamInfo));
        };
        let results = &mut self.results;

        results.format_name = demuxer
            .format_name()
            .ok_or_else(|| AnalysisError::new(ErrorKind::MalformedStreamInfo))?
            .to_string();

        let stream = demuxer
            .streams()
            .get(self.audio_stream)
            .ok_or_else(|| AnalysisError::new(ErrorKind::MalformedStreamInfo))?;
        let params = &stream.params;

        results.sample_rate = params
            .sample_rate
            .filter(|&rate| rate > 0)
            .or_else(|| Some(decoder.sample_rate()).filter(|&rate| rate > 0))
            .ok_or_else(|| AnalysisError::new(ErrorKind::MalformedStreamInfo))?;

        results.duration_secs = if let Some(micros) = demuxer.duration_micros() {
            container_duration_secs(micros)
        } else if let (Some(duration), Some(time_base)) = (stream.duration, stream.time_base) {
            stream_duration_secs(duration, time_base)
        } else {
            return Err(AnalysisError::new(ErrorKind::MalformedStreamInfo));
        };

        results.channels = params
            .channels
            .unwrap_or_else(|| decoder.channels() as u16);

        results.bit_depth = resolve_bit_depth(&BitDepthInputs {
            params,
            decoder_bits_per_coded_sample: decoder.bits_per_coded_sample(),
            decoder_bits_per_raw_sample: decoder.bits_per_raw_sample(),
            decoder_format: decoder.sample_format(),
        });

        let audio_stream_count = demuxer
            .streams()
            .iter()
            .filter(|stream| stream.params.media_type == MediaType::Audio)
            .count();
        let bit_rate = resolve_bit_rate(&BitRateInputs {
            codec_bit_rate: params.bit_rate,
            container_bit_rate: demuxer.bit_rate(),
            decoder_bit_rate: decoder.bit_rate(),
            audio_stream_count,
            duration_secs: results.duration_secs,
            file_size: demuxer.file_size(),
        });
        results.bit_rate = bit_rate.and_then(|rate| u32::try_from(rate).ok());
        if results.bit_rate.is_none() {
            tracing::warn!(format = %results.format_name, "Bit rate could not be determined");
        }

        tracing::debug!(
            format = %results.format_name,
            sample_rate = results.sample_rate,
            channels = results.channels,
            bit_depth = results.bit_depth,
            bit_rate = ?results.bit_rate,
            duration_secs = results.duration_secs,
            "Basic info extracted"
        );

        Ok(())
    }
}
