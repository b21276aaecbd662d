//! Engine capabilities used by the analysis pipeline
//!
//! The pipeline only talks to the traits in this module. [`NativeBackend`]
//! provides them with symphonia (demuxing and decoding), rubato (sample rate
//! conversion) and ebur128 (loudness), tests substitute scripted doubles.
//!
//! Decoders follow a send/receive protocol: after a packet is sent,
//! [`Decoder::receive_frame`] is polled until it reports
//! [`ReceiveStatus::NeedsInput`]. Sending `None` asks the decoder to flush,
//! once drained it reports [`ReceiveStatus::EndOfStream`].

mod buffer;
mod ebur128_backend;
mod rubato_backend;
mod sniff;
mod symphonia_backend;

pub use buffer::ConversionBuffer;
pub use ebur128_backend::{loudness_error_message, Ebur128Meter};
pub use rubato_backend::RubatoConverter;
pub use sniff::{format_name_for, sniff_format_name};
pub use symphonia_backend::{SymphoniaDecoder, SymphoniaDecoderBuilder, SymphoniaDemuxer};

use crate::error::EngineError;
use std::path::Path;
use std::sync::Once;

/// Storage format of decoded samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    U16,
    U24,
    U32,
    S8,
    S16,
    S24,
    S32,
    F32,
    F64,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U24 | Self::S24 => 3,
            Self::U32 | Self::S32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Video,
    Other,
}

/// Codec identity as far as the analysis heuristics care
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    /// Uncompressed PCM with its storage format
    Pcm(SampleFormat),
    Flac,
    Alac,
    Mp1,
    Mp2,
    Mp3,
    Aac,
    Vorbis,
    Opus,
    Other(String),
}

impl Codec {
    pub fn is_pcm(&self) -> bool {
        matches!(self, Self::Pcm(_))
    }

    /// Lossy codecs decode to float and have no meaningful source bit depth
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            Self::Mp1 | Self::Mp2 | Self::Mp3 | Self::Aac | Self::Vorbis | Self::Opus
        )
    }
}

/// Stream parameters as reported by the container
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParams {
    pub media_type: MediaType,
    pub codec: Codec,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub bits_per_coded_sample: Option<u32>,
    pub bits_per_raw_sample: Option<u32>,
    pub bit_rate: Option<u64>,
    /// Codec private data, e.g. the FLAC STREAMINFO block
    pub extra_data: Option<Vec<u8>>,
    pub frame_size: Option<usize>,
}

impl CodecParams {
    pub fn new(media_type: MediaType, codec: Codec) -> Self {
        Self {
            media_type,
            codec,
            sample_rate: None,
            channels: None,
            bits_per_coded_sample: None,
            bits_per_raw_sample: None,
            bit_rate: None,
            extra_data: None,
            frame_size: None,
        }
    }

    pub fn audio(codec: Codec) -> Self {
        Self::new(MediaType::Audio, codec)
    }
}

/// Rational time base of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub numer: u32,
    pub denom: u32,
}

impl TimeBase {
    pub fn new(numer: u32, denom: u32) -> Self {
        Self { numer, denom }
    }

    /// Seconds spanned by `ticks` units of this time base
    pub fn seconds(self, ticks: u64) -> f64 {
        if self.denom == 0 {
            return 0.0;
        }
        ticks as f64 * f64::from(self.numer) / f64::from(self.denom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub params: CodecParams,
    /// Stream length in `time_base` units
    pub duration: Option<u64>,
    pub time_base: Option<TimeBase>,
}

/// Compressed data for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    pub timestamp: u64,
    pub duration: u64,
    pub data: Box<[u8]>,
}

/// Interleaved decoded samples
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    /// 24-bit values in the low bits
    U24(Vec<u32>),
    U32(Vec<u32>),
    S8(Vec<i8>),
    S16(Vec<i16>),
    /// 24-bit values sign-extended to 32 bits
    S24(Vec<i32>),
    S32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl FrameData {
    pub fn format(&self) -> SampleFormat {
        match self {
            Self::U8(_) => SampleFormat::U8,
            Self::U16(_) => SampleFormat::U16,
            Self::U24(_) => SampleFormat::U24,
            Self::U32(_) => SampleFormat::U32,
            Self::S8(_) => SampleFormat::S8,
            Self::S16(_) => SampleFormat::S16,
            Self::S24(_) => SampleFormat::S24,
            Self::S32(_) => SampleFormat::S32,
            Self::F32(_) => SampleFormat::F32,
            Self::F64(_) => SampleFormat::F64,
        }
    }

    /// Total number of samples across channels
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U24(v) | Self::U32(v) => v.len(),
            Self::S8(v) => v.len(),
            Self::S16(v) => v.len(),
            Self::S24(v) | Self::S32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append every sample as f32 in the nominal [-1.0, 1.0] range
    pub fn append_f32(&self, out: &mut Vec<f32>) {
        match self {
            Self::U8(v) => out.extend(v.iter().map(|&s| (f32::from(s) - 128.0) / 128.0)),
            Self::U16(v) => out.extend(v.iter().map(|&s| (f32::from(s) - 32768.0) / 32768.0)),
            Self::U24(v) => out.extend(v.iter().map(|&s| (s as f32 - 8_388_608.0) / 8_388_608.0)),
            Self::U32(v) => out.extend(
                v.iter()
                    .map(|&s| ((f64::from(s) - 2_147_483_648.0) / 2_147_483_648.0) as f32),
            ),
            Self::S8(v) => out.extend(v.iter().map(|&s| f32::from(s) / 128.0)),
            Self::S16(v) => out.extend(v.iter().map(|&s| f32::from(s) / 32768.0)),
            Self::S24(v) => out.extend(v.iter().map(|&s| s as f32 / 8_388_608.0)),
            Self::S32(v) => {
                out.extend(v.iter().map(|&s| (f64::from(s) / 2_147_483_648.0) as f32));
            }
            Self::F32(v) => out.extend_from_slice(v),
            Self::F64(v) => out.extend(v.iter().map(|&s| s as f32)),
        }
    }
}

/// One decoded frame, reused across receive calls
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub channels: usize,
    /// Samples per channel
    pub nb_samples: usize,
    pub sample_rate: u32,
    pub data: FrameData,
}

impl Default for DecodedFrame {
    fn default() -> Self {
        Self {
            channels: 0,
            nb_samples: 0,
            sample_rate: 0,
            data: FrameData::F32(Vec::new()),
        }
    }
}

impl DecodedFrame {
    pub fn format(&self) -> SampleFormat {
        self.data.format()
    }

    /// Samples when already interleaved f32
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            FrameData::F32(samples) => Some(samples),
            _ => None,
        }
    }
}

/// Outcome of polling a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// A frame was written into the caller's buffer
    Frame,
    /// More input is required before another frame is available
    NeedsInput,
    /// Flushed and fully drained
    EndOfStream,
}

/// Which measurements a loudness meter accumulates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterMode {
    pub integrated: bool,
    pub sample_peak: bool,
    pub loudness_range: bool,
}

impl MeterMode {
    /// Integrated loudness and sample peak, plus loudness range on request
    pub fn new(loudness_range: bool) -> Self {
        Self {
            integrated: true,
            sample_peak: true,
            loudness_range,
        }
    }
}

/// Parameters for a sample converter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConverterSpec {
    /// Decoder output format, `None` when unknown until the first frame
    pub input_format: Option<SampleFormat>,
    pub input_rate: u32,
    pub output_rate: u32,
    pub channels: usize,
}

/// Factory for the engines of one analysis run
pub trait Backend: Send + Sync {
    fn open_input(&self, path: &Path) -> Result<Box<dyn Demuxer>, EngineError>;

    fn new_converter(&self, spec: ConverterSpec) -> Result<Box<dyn SampleConverter>, EngineError>;

    fn new_meter(
        &self,
        channels: u32,
        sample_rate: u32,
        mode: MeterMode,
    ) -> Result<Box<dyn LoudnessMeter>, EngineError>;

    /// Restrict engine diagnostics to errors. Called on every run, must be idempotent.
    fn quiet_engine_logging(&self) {}
}

/// An opened container
pub trait Demuxer {
    /// Read enough of the file to describe its streams
    fn find_stream_info(&mut self) -> Result<(), EngineError>;

    fn format_name(&self) -> Option<&str>;

    fn streams(&self) -> &[StreamInfo];

    /// Index of the stream worth analyzing, if any
    fn best_audio_stream(&self) -> Option<usize>;

    /// Container-level duration
    fn duration_micros(&self) -> Option<u64>;

    /// Container-level bit rate in bits per second
    fn bit_rate(&self) -> Option<u64>;

    fn file_size(&self) -> Option<u64>;

    fn find_decoder(&self, stream_index: usize) -> Option<Box<dyn DecoderBuilder>>;

    /// Next packet of any stream, `Ok(None)` at end of file
    fn read_packet(&mut self) -> Result<Option<Packet>, EngineError>;
}

/// A decoder that has been found but not opened yet
pub trait DecoderBuilder {
    fn apply_parameters(&mut self, params: &CodecParams) -> Result<(), EngineError>;

    /// Preferred output format, decoders may ignore it
    fn request_sample_format(&mut self, format: SampleFormat) -> Result<(), EngineError>;

    fn open(self: Box<Self>) -> Result<Box<dyn Decoder>, EngineError>;
}

pub trait Decoder {
    /// Output format, `None` until known
    fn sample_format(&self) -> Option<SampleFormat>;

    /// Output rate, zero when unknown
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> usize;

    fn bits_per_coded_sample(&self) -> Option<u32>;

    fn bits_per_raw_sample(&self) -> Option<u32>;

    fn bit_rate(&self) -> Option<u64>;

    /// Typical samples per channel in one frame
    fn frame_size(&self) -> Option<usize>;

    /// Hand a packet to the decoder, `None` starts the flush
    fn send_packet(&mut self, packet: Option<Packet>) -> Result<(), EngineError>;

    fn receive_frame(&mut self, frame: &mut DecodedFrame) -> Result<ReceiveStatus, EngineError>;
}

/// Converts decoded frames to interleaved f32 at the meter rate
pub trait SampleConverter {
    /// Frames currently held back, measured at the output rate
    fn delay(&self) -> Result<u64, EngineError>;

    fn output_rate(&self) -> u32;

    /// Convert `input` into `output` (cleared first). `None` drains what is held back.
    /// Returns the number of frames written.
    fn convert(
        &mut self,
        input: Option<&DecodedFrame>,
        output: &mut ConversionBuffer,
    ) -> Result<usize, EngineError>;
}

/// EBU R128 accumulator
pub trait LoudnessMeter {
    /// Add interleaved f32 frames
    fn add_frames(&mut self, samples: &[f32]) -> Result<(), EngineError>;

    fn loudness_global(&self) -> Result<f64, EngineError>;

    fn relative_threshold(&self) -> Result<f64, EngineError>;

    fn loudness_range(&self) -> Result<f64, EngineError>;

    fn sample_peak(&self, channel: u32) -> Result<f64, EngineError>;
}

/// symphonia + rubato + ebur128
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl Backend for NativeBackend {
    fn open_input(&self, path: &Path) -> Result<Box<dyn Demuxer>, EngineError> {
        Ok(Box::new(SymphoniaDemuxer::open(path)?))
    }

    fn new_converter(&self, spec: ConverterSpec) -> Result<Box<dyn SampleConverter>, EngineError> {
        Ok(Box::new(RubatoConverter::new(spec)?))
    }

    fn new_meter(
        &self,
        channels: u32,
        sample_rate: u32,
        mode: MeterMode,
    ) -> Result<Box<dyn LoudnessMeter>, EngineError> {
        Ok(Box::new(Ebur128Meter::new(channels, sample_rate, mode)?))
    }

    fn quiet_engine_logging(&self) {
        static QUIET: Once = Once::new();
        QUIET.call_once(|| {
            // symphonia reports recoverable stream oddities through `log`
            log::set_max_level(log::LevelFilter::Error);
        });
    }
}
