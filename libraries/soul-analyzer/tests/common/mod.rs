//! Shared test fixtures: a scripted engine backend and WAV writers

#![allow(dead_code)]

use soul_analyzer::engine::{
    Backend, Codec, CodecParams, ConversionBuffer, ConverterSpec, DecodedFrame, Decoder,
    DecoderBuilder, Demuxer, FrameData, LoudnessMeter, MediaType, MeterMode, Packet,
    ReceiveStatus, SampleConverter, SampleFormat, StreamInfo, TimeBase,
};
use soul_analyzer::EngineError;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Where a scripted run should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    Open,
    StreamInfo,
    NoAudioStream,
    NoDecoder,
    ApplyParameters,
    RequestFormat,
    DecoderOpen,
    MeterInit,
    ConverterInit,
    /// Reading the n-th packet (zero based)
    ReadPacket(usize),
    /// Decoding the n-th packet sent to the decoder
    Decode(usize),
    /// The n-th conversion call
    Convert(usize),
    Delay,
    /// The n-th call adding frames to the meter
    AddFrames(usize),
    LoudnessGlobal,
    RelativeThreshold,
    LoudnessRange,
    SamplePeak,
}

/// Engine lifecycle bookkeeping shared between a backend and the test
#[derive(Debug, Default)]
pub struct Counters {
    pub demuxers_opened: AtomicUsize,
    pub demuxers_dropped: AtomicUsize,
    pub decoders_opened: AtomicUsize,
    pub decoders_dropped: AtomicUsize,
    pub converters_created: AtomicUsize,
    pub converters_dropped: AtomicUsize,
    pub meters_created: AtomicUsize,
    pub meters_dropped: AtomicUsize,
    pub packets_read: AtomicUsize,
    pub frames_measured: AtomicU64,
    pub converter_overflows: AtomicUsize,
    pub meter_rate: AtomicU32,
    pub meter_range_mode: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Every engine that was created has been dropped exactly once
    pub fn assert_all_released(&self) {
        let pairs = [
            ("demuxer", &self.demuxers_opened, &self.demuxers_dropped),
            ("decoder", &self.decoders_opened, &self.decoders_dropped),
            ("converter", &self.converters_created, &self.converters_dropped),
            ("meter", &self.meters_created, &self.meters_dropped),
        ];
        for (name, created, dropped) in pairs {
            assert_eq!(
                Self::get(created),
                Self::get(dropped),
                "{} created {} times but dropped {} times",
                name,
                Self::get(created),
                Self::get(dropped)
            );
        }
    }

    pub fn frames_measured(&self) -> u64 {
        self.frames_measured.load(Ordering::SeqCst)
    }
}

/// Everything a scripted run reports and produces
#[derive(Debug, Clone)]
pub struct Script {
    pub format_name: Option<String>,
    pub streams: Vec<StreamInfo>,
    pub best_stream: Option<usize>,
    pub duration_micros: Option<u64>,
    pub container_bit_rate: Option<u64>,
    pub file_size: Option<u64>,
    pub packets: Vec<Packet>,
    pub decoder_format: SampleFormat,
    pub decoder_rate: u32,
    pub channels: usize,
    pub frame_size: Option<usize>,
    pub decoder_bit_rate: Option<u64>,
    /// Packets the decoder holds before emitting frames
    pub lookahead: usize,
    /// Constant sample value of every decoded frame
    pub amplitude: f32,
    /// Frames the converter holds back
    pub converter_delay: usize,
    pub integrated: f64,
    pub threshold: f64,
    pub range: f64,
    pub fail: Option<Fail>,
}

fn audio_stream(index: usize, rate: u32, channels: u16, frames: u64) -> StreamInfo {
    let mut params = CodecParams::audio(Codec::Pcm(SampleFormat::S16));
    params.sample_rate = Some(rate);
    params.channels = Some(channels);
    params.bits_per_coded_sample = Some(16);
    StreamInfo {
        index,
        params,
        duration: Some(frames),
        time_base: Some(TimeBase::new(1, rate)),
    }
}

pub fn packet(stream_index: usize, frames: u64) -> Packet {
    Packet {
        stream_index,
        timestamp: 0,
        duration: frames,
        data: vec![0u8; 4].into_boxed_slice(),
    }
}

impl Script {
    /// One stereo 16-bit PCM stream at 48 kHz, `packets` packets of `frames` frames each
    pub fn stereo_pcm(packets: usize, frames: u64) -> Self {
        let total = packets as u64 * frames;
        Self {
            format_name: Some("wav".to_string()),
            streams: vec![audio_stream(0, 48000, 2, total)],
            best_stream: Some(0),
            duration_micros: None,
            container_bit_rate: None,
            file_size: Some(total * 4 + 44),
            packets: (0..packets).map(|_| packet(0, frames)).collect(),
            decoder_format: SampleFormat::S16,
            decoder_rate: 48000,
            channels: 2,
            frame_size: Some(frames as usize),
            decoder_bit_rate: None,
            lookahead: 0,
            amplitude: 0.5,
            converter_delay: 0,
            integrated: -20.0,
            threshold: -30.0,
            range: 4.5,
            fail: None,
        }
    }

    pub fn failing(mut self, fail: Fail) -> Self {
        self.fail = Some(fail);
        self
    }

    fn fails(&self, fail: Fail) -> bool {
        self.fail == Some(fail)
    }
}

fn injected(what: &str) -> EngineError {
    EngineError::media(format!("injected {} failure", what))
}

/// [`Backend`] replaying a [`Script`]
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    pub script: Script,
    pub counters: Arc<Counters>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            counters: Arc::new(Counters::default()),
        }
    }
}

impl Backend for ScriptedBackend {
    fn open_input(&self, _path: &Path) -> Result<Box<dyn Demuxer>, EngineError> {
        if self.script.fails(Fail::Open) {
            return Err(injected("open").with_code(2));
        }
        Counters::bump(&self.counters.demuxers_opened);
        Ok(Box::new(ScriptedDemuxer {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
            cursor: 0,
        }))
    }

    fn new_converter(&self, spec: ConverterSpec) -> Result<Box<dyn SampleConverter>, EngineError> {
        if self.script.fails(Fail::ConverterInit) {
            return Err(EngineError::resampler("injected converter failure"));
        }
        Counters::bump(&self.counters.converters_created);
        Ok(Box::new(ScriptedConverter {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
            channels: spec.channels,
            output_rate: spec.output_rate,
            pending: VecDeque::new(),
            calls: 0,
        }))
    }

    fn new_meter(
        &self,
        channels: u32,
        sample_rate: u32,
        mode: MeterMode,
    ) -> Result<Box<dyn LoudnessMeter>, EngineError> {
        if self.script.fails(Fail::MeterInit) {
            return Err(EngineError::loudness(2));
        }
        Counters::bump(&self.counters.meters_created);
        self.counters.meter_rate.store(sample_rate, Ordering::SeqCst);
        if mode.loudness_range {
            Counters::bump(&self.counters.meter_range_mode);
        }
        Ok(Box::new(ScriptedMeter {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
            channels: channels as usize,
            peaks: vec![0.0; channels as usize],
            calls: 0,
        }))
    }
}

struct ScriptedDemuxer {
    script: Script,
    counters: Arc<Counters>,
    cursor: usize,
}

impl Drop for ScriptedDemuxer {
    fn drop(&mut self) {
        Counters::bump(&self.counters.demuxers_dropped);
    }
}

impl Demuxer for ScriptedDemuxer {
    fn find_stream_info(&mut self) -> Result<(), EngineError> {
        if self.script.fails(Fail::StreamInfo) {
            return Err(injected("stream info"));
        }
        Ok(())
    }

    fn format_name(&self) -> Option<&str> {
        self.script.format_name.as_deref()
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.script.streams
    }

    fn best_audio_stream(&self) -> Option<usize> {
        if self.script.fails(Fail::NoAudioStream) {
            return None;
        }
        self.script.best_stream
    }

    fn duration_micros(&self) -> Option<u64> {
        self.script.duration_micros
    }

    fn bit_rate(&self) -> Option<u64> {
        self.script.container_bit_rate
    }

    fn file_size(&self) -> Option<u64> {
        self.script.file_size
    }

    fn find_decoder(&self, _stream_index: usize) -> Option<Box<dyn DecoderBuilder>> {
        if self.script.fails(Fail::NoDecoder) {
            return None;
        }
        Some(Box::new(ScriptedDecoderBuilder {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, EngineError> {
        if self.script.fails(Fail::ReadPacket(self.cursor)) {
            return Err(injected("read"));
        }
        let packet = self.script.packets.get(self.cursor).cloned();
        if packet.is_some() {
            self.cursor += 1;
            Counters::bump(&self.counters.packets_read);
        }
        Ok(packet)
    }
}

struct ScriptedDecoderBuilder {
    script: Script,
    counters: Arc<Counters>,
}

impl DecoderBuilder for ScriptedDecoderBuilder {
    fn apply_parameters(&mut self, _params: &CodecParams) -> Result<(), EngineError> {
        if self.script.fails(Fail::ApplyParameters) {
            return Err(injected("parameter"));
        }
        Ok(())
    }

    fn request_sample_format(&mut self, _format: SampleFormat) -> Result<(), EngineError> {
        if self.script.fails(Fail::RequestFormat) {
            return Err(injected("sample format"));
        }
        Ok(())
    }

    fn open(self: Box<Self>) -> Result<Box<dyn Decoder>, EngineError> {
        if self.script.fails(Fail::DecoderOpen) {
            return Err(injected("decoder open"));
        }
        Counters::bump(&self.counters.decoders_opened);
        Ok(Box::new(ScriptedDecoder {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
            queue: VecDeque::new(),
            flushing: false,
            decoded: 0,
        }))
    }
}

struct ScriptedDecoder {
    script: Script,
    counters: Arc<Counters>,
    queue: VecDeque<Packet>,
    flushing: bool,
    decoded: usize,
}

impl Drop for ScriptedDecoder {
    fn drop(&mut self) {
        Counters::bump(&self.counters.decoders_dropped);
    }
}

impl ScriptedDecoder {
    fn fill(&self, frame: &mut DecodedFrame, frames: usize) {
        let channels = self.script.channels;
        let amplitude = self.script.amplitude;
        frame.channels = channels;
        frame.nb_samples = frames;
        frame.sample_rate = self.script.decoder_rate;
        frame.data = match self.script.decoder_format {
            SampleFormat::F32 => FrameData::F32(vec![amplitude; frames * channels]),
            SampleFormat::S32 => {
                FrameData::S32(vec![(amplitude * 2_147_483_647.0) as i32; frames * channels])
            }
            _ => FrameData::S16(vec![(amplitude * 32767.0) as i16; frames * channels]),
        };
    }
}

impl Decoder for ScriptedDecoder {
    fn sample_format(&self) -> Option<SampleFormat> {
        Some(self.script.decoder_format)
    }

    fn sample_rate(&self) -> u32 {
        self.script.decoder_rate
    }

    fn channels(&self) -> usize {
        self.script.channels
    }

    fn bits_per_coded_sample(&self) -> Option<u32> {
        None
    }

    fn bits_per_raw_sample(&self) -> Option<u32> {
        None
    }

    fn bit_rate(&self) -> Option<u64> {
        self.script.decoder_bit_rate
    }

    fn frame_size(&self) -> Option<usize> {
        self.script.frame_size
    }

    fn send_packet(&mut self, packet: Option<Packet>) -> Result<(), EngineError> {
        match packet {
            Some(packet) => self.queue.push_back(packet),
            None => self.flushing = true,
        }
        Ok(())
    }

    fn receive_frame(&mut self, frame: &mut DecodedFrame) -> Result<ReceiveStatus, EngineError> {
        let ready = self.flushing || self.queue.len() > self.script.lookahead;
        if !ready {
            return Ok(ReceiveStatus::NeedsInput);
        }
        let Some(packet) = self.queue.pop_front() else {
            return Ok(ReceiveStatus::EndOfStream);
        };

        if self.script.fails(Fail::Decode(self.decoded)) {
            return Err(injected("decode"));
        }
        self.decoded += 1;
        self.fill(frame, packet.duration as usize);
        Ok(ReceiveStatus::Frame)
    }
}

/// Format conversion with a fixed hold-back of `converter_delay` frames
struct ScriptedConverter {
    script: Script,
    counters: Arc<Counters>,
    channels: usize,
    output_rate: u32,
    pending: VecDeque<f32>,
    calls: usize,
}

impl Drop for ScriptedConverter {
    fn drop(&mut self) {
        Counters::bump(&self.counters.converters_dropped);
    }
}

impl SampleConverter for ScriptedConverter {
    fn delay(&self) -> Result<u64, EngineError> {
        if self.script.fails(Fail::Delay) {
            return Err(EngineError::resampler("injected delay failure"));
        }
        Ok((self.pending.len() / self.channels) as u64)
    }

    fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn convert(
        &mut self,
        input: Option<&DecodedFrame>,
        output: &mut ConversionBuffer,
    ) -> Result<usize, EngineError> {
        if self.script.fails(Fail::Convert(self.calls)) {
            return Err(EngineError::resampler("injected conversion failure"));
        }
        self.calls += 1;
        output.clear();

        let mut converted = Vec::new();
        let hold = match input {
            Some(frame) => {
                frame.data.append_f32(&mut converted);
                self.script.converter_delay
            }
            None => 0,
        };
        self.pending.extend(converted);

        let available = self.pending.len() / self.channels;
        let frames = available.saturating_sub(hold);
        if frames > output.capacity_frames() {
            Counters::bump(&self.counters.converter_overflows);
        }
        let samples: Vec<f32> = self.pending.drain(..frames * self.channels).collect();
        output.push_interleaved(&samples);
        Ok(frames)
    }
}

struct ScriptedMeter {
    script: Script,
    counters: Arc<Counters>,
    channels: usize,
    peaks: Vec<f64>,
    calls: usize,
}

impl Drop for ScriptedMeter {
    fn drop(&mut self) {
        Counters::bump(&self.counters.meters_dropped);
    }
}

impl LoudnessMeter for ScriptedMeter {
    fn add_frames(&mut self, samples: &[f32]) -> Result<(), EngineError> {
        if self.script.fails(Fail::AddFrames(self.calls)) {
            return Err(EngineError::loudness(1));
        }
        self.calls += 1;
        for frame in samples.chunks_exact(self.channels) {
            for (peak, &sample) in self.peaks.iter_mut().zip(frame) {
                *peak = peak.max(f64::from(sample.abs()));
            }
        }
        self.counters
            .frames_measured
            .fetch_add((samples.len() / self.channels) as u64, Ordering::SeqCst);
        Ok(())
    }

    fn loudness_global(&self) -> Result<f64, EngineError> {
        if self.script.fails(Fail::LoudnessGlobal) {
            return Err(EngineError::loudness(4));
        }
        Ok(self.script.integrated)
    }

    fn relative_threshold(&self) -> Result<f64, EngineError> {
        if self.script.fails(Fail::RelativeThreshold) {
            return Err(EngineError::loudness(2));
        }
        Ok(self.script.threshold)
    }

    fn loudness_range(&self) -> Result<f64, EngineError> {
        if self.script.fails(Fail::LoudnessRange) {
            return Err(EngineError::loudness(2));
        }
        Ok(self.script.range)
    }

    fn sample_peak(&self, channel: u32) -> Result<f64, EngineError> {
        if self.script.fails(Fail::SamplePeak) {
            return Err(EngineError::loudness(3));
        }
        self.peaks
            .get(channel as usize)
            .copied()
            .ok_or_else(|| EngineError::loudness(3))
    }
}

/// A video stream that should never be selected or decoded
pub fn video_stream(index: usize) -> StreamInfo {
    StreamInfo {
        index,
        params: CodecParams::new(MediaType::Video, Codec::Other("h264".to_string())),
        duration: None,
        time_base: None,
    }
}

/// Interleaved sine samples
pub fn sine(frequency: f32, amplitude: f32, sample_rate: u32, seconds: f32, channels: u16) -> Vec<f32> {
    let frames = (sample_rate as f32 * seconds) as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let value = amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin();
        for _ in 0..channels {
            samples.push(value);
        }
    }
    samples
}

/// Write 16-bit integer PCM
pub fn write_wav_i16(dir: &Path, name: &str, samples: &[f32], sample_rate: u32, channels: u16) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &sample in samples {
        writer
            .write_sample((sample.clamp(-1.0, 1.0) * 32767.0).round() as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Write 24-bit integer PCM
pub fn write_wav_i24(dir: &Path, name: &str, samples: &[f32], sample_rate: u32, channels: u16) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &sample in samples {
        writer
            .write_sample((sample.clamp(-1.0, 1.0) * 8_388_607.0).round() as i32)
            .unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Write 32-bit float PCM
pub fn write_wav_f32(dir: &Path, name: &str, samples: &[f32], sample_rate: u32, channels: u16) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
    path
}
