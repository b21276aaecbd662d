//! Demuxing and decoding with symphonia

use super::sniff::{format_name_for, SNIFF_LEN};
use super::{
    Codec, CodecParams, DecodedFrame, Decoder, DecoderBuilder, Demuxer, FrameData, MediaType,
    Packet, ReceiveStatus, SampleFormat, StreamInfo, TimeBase,
};
use crate::error::EngineError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{self as codecs, CodecParameters, CodecType, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::{Sample, SampleFormat as NativeSampleFormat};

fn media_error(context: &str, err: SymphoniaError) -> EngineError {
    match err {
        SymphoniaError::IoError(io) => {
            let code = io.raw_os_error();
            EngineError {
                code,
                ..EngineError::media(format!("{}: {}", context, io))
            }
        }
        other => EngineError::media(format!("{}: {}", context, other)),
    }
}

fn map_sample_format(format: NativeSampleFormat) -> SampleFormat {
    match format {
        NativeSampleFormat::U8 => SampleFormat::U8,
        NativeSampleFormat::U16 => SampleFormat::U16,
        NativeSampleFormat::U24 => SampleFormat::U24,
        NativeSampleFormat::U32 => SampleFormat::U32,
        NativeSampleFormat::S8 => SampleFormat::S8,
        NativeSampleFormat::S16 => SampleFormat::S16,
        NativeSampleFormat::S24 => SampleFormat::S24,
        NativeSampleFormat::S32 => SampleFormat::S32,
        NativeSampleFormat::F32 => SampleFormat::F32,
        NativeSampleFormat::F64 => SampleFormat::F64,
    }
}

fn map_codec(codec: CodecType) -> Codec {
    match codec {
        codecs::CODEC_TYPE_PCM_U8 => Codec::Pcm(SampleFormat::U8),
        codecs::CODEC_TYPE_PCM_U16LE | codecs::CODEC_TYPE_PCM_U16BE => {
            Codec::Pcm(SampleFormat::U16)
        }
        codecs::CODEC_TYPE_PCM_U24LE | codecs::CODEC_TYPE_PCM_U24BE => {
            Codec::Pcm(SampleFormat::U24)
        }
        codecs::CODEC_TYPE_PCM_U32LE | codecs::CODEC_TYPE_PCM_U32BE => {
            Codec::Pcm(SampleFormat::U32)
        }
        codecs::CODEC_TYPE_PCM_S8 => Codec::Pcm(SampleFormat::S8),
        codecs::CODEC_TYPE_PCM_S16LE
        | codecs::CODEC_TYPE_PCM_S16BE
        | codecs::CODEC_TYPE_PCM_ALAW
        | codecs::CODEC_TYPE_PCM_MULAW => Codec::Pcm(SampleFormat::S16),
        codecs::CODEC_TYPE_PCM_S24LE | codecs::CODEC_TYPE_PCM_S24BE => {
            Codec::Pcm(SampleFormat::S24)
        }
        codecs::CODEC_TYPE_PCM_S32LE | codecs::CODEC_TYPE_PCM_S32BE => {
            Codec::Pcm(SampleFormat::S32)
        }
        codecs::CODEC_TYPE_PCM_F32LE | codecs::CODEC_TYPE_PCM_F32BE => {
            Codec::Pcm(SampleFormat::F32)
        }
        codecs::CODEC_TYPE_PCM_F64LE | codecs::CODEC_TYPE_PCM_F64BE => {
            Codec::Pcm(SampleFormat::F64)
        }
        codecs::CODEC_TYPE_FLAC => Codec::Flac,
        codecs::CODEC_TYPE_ALAC => Codec::Alac,
        codecs::CODEC_TYPE_MP1 => Codec::Mp1,
        codecs::CODEC_TYPE_MP2 => Codec::Mp2,
        codecs::CODEC_TYPE_MP3 => Codec::Mp3,
        codecs::CODEC_TYPE_AAC => Codec::Aac,
        codecs::CODEC_TYPE_VORBIS => Codec::Vorbis,
        codecs::CODEC_TYPE_OPUS => Codec::Opus,
        other => {
            let name = symphonia::default::get_codecs()
                .get_codec(other)
                .map_or_else(|| format!("{:?}", other), |d| d.short_name.to_string());
            Codec::Other(name)
        }
    }
}

fn map_params(params: &CodecParameters) -> CodecParams {
    let media_type = if params.codec == codecs::CODEC_TYPE_NULL {
        MediaType::Other
    } else {
        MediaType::Audio
    };

    CodecParams {
        media_type,
        codec: map_codec(params.codec),
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count() as u16),
        bits_per_coded_sample: params.bits_per_coded_sample,
        bits_per_raw_sample: params.bits_per_sample,
        bit_rate: None,
        extra_data: params.extra_data.as_ref().map(|data| data.to_vec()),
        frame_size: params.max_frames_per_packet.map(|frames| frames as usize),
    }
}

/// Format the decoder will produce, as far as it can be known before decoding
fn working_format(params: &CodecParameters) -> Option<SampleFormat> {
    if let Some(format) = params.sample_format {
        return Some(map_sample_format(format));
    }
    match map_codec(params.codec) {
        Codec::Pcm(format) => Some(format),
        Codec::Mp1 | Codec::Mp2 | Codec::Mp3 | Codec::Aac | Codec::Vorbis => {
            Some(SampleFormat::F32)
        }
        Codec::Flac | Codec::Alac => Some(SampleFormat::S32),
        _ => None,
    }
}

/// [`Demuxer`] over a symphonia [`FormatReader`]
///
/// Opening only touches the file, the container is probed by
/// [`find_stream_info`](Demuxer::find_stream_info).
pub struct SymphoniaDemuxer {
    path: PathBuf,
    source: Option<File>,
    reader: Option<Box<dyn FormatReader>>,
    format_name: Option<String>,
    file_size: Option<u64>,
    streams: Vec<StreamInfo>,
    track_ids: Vec<u32>,
    native_params: Vec<CodecParameters>,
    default_track: Option<u32>,
}

impl SymphoniaDemuxer {
    /// Open a file and sniff its container from the leading bytes
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let mut file = File::open(path)?;
        let file_size = file.metadata().ok().map(|meta| meta.len());

        let mut header = [0u8; SNIFF_LEN];
        let header_len = read_header(&mut file, &mut header)?;
        file.seek(SeekFrom::Start(0))?;
        let format_name = format_name_for(&header[..header_len], path);

        Ok(Self {
            path: path.to_path_buf(),
            source: Some(file),
            reader: None,
            format_name,
            file_size,
            streams: Vec::new(),
            track_ids: Vec::new(),
            native_params: Vec::new(),
            default_track: None,
        })
    }

    fn probe(&mut self) -> Result<&dyn FormatReader, EngineError> {
        if self.reader.is_none() {
            let file = self
                .source
                .take()
                .ok_or_else(|| EngineError::media("input already consumed"))?;
            let mss = MediaSourceStream::new(Box::new(file), Default::default());

            let mut hint = Hint::new();
            if let Some(ext) = self.path.extension().and_then(|e| e.to_str()) {
                hint.with_extension(ext);
            }

            let probed = symphonia::default::get_probe()
                .format(
                    &hint,
                    mss,
                    &FormatOptions::default(),
                    &MetadataOptions::default(),
                )
                .map_err(|e| media_error("Failed to probe file", e))?;

            tracing::debug!(
                path = %self.path.display(),
                format = ?self.format_name,
                "Container probed"
            );
            self.reader = Some(probed.format);
        }

        self.reader
            .as_deref()
            .ok_or_else(|| EngineError::media("container not probed"))
    }

    fn stream_index_of(&self, track_id: u32) -> Option<usize> {
        self.track_ids.iter().position(|&id| id == track_id)
    }
}

fn read_header(file: &mut File, header: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

impl Demuxer for SymphoniaDemuxer {
    fn find_stream_info(&mut self) -> Result<(), EngineError> {
        let reader = self.probe()?;
        let tracks = reader.tracks();
        if tracks.is_empty() {
            return Err(EngineError::media(format!(
                "no streams found in {}",
                self.path.display()
            )));
        }

        let streams = tracks
            .iter()
            .enumerate()
            .map(|(index, track)| {
                let params = &track.codec_params;
                let time_base = params
                    .sample_rate
                    .map(|rate| TimeBase::new(1, rate))
                    .or_else(|| params.time_base.map(|tb| TimeBase::new(tb.numer, tb.denom)));
                StreamInfo {
                    index,
                    params: map_params(params),
                    duration: params.n_frames,
                    time_base,
                }
            })
            .collect();
        let track_ids = tracks.iter().map(|track| track.id).collect();
        let native_params = tracks.iter().map(|track| track.codec_params.clone()).collect();
        let default_track = reader.default_track().map(|track| track.id);

        self.streams = streams;
        self.track_ids = track_ids;
        self.native_params = native_params;
        self.default_track = default_track;
        Ok(())
    }

    fn format_name(&self) -> Option<&str> {
        self.format_name.as_deref()
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    /// Prefers the default track, then tracks symphonia can decode, then more channels
    fn best_audio_stream(&self) -> Option<usize> {
        let default_index = self
            .default_track
            .and_then(|track_id| self.stream_index_of(track_id));
        let codecs = symphonia::default::get_codecs();

        self.streams
            .iter()
            .filter(|stream| {
                stream.params.media_type == MediaType::Audio && stream.params.sample_rate.is_some()
            })
            .rev()
            .max_by_key(|stream| {
                let decodable = codecs
                    .get_codec(self.native_params[stream.index].codec)
                    .is_some();
                (
                    Some(stream.index) == default_index,
                    decodable,
                    stream.params.channels.unwrap_or(0),
                )
            })
            .map(|stream| stream.index)
    }

    fn duration_micros(&self) -> Option<u64> {
        None
    }

    fn bit_rate(&self) -> Option<u64> {
        None
    }

    fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    fn find_decoder(&self, stream_index: usize) -> Option<Box<dyn DecoderBuilder>> {
        let params = self.native_params.get(stream_index)?;
        let track_id = *self.track_ids.get(stream_index)?;
        symphonia::default::get_codecs().get_codec(params.codec)?;
        Some(Box::new(SymphoniaDecoderBuilder {
            params: params.clone(),
            track_id,
            requested_format: None,
        }))
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, EngineError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| EngineError::media("container not probed"))?;
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(media_error("Error reading packet", e)),
        };

        // Packets of unknown tracks get an index no stream has
        let stream_index = self
            .stream_index_of(packet.track_id())
            .unwrap_or(usize::MAX);
        let timestamp = packet.ts();
        let duration = packet.dur();

        Ok(Some(Packet {
            stream_index,
            timestamp,
            duration,
            data: packet.data,
        }))
    }
}

/// Decoder found for a track, not opened yet
pub struct SymphoniaDecoderBuilder {
    params: CodecParameters,
    track_id: u32,
    requested_format: Option<SampleFormat>,
}

impl DecoderBuilder for SymphoniaDecoderBuilder {
    fn apply_parameters(&mut self, params: &CodecParams) -> Result<(), EngineError> {
        if self.params.sample_rate.is_none() {
            if let Some(rate) = params.sample_rate {
                self.params.with_sample_rate(rate);
            }
        }
        if self.params.bits_per_sample.is_none() {
            if let Some(bits) = params.bits_per_raw_sample {
                self.params.with_bits_per_sample(bits);
            }
        }
        if self.params.bits_per_coded_sample.is_none() {
            if let Some(bits) = params.bits_per_coded_sample {
                self.params.with_bits_per_coded_sample(bits);
            }
        }
        Ok(())
    }

    fn request_sample_format(&mut self, format: SampleFormat) -> Result<(), EngineError> {
        // symphonia decoders emit their native format, conversion happens downstream
        self.requested_format = Some(format);
        Ok(())
    }

    fn open(self: Box<Self>) -> Result<Box<dyn Decoder>, EngineError> {
        let inner = symphonia::default::get_codecs()
            .make(&self.params, &DecoderOptions::default())
            .map_err(|e| media_error("Failed to create decoder", e))?;

        let params = inner.codec_params();
        let sample_format = working_format(params);
        tracing::debug!(
            codec = ?map_codec(params.codec),
            native_format = ?sample_format,
            requested_format = ?self.requested_format,
            "Decoder opened"
        );

        Ok(Box::new(SymphoniaDecoder {
            sample_rate: params.sample_rate.unwrap_or(0),
            channels: params.channels.map_or(0, |c| c.count()),
            bits_per_coded_sample: params.bits_per_coded_sample,
            bits_per_raw_sample: params.bits_per_sample,
            frame_size: params.max_frames_per_packet.map(|frames| frames as usize),
            sample_format,
            inner,
            track_id: self.track_id,
            pending: None,
            flushing: false,
        }))
    }
}

/// [`Decoder`] over a symphonia decoder
///
/// symphonia decodes one packet into one buffer, so a sent packet is decoded
/// on the next receive call.
pub struct SymphoniaDecoder {
    inner: Box<dyn codecs::Decoder>,
    track_id: u32,
    sample_format: Option<SampleFormat>,
    sample_rate: u32,
    channels: usize,
    bits_per_coded_sample: Option<u32>,
    bits_per_raw_sample: Option<u32>,
    frame_size: Option<usize>,
    pending: Option<Packet>,
    flushing: bool,
}

impl Decoder for SymphoniaDecoder {
    fn sample_format(&self) -> Option<SampleFormat> {
        self.sample_format
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn bits_per_coded_sample(&self) -> Option<u32> {
        self.bits_per_coded_sample
    }

    fn bits_per_raw_sample(&self) -> Option<u32> {
        self.bits_per_raw_sample
    }

    fn bit_rate(&self) -> Option<u64> {
        None
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn send_packet(&mut self, packet: Option<Packet>) -> Result<(), EngineError> {
        match packet {
            Some(_) if self.pending.is_some() => Err(EngineError::media(
                "packet sent before the previous one was decoded",
            )),
            Some(_) if self.flushing => {
                Err(EngineError::media("packet sent after end of stream"))
            }
            Some(packet) => {
                self.pending = Some(packet);
                Ok(())
            }
            None => {
                self.flushing = true;
                Ok(())
            }
        }
    }

    fn receive_frame(&mut self, frame: &mut DecodedFrame) -> Result<ReceiveStatus, EngineError> {
        let Some(packet) = self.pending.take() else {
            return Ok(if self.flushing {
                ReceiveStatus::EndOfStream
            } else {
                ReceiveStatus::NeedsInput
            });
        };

        let native = symphonia::core::formats::Packet::new_from_boxed_slice(
            self.track_id,
            packet.timestamp,
            packet.duration,
            packet.data,
        );

        let decoded = match self.inner.decode(&native) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(ts = packet.timestamp, "Skipping undecodable packet: {}", e);
                return Ok(ReceiveStatus::NeedsInput);
            }
            Err(e) => return Err(media_error("Decode error", e)),
        };

        if decoded.frames() == 0 {
            return Ok(ReceiveStatus::NeedsInput);
        }

        let rate = decoded.spec().rate;
        frame.channels = decoded.spec().channels.count();
        frame.nb_samples = decoded.frames();
        frame.sample_rate = rate;
        frame.data = copy_interleaved(&decoded);

        self.sample_rate = rate;
        self.channels = frame.channels;
        self.sample_format = Some(frame.data.format());

        Ok(ReceiveStatus::Frame)
    }
}

fn copy_interleaved(decoded: &AudioBufferRef<'_>) -> FrameData {
    match decoded {
        AudioBufferRef::U8(buf) => FrameData::U8(interleave(&**buf, |s| s)),
        AudioBufferRef::U16(buf) => FrameData::U16(interleave(&**buf, |s| s)),
        AudioBufferRef::U24(buf) => FrameData::U24(interleave(&**buf, |s| s.inner())),
        AudioBufferRef::U32(buf) => FrameData::U32(interleave(&**buf, |s| s)),
        AudioBufferRef::S8(buf) => FrameData::S8(interleave(&**buf, |s| s)),
        AudioBufferRef::S16(buf) => FrameData::S16(interleave(&**buf, |s| s)),
        AudioBufferRef::S24(buf) => FrameData::S24(interleave(&**buf, |s| s.inner())),
        AudioBufferRef::S32(buf) => FrameData::S32(interleave(&**buf, |s| s)),
        AudioBufferRef::F32(buf) => FrameData::F32(interleave(&**buf, |s| s)),
        AudioBufferRef::F64(buf) => FrameData::F64(interleave(&**buf, |s| s)),
    }
}

fn interleave<S, T>(buf: &AudioBuffer<S>, map: impl Fn(S) -> T) -> Vec<T>
where
    S: Sample,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    let planes: Vec<&[S]> = (0..channels).map(|ch| buf.chan(ch)).collect();

    let mut out = Vec::with_capacity(frames * channels);
    for index in 0..frames {
        for plane in &planes {
            out.push(map(plane[index]));
        }
    }
    out
}
