//! Bit depth, bit rate and duration resolution
//!
//! Containers and codecs report these values inconsistently, so each one is
//! resolved by an ordered list of rules. A rule either knows the answer or
//! defers to the next one.

use crate::engine::{Codec, CodecParams, SampleFormat, TimeBase};

/// Bit depth assumed when nothing better is known
pub const DEFAULT_BIT_DEPTH: u32 = 16;

/// Everything the bit depth rules may look at
#[derive(Debug, Clone, Copy)]
pub struct BitDepthInputs<'a> {
    /// Parameters reported by the container
    pub params: &'a CodecParams,
    pub decoder_bits_per_coded_sample: Option<u32>,
    pub decoder_bits_per_raw_sample: Option<u32>,
    pub decoder_format: Option<SampleFormat>,
}

type BitDepthRule = fn(&BitDepthInputs<'_>) -> Option<u32>;

const BIT_DEPTH_RULES: [BitDepthRule; 7] = [
    coded_bits_from_container,
    coded_bits_from_decoder,
    raw_bits_from_container,
    raw_bits_from_decoder,
    pcm_storage_width,
    codec_family_depth,
    decoder_format_width,
];

fn positive(value: Option<u32>) -> Option<u32> {
    value.filter(|&bits| bits > 0)
}

fn coded_bits_from_container(inputs: &BitDepthInputs<'_>) -> Option<u32> {
    positive(inputs.params.bits_per_coded_sample)
}

fn coded_bits_from_decoder(inputs: &BitDepthInputs<'_>) -> Option<u32> {
    positive(inputs.decoder_bits_per_coded_sample)
}

fn raw_bits_from_container(inputs: &BitDepthInputs<'_>) -> Option<u32> {
    positive(inputs.params.bits_per_raw_sample)
}

fn raw_bits_from_decoder(inputs: &BitDepthInputs<'_>) -> Option<u32> {
    positive(inputs.decoder_bits_per_raw_sample)
}

fn pcm_storage_width(inputs: &BitDepthInputs<'_>) -> Option<u32> {
    if inputs.params.codec.is_pcm() {
        decoder_format_width(inputs)
    } else {
        None
    }
}

/// FLAC reads its STREAMINFO block, lossy codecs report the nominal 16 bits
fn codec_family_depth(inputs: &BitDepthInputs<'_>) -> Option<u32> {
    match inputs.params.codec {
        Codec::Flac => Some(
            inputs
                .params
                .extra_data
                .as_deref()
                .and_then(flac_streaminfo_bits)
                .unwrap_or(DEFAULT_BIT_DEPTH),
        ),
        Codec::Mp3 | Codec::Vorbis | Codec::Opus | Codec::Aac => Some(DEFAULT_BIT_DEPTH),
        _ => None,
    }
}

fn decoder_format_width(inputs: &BitDepthInputs<'_>) -> Option<u32> {
    inputs.decoder_format.map(|format| format.bytes_per_sample() * 8)
}

/// Bits per sample from FLAC codec private data
///
/// Reads the upper nibble of byte 7, stored as bits minus one. A zero
/// nibble is treated as unknown.
pub fn flac_streaminfo_bits(streaminfo: &[u8]) -> Option<u32> {
    let nibble = u32::from((*streaminfo.get(7)? >> 4) & 0x0F);
    (nibble > 0).then_some(nibble + 1)
}

/// First rule with an answer wins, 16 bits otherwise
pub fn resolve_bit_depth(inputs: &BitDepthInputs<'_>) -> u32 {
    BIT_DEPTH_RULES
        .iter()
        .find_map(|rule| rule(inputs))
        .unwrap_or(DEFAULT_BIT_DEPTH)
}

/// Everything the bit rate rules may look at
#[derive(Debug, Clone, Copy, Default)]
pub struct BitRateInputs {
    pub codec_bit_rate: Option<u64>,
    pub container_bit_rate: Option<u64>,
    pub decoder_bit_rate: Option<u64>,
    pub audio_stream_count: usize,
    pub duration_secs: u32,
    pub file_size: Option<u64>,
}

type BitRateRule = fn(&BitRateInputs) -> Option<u64>;

/// Rules consulted once the file is known to carry audio
const SHARED_BIT_RATE_RULES: [BitRateRule; 3] =
    [container_share, decoder_rate, file_size_estimate];

fn codec_rate(inputs: &BitRateInputs) -> Option<u64> {
    inputs.codec_bit_rate.filter(|&rate| rate > 0)
}

/// Container bit rate split evenly across audio streams
fn container_share(inputs: &BitRateInputs) -> Option<u64> {
    inputs
        .container_bit_rate
        .filter(|&rate| rate > 0)
        .map(|rate| rate / inputs.audio_stream_count as u64)
}

fn decoder_rate(inputs: &BitRateInputs) -> Option<u64> {
    inputs.decoder_bit_rate.filter(|&rate| rate > 0)
}

/// Average rate from this stream's share of the file size
fn file_size_estimate(inputs: &BitRateInputs) -> Option<u64> {
    let size = inputs.file_size.filter(|&size| size > 0)?;
    if inputs.duration_secs == 0 {
        return None;
    }
    Some(size / inputs.audio_stream_count as u64 * 8 / u64::from(inputs.duration_secs))
}

/// Bit rate in bits per second, `None` when every rule declines
pub fn resolve_bit_rate(inputs: &BitRateInputs) -> Option<u64> {
    if let Some(rate) = codec_rate(inputs) {
        return Some(rate);
    }
    if inputs.audio_stream_count == 0 {
        return None;
    }
    SHARED_BIT_RATE_RULES.iter().find_map(|rule| rule(inputs))
}

/// Container duration rounded to whole seconds
pub fn container_duration_secs(micros: u64) -> u32 {
    let secs = micros.saturating_add(500_000) / 1_000_000;
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// Stream duration rounded to whole seconds
pub fn stream_duration_secs(duration: u64, time_base: TimeBase) -> u32 {
    round_secs(time_base.seconds(duration))
}

/// Duration implied by a frame count, rounded to whole seconds
pub fn frames_duration_secs(frames: u64, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }
    round_secs(frames as f64 / f64::from(sample_rate))
}

fn round_secs(secs: f64) -> u32 {
    if secs.is_finite() && secs > 0.0 {
        secs.round().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}
