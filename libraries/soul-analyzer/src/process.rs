//! Streaming decode and loudness measurement

use crate::engine::{
    ConversionBuffer, DecodedFrame, Decoder, Demuxer, LoudnessMeter, ReceiveStatus,
    SampleConverter,
};
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::heuristics::frames_duration_secs;
use crate::results::{replaygain_gain, ABSOLUTE_GATE_LUFS};
use crate::session::Session;

impl Session {
    /// Decode the whole selected stream
    ///
    /// Counts frames, reconciles the metadata duration with the decoded one
    /// and, when the session has a meter, fills the loudness fields. Frames
    /// are measured as they are decoded, nothing is buffered beyond one frame.
    pub fn process(&mut self) -> Result<()> {
        let (Some(demuxer), Some(decoder)) =
            (self.demuxer.as_deref_mut(), self.decoder.as_deref_mut())
        else {
            return Err(AnalysisError::new(ErrorKind::Decode));
        };
        let mut meter = self.meter.as_deref_mut();
        let mut converter = match (self.converter.as_deref_mut(), self.conversion_buffer.as_mut()) {
            (Some(converter), Some(buffer)) => Some((converter, buffer)),
            _ => None,
        };

        let stream_index = self.audio_stream;
        let mut frame = DecodedFrame::default();
        let mut total_frames: u64 = 0;
        let mut input_finished = false;

        loop {
            let status = decoder
                .receive_frame(&mut frame)
                .map_err(AnalysisError::from_engine(ErrorKind::Decode))?;

            match status {
                ReceiveStatus::Frame => {}
                ReceiveStatus::NeedsInput if input_finished => {
                    tracing::debug!("Decoder asked for input after flush, treating as end of stream");
                    break;
                }
                ReceiveStatus::NeedsInput => {
                    input_finished = feed_decoder(demuxer, decoder, stream_index)?;
                    continue;
                }
                ReceiveStatus::EndOfStream => break,
            }

            total_frames += frame.nb_samples as u64;

            let Some(meter) = meter.as_deref_mut() else {
                continue;
            };
            match converter.as_mut() {
                Some((converter, buffer)) => {
                    convert(&mut **converter, buffer, Some(&frame))?;
                    measure(meter, buffer.samples())?;
                }
                None => {
                    let samples = frame
                        .as_f32()
                        .ok_or_else(|| AnalysisError::new(ErrorKind::Resampling))?;
                    measure(meter, samples)?;
                }
            }
        }

        // Flush whatever the converter still holds
        if let (Some(meter), Some((converter, buffer))) = (meter.as_deref_mut(), converter.as_mut())
        {
            convert(&mut **converter, buffer, None)?;
            measure(meter, buffer.samples())?;
        }

        tracing::debug!(total_frames, "Decoding finished");
        self.reconcile_duration(total_frames);

        if self.meter.is_some() {
            self.finish_loudness()?;
        }
        Ok(())
    }

    fn reconcile_duration(&mut self, total_frames: u64) {
        let results = &mut self.results;
        results.total_frames = total_frames;

        let sample_rate = if results.sample_rate > 0 {
            results.sample_rate
        } else {
            self.decoder.as_ref().map_or(0, |decoder| decoder.sample_rate())
        };
        if total_frames == 0 || sample_rate == 0 {
            return;
        }

        let calculated = frames_duration_secs(total_frames, sample_rate);
        if results.duration_secs > 0 {
            results.duration_diff = calculated.abs_diff(results.duration_secs);
            if results.duration_diff > 0 {
                tracing::warn!(
                    metadata_secs = results.duration_secs,
                    decoded_secs = calculated,
                    "Metadata duration disagrees with decoded length"
                );
            }
        } else {
            results.duration_secs = calculated;
        }
    }

    fn finish_loudness(&mut self) -> Result<()> {
        let channels = self.decoder.as_ref().map_or(0, |decoder| decoder.channels());
        let Some(meter) = self.meter.as_deref() else {
            return Ok(());
        };
        let results = &mut self.results;

        results.integrated_loudness = meter
            .loudness_global()
            .map_err(AnalysisError::from_engine(ErrorKind::LoudnessMeasurement))?;

        results.relative_threshold = meter.relative_threshold().unwrap_or_else(|err| {
            tracing::debug!(error = %err, "No relative threshold, using absolute gate");
            ABSOLUTE_GATE_LUFS
        });

        results.loudness_range = if self.options.measure_range {
            Some(
                meter
                    .loudness_range()
                    .map_err(AnalysisError::from_engine(ErrorKind::LoudnessMeasurement))?,
            )
        } else {
            None
        };

        let mut peak = 0.0_f64;
        for channel in 0..channels as u32 {
            let channel_peak = meter
                .sample_peak(channel)
                .map_err(AnalysisError::from_engine(ErrorKind::LoudnessMeasurement))?;
            peak = peak.max(channel_peak);
        }
        results.sample_peak = peak;

        results.rg2_gain = replaygain_gain(results.integrated_loudness);
        results.loudness_measured = true;

        tracing::debug!(
            integrated = results.integrated_loudness,
            threshold = results.relative_threshold,
            range = ?results.loudness_range,
            peak = results.sample_peak,
            gain = results.rg2_gain,
            "Loudness measured"
        );
        Ok(())
    }
}

/// Send the next packet of `stream_index`, or the flush marker at end of file.
/// Returns whether the input is exhausted.
fn feed_decoder(
    demuxer: &mut dyn Demuxer,
    decoder: &mut dyn Decoder,
    stream_index: usize,
) -> Result<bool> {
    loop {
        let packet = demuxer
            .read_packet()
            .map_err(AnalysisError::from_engine(ErrorKind::Decode))?;

        match packet {
            Some(packet) if packet.stream_index == stream_index => {
                decoder
                    .send_packet(Some(packet))
                    .map_err(AnalysisError::from_engine(ErrorKind::Decode))?;
                return Ok(false);
            }
            // Other streams are not decoded
            Some(_) => {}
            None => {
                decoder
                    .send_packet(None)
                    .map_err(AnalysisError::from_engine(ErrorKind::Decode))?;
                return Ok(true);
            }
        }
    }
}

/// Run the converter, growing the buffer first if the output might not fit
fn convert(
    converter: &mut dyn SampleConverter,
    buffer: &mut ConversionBuffer,
    frame: Option<&DecodedFrame>,
) -> Result<()> {
    let delay = converter
        .delay()
        .map_err(AnalysisError::from_engine(ErrorKind::Resampling))?;

    let incoming = frame.map_or(0, |frame| {
        if frame.sample_rate == 0 {
            frame.nb_samples as u64
        } else {
            (frame.nb_samples as u64 * u64::from(converter.output_rate()))
                .div_ceil(u64::from(frame.sample_rate))
        }
    });
    let required = usize::try_from(delay + incoming)
        .map_err(|_| AnalysisError::new(ErrorKind::OutOfMemory))?;

    if buffer
        .reserve_frames(required)
        .map_err(|_| AnalysisError::new(ErrorKind::OutOfMemory))?
    {
        tracing::debug!(frames = required, "Conversion buffer grown");
    }

    converter
        .convert(frame, buffer)
        .map_err(AnalysisError::from_engine(ErrorKind::Resampling))?;
    Ok(())
}

fn measure(meter: &mut dyn LoudnessMeter, samples: &[f32]) -> Result<()> {
    meter
        .add_frames(samples)
        .map_err(AnalysisError::from_engine(ErrorKind::LoudnessMeasurement))
}
