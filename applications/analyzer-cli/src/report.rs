//! Text and JSON reports

use crate::error::Result;
use serde::Serialize;
use soul_analyzer::{AlbumSummary, AnalysisError, ErrorCategory, ErrorKind, TrackAnalysis};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of analyzing one file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TrackAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: i32,
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<TrackAnalysis>,
}

impl From<AnalysisError> for ErrorReport {
    fn from(err: AnalysisError) -> Self {
        Self {
            code: err.code(),
            kind: err.kind(),
            category: err.category(),
            message: err.to_string(),
            partial: err.into_partial(),
        }
    }
}

impl FileReport {
    pub fn new(path: &Path, outcome: soul_analyzer::Result<TrackAnalysis>) -> Self {
        match outcome {
            Ok(track) => Self {
                path: path.to_path_buf(),
                result: Some(track),
                error: None,
            },
            Err(err) => Self {
                path: path.to_path_buf(),
                result: None,
                error: Some(err.into()),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// JSON document for the `album` command
#[derive(Debug, Serialize)]
pub struct AlbumReport<'a> {
    pub tracks: &'a [FileReport],
    pub summary: Option<&'a AlbumSummary>,
}

pub fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn write_file_text<W: Write>(out: &mut W, report: &FileReport) -> Result<()> {
    writeln!(out, "{}", report.path.display())?;

    if let Some(track) = &report.result {
        write_track_text(out, track)?;
    }

    if let Some(error) = &report.error {
        writeln!(out, "  Error [{}]:    {}", error.code, error.message)?;
        if let Some(partial) = &error.partial {
            writeln!(out, "  Known before failure:")?;
            write_track_text(out, partial)?;
        }
    }

    writeln!(out)?;
    Ok(())
}

fn write_track_text<W: Write>(out: &mut W, track: &TrackAnalysis) -> Result<()> {
    let bit_rate = track
        .bit_rate_kbps()
        .map_or_else(|| "unknown".to_string(), |kbps| format!("{:.0} kbps", kbps));
    writeln!(
        out,
        "  Format:       {}, {} Hz, {} ch, {} bit, {}",
        track.format_name, track.sample_rate, track.channels, track.bit_depth, bit_rate
    )?;

    if track.duration_diff > 0 {
        writeln!(
            out,
            "  Duration:     {} s (decoded length differs by {} s)",
            track.duration_secs, track.duration_diff
        )?;
    } else {
        writeln!(out, "  Duration:     {} s", track.duration_secs)?;
    }

    if track.total_frames > 0 {
        writeln!(out, "  Frames:       {}", track.total_frames)?;
    }

    if !track.loudness_measured {
        return Ok(());
    }

    writeln!(
        out,
        "  Loudness:     {:.2} LUFS (threshold {:.2} LUFS)",
        track.integrated_loudness, track.relative_threshold
    )?;
    if let Some(range) = track.loudness_range {
        writeln!(out, "  Range:        {:.2} LU", range)?;
    }
    writeln!(
        out,
        "  Peak:         {:.6} ({:.2} dBFS)",
        track.sample_peak,
        track.sample_peak_dbfs()
    )?;
    writeln!(out, "  Gain (RG2):   {:+.2} dB", track.rg2_gain)?;
    Ok(())
}

pub fn write_album_text<W: Write>(out: &mut W, summary: &AlbumSummary) -> Result<()> {
    writeln!(
        out,
        "Album: {} tracks, {} measured, {} s",
        summary.track_count, summary.measured_count, summary.total_duration_secs
    )?;

    if let (Some(loudness), Some(gain)) = (summary.album_loudness, summary.album_gain) {
        writeln!(out, "  Loudness:     {:.2} LUFS", loudness)?;
        writeln!(out, "  Gain (RG2):   {:+.2} dB", gain)?;
    }
    if let Some(peak) = summary.album_peak {
        writeln!(out, "  Peak:         {:.6}", peak)?;
    }
    if let Some(stats) = &summary.loudness {
        writeln!(
            out,
            "  Spread:       {:.2} to {:.2} LUFS, mean {:.2}, std dev {:.2}",
            stats.min, stats.max, stats.mean, stats.std_dev
        )?;
    }

    if let Some(format) = summary.dominant_format() {
        writeln!(out, "  Format:       {}", format)?;
    }
    let rates: Vec<String> = summary
        .sample_rates
        .iter()
        .map(|(rate, count)| format!("{} Hz x{}", rate, count))
        .collect();
    writeln!(out, "  Sample rates: {}", rates.join(", "))?;
    let depths: Vec<String> = summary
        .bit_depths
        .iter()
        .map(|(bits, count)| format!("{} bit x{}", bits, count))
        .collect();
    writeln!(out, "  Bit depths:   {}", depths.join(", "))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured() -> TrackAnalysis {
        TrackAnalysis {
            format_name: "flac".to_string(),
            sample_rate: 44100,
            channels: 2,
            bit_rate: Some(900_000),
            bit_depth: 16,
            duration_secs: 200,
            duration_diff: 1,
            total_frames: 200 * 44100,
            loudness_measured: true,
            integrated_loudness: -9.5,
            relative_threshold: -19.5,
            loudness_range: Some(6.25),
            sample_peak: 1.0,
            rg2_gain: -8.5,
        }
    }

    fn render(report: &FileReport) -> String {
        let mut out = Vec::new();
        write_file_text(&mut out, report).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_report() {
        let report = FileReport::new(Path::new("a.flac"), Ok(measured()));
        let text = render(&report);

        assert!(text.starts_with("a.flac\n"));
        assert!(text.contains("flac, 44100 Hz, 2 ch, 16 bit, 900 kbps"));
        assert!(text.contains("200 s (decoded length differs by 1 s)"));
        assert!(text.contains("-9.50 LUFS (threshold -19.50 LUFS)"));
        assert!(text.contains("Range:        6.25 LU"));
        assert!(text.contains("(0.00 dBFS)"));
        assert!(text.contains("Gain (RG2):   -8.50 dB"));
    }

    #[test]
    fn test_loudness_block_only_when_measured() {
        let track = TrackAnalysis {
            format_name: "wav".to_string(),
            sample_rate: 48000,
            bit_depth: 24,
            duration_secs: 3,
            ..TrackAnalysis::default()
        };
        let text = render(&FileReport::new(Path::new("b.wav"), Ok(track)));

        assert!(text.contains("unknown"));
        assert!(!text.contains("LUFS"));
        assert!(!text.contains("Frames"));
    }

    #[test]
    fn test_error_report() {
        let mut partial = measured();
        partial.loudness_measured = false;
        let err = AnalysisError::new(ErrorKind::Decode).with_partial(partial);
        let report = FileReport::new(Path::new("c.mp3"), Err(err));
        assert!(!report.is_ok());

        let text = render(&report);
        assert!(text.contains("Error [7]:    Audio analyzer error: Error while decoding audio stream"));
        assert!(text.contains("Known before failure:"));
        assert!(text.contains("flac, 44100 Hz"));
    }

    #[test]
    fn test_json_report() {
        let err = AnalysisError::new(ErrorKind::FileNotFound);
        let reports = [
            FileReport::new(Path::new("ok.flac"), Ok(measured())),
            FileReport::new(Path::new("missing.flac"), Err(err)),
        ];

        let mut out = Vec::new();
        write_json(&mut out, &reports[..]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value[0]["result"]["format_name"], "flac");
        assert!(value[0].get("error").is_none());
        assert_eq!(value[1]["error"]["code"], 2);
        assert_eq!(value[1]["error"]["kind"], "file_not_found");
        assert_eq!(value[1]["error"]["category"], "file");
        assert!(value[1].get("result").is_none());
        assert!(value[1]["error"].get("partial").is_none());
    }

    #[test]
    fn test_album_text() {
        let summary = AlbumSummary::from_tracks(&[measured(), measured()]).unwrap();
        let mut out = Vec::new();
        write_album_text(&mut out, &summary).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Album: 2 tracks, 2 measured, 400 s"));
        assert!(text.contains("Loudness:     -9.50 LUFS"));
        assert!(text.contains("44100 Hz x2"));
        assert!(text.contains("16 bit x2"));
    }
}
