//! Acoustic metadata and loudness analysis for Soul Player
//!
//! This crate extracts, for a single audio file:
//! - Container format, sample rate, channel count, bit depth and bit rate
//! - Duration, cross-checked against the decoded sample count
//! - EBU R128 integrated loudness, relative threshold, loudness range and sample peak
//! - The ReplayGain 2.0 track gain derived from the integrated loudness
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌───────────┐   ┌─────────┐
//! │ Demuxer  │──►│ Decoder │──►│ Converter │──►│   Meter   │──►│ Results │
//! │symphonia │   │symphonia│   │  rubato   │   │  ebur128  │   │         │
//! └──────────┘   └─────────┘   └───────────┘   └───────────┘   └─────────┘
//! ```
//!
//! Engines sit behind the traits in [`engine`], so the pipeline can be driven
//! by other implementations.
//!
//! # Example
//!
//! ```no_run
//! use soul_analyzer::{analyze_with, ErrorKind};
//!
//! match analyze_with("album/01.flac", true, true, true) {
//!     Ok(track) => println!("{} gain {:+.2} dB", track, track.rg2_gain),
//!     Err(err) if err.kind() == ErrorKind::Decode => {
//!         // Basic info survived even though decoding failed
//!         println!("partial: {:?}", err.partial());
//!     }
//!     Err(err) => eprintln!("{}", err),
//! }
//! ```

#![deny(unsafe_code)]

pub mod album;
pub mod engine;
mod error;
pub mod heuristics;
mod options;
mod pipeline;
mod process;
mod results;
mod session;

pub use album::{AlbumSummary, LoudnessStats};
pub use error::{
    render_message, AnalysisError, EngineError, EngineOrigin, ErrorCategory, ErrorKind, Result,
};
pub use options::{AnalysisOptions, ConversionSettings};
pub use pipeline::Analyzer;
pub use results::{
    replaygain_gain, TrackAnalysis, ABSOLUTE_GATE_LUFS, REPLAYGAIN_REFERENCE_LUFS,
};
pub use session::Session;

use std::path::Path;

/// Full analysis with default options: decode and measure loudness, no loudness range
pub fn analyze(path: impl AsRef<Path>) -> Result<TrackAnalysis> {
    Analyzer::new().analyze(path, AnalysisOptions::default())
}

/// Analysis with explicit stage selection
///
/// `measure_loudness` needs `decode`, `measure_range` needs `measure_loudness`.
pub fn analyze_with(
    path: impl AsRef<Path>,
    decode: bool,
    measure_loudness: bool,
    measure_range: bool,
) -> Result<TrackAnalysis> {
    let options = AnalysisOptions::default()
        .decode(decode)
        .measure_loudness(measure_loudness)
        .measure_range(measure_range);
    Analyzer::new().analyze(path, options)
}
