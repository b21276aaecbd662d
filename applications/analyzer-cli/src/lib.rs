//! Soul Analyze - batch front-end for soul-analyzer
//!
//! Analyzes single files or whole album directories and prints text or JSON
//! reports. A failing file never stops the batch.

pub mod config;
pub mod error;
pub mod report;
pub mod scanner;

pub use config::{CliConfig, FlagOverrides, OutputFormat};
pub use error::{CliError, Result};
pub use report::{AlbumReport, ErrorReport, FileReport};
pub use scanner::FileScanner;

use soul_analyzer::{AlbumSummary, AnalysisOptions, Analyzer, TrackAnalysis};
use std::path::PathBuf;

/// Analyze every path in order
pub fn analyze_files(
    analyzer: &Analyzer,
    paths: &[PathBuf],
    options: AnalysisOptions,
) -> Vec<FileReport> {
    paths
        .iter()
        .map(|path| {
            let outcome = analyzer.analyze(path, options);
            if let Err(err) = &outcome {
                tracing::warn!(path = %path.display(), code = err.code(), "{}", err);
            }
            FileReport::new(path, outcome)
        })
        .collect()
}

/// Summary over the files that were analyzed successfully
pub fn summarize(reports: &[FileReport]) -> Option<AlbumSummary> {
    let tracks: Vec<TrackAnalysis> = reports
        .iter()
        .filter_map(|report| report.result.clone())
        .collect();
    AlbumSummary::from_tracks(&tracks)
}
