//! Error types for track analysis
//!
//! Every failure carries an [`ErrorKind`] from a closed taxonomy. Failures that
//! originate inside an engine (media, resampler or loudness) also carry the
//! engine's own diagnostic so callers can show both.

use crate::results::TrackAnalysis;
use serde::Serialize;
use std::fmt;

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Closed set of analysis failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    OutOfMemory,
    FileNotFound,
    NoAudioStream,
    NoDecoder,
    MalformedStreamInfo,
    DecoderInit,
    Decode,
    LoudnessInit,
    LoudnessMeasurement,
    ResamplerInit,
    Resampling,
}

impl ErrorKind {
    pub const ALL: [Self; 11] = [
        Self::OutOfMemory,
        Self::FileNotFound,
        Self::NoAudioStream,
        Self::NoDecoder,
        Self::MalformedStreamInfo,
        Self::DecoderInit,
        Self::Decode,
        Self::LoudnessInit,
        Self::LoudnessMeasurement,
        Self::ResamplerInit,
        Self::Resampling,
    ];

    /// Stable numeric code, 0 is reserved for success
    pub fn code(self) -> i32 {
        match self {
            Self::OutOfMemory => 1,
            Self::FileNotFound => 2,
            Self::NoAudioStream => 3,
            Self::NoDecoder => 4,
            Self::MalformedStreamInfo => 5,
            Self::DecoderInit => 6,
            Self::Decode => 7,
            Self::LoudnessInit => 8,
            Self::LoudnessMeasurement => 9,
            Self::ResamplerInit => 10,
            Self::Resampling => 11,
        }
    }

    /// Look up a kind by its numeric code
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::FileNotFound => "File not found or not accessible",
            Self::NoAudioStream => "No audio stream found in file",
            Self::NoDecoder => "No suitable codec found for audio stream",
            Self::MalformedStreamInfo => "Format error (invalid stream info)",
            Self::DecoderInit => "Failed to initialize audio codec",
            Self::Decode => "Error while decoding audio stream",
            Self::LoudnessInit => "Failed to initialize EBU R128 loudness analyzer",
            Self::LoudnessMeasurement => "Error while performing EBU R128 loudness analysis",
            Self::ResamplerInit => "Failed to initialize audio resampler",
            Self::Resampling => "Error during audio resampling",
            Self::OutOfMemory => "Memory allocation failed",
        }
    }

    /// Coarse grouping used by front-ends
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::FileNotFound => ErrorCategory::File,
            Self::NoAudioStream => ErrorCategory::Stream,
            Self::MalformedStreamInfo => ErrorCategory::Format,
            Self::NoDecoder
            | Self::DecoderInit
            | Self::Decode
            | Self::ResamplerInit
            | Self::Resampling => ErrorCategory::Codec,
            Self::OutOfMemory => ErrorCategory::Memory,
            Self::LoudnessInit | Self::LoudnessMeasurement => ErrorCategory::Loudness,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Error groups exposed to front-ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    File,
    Stream,
    Format,
    Codec,
    Memory,
    Loudness,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Stream => "stream",
            Self::Format => "format",
            Self::Codec => "codec",
            Self::Memory => "memory",
            Self::Loudness => "loudness",
        };
        f.write_str(name)
    }
}

/// Which engine produced an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineOrigin {
    Media,
    Resampler,
    Loudness,
}

impl EngineOrigin {
    pub fn label(self) -> &'static str {
        match self {
            Self::Media => "Media engine",
            Self::Resampler => "Resampler",
            Self::Loudness => "Loudness engine",
        }
    }
}

/// Native diagnostic reported by one of the engines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    pub origin: EngineOrigin,
    pub code: Option<i32>,
    pub message: String,
}

impl EngineError {
    pub fn new(origin: EngineOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            code: None,
            message: message.into(),
        }
    }

    pub fn media(message: impl Into<String>) -> Self {
        Self::new(EngineOrigin::Media, message)
    }

    pub fn resampler(message: impl Into<String>) -> Self {
        Self::new(EngineOrigin::Resampler, message)
    }

    /// Loudness engine error with its native code, the message is derived from it
    pub fn loudness(code: i32) -> Self {
        Self {
            origin: EngineOrigin::Loudness,
            code: Some(code),
            message: crate::engine::loudness_error_message(code),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        let code = err.raw_os_error();
        Self {
            origin: EngineOrigin::Media,
            code,
            message: err.to_string(),
        }
    }
}

/// Failure of an analysis run
///
/// Decode-stage failures keep whatever basic track information was already
/// extracted in [`AnalysisError::partial`].
#[derive(Debug, thiserror::Error)]
#[error("{}", render_message(.kind, .engine))]
pub struct AnalysisError {
    kind: ErrorKind,
    #[source]
    engine: Option<EngineError>,
    partial: Option<Box<TrackAnalysis>>,
}

impl AnalysisError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            engine: None,
            partial: None,
        }
    }

    pub fn engine(kind: ErrorKind, engine: EngineError) -> Self {
        Self {
            kind,
            engine: Some(engine),
            partial: None,
        }
    }

    /// Adapter for `map_err` at engine call sites
    pub(crate) fn from_engine(kind: ErrorKind) -> impl FnOnce(EngineError) -> Self {
        move |engine| Self::engine(kind, engine)
    }

    #[must_use]
    pub fn with_partial(mut self, partial: TrackAnalysis) -> Self {
        self.partial = Some(Box::new(partial));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn engine_error(&self) -> Option<&EngineError> {
        self.engine.as_ref()
    }

    pub fn partial(&self) -> Option<&TrackAnalysis> {
        self.partial.as_deref()
    }

    pub fn into_partial(self) -> Option<TrackAnalysis> {
        self.partial.map(|partial| *partial)
    }
}

/// Combined human-readable message for a kind and an optional engine diagnostic
pub fn render_message(kind: &ErrorKind, engine: &Option<EngineError>) -> String {
    match engine {
        Some(engine) => format!(
            "Audio analyzer error: {}. {} error: {}",
            kind.description(),
            engine.origin.label(),
            engine.message
        ),
        None => format!("Audio analyzer error: {}", kind.description()),
    }
}
