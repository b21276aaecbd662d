/// Command line configuration
use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use soul_analyzer::{AnalysisOptions, ConversionSettings};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "soul-analyze.toml";

/// Prefix of environment overrides, e.g. `SOUL_ANALYZE_ANALYSIS__MEASURE_RANGE=true`
pub const ENV_PREFIX: &str = "SOUL_ANALYZE";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CliConfig {
    #[serde(default = "default_analysis")]
    pub analysis: AnalysisSettings,

    #[serde(default = "default_scan")]
    pub scan: ScanSettings,

    #[serde(default = "default_output")]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_true")]
    pub decode: bool,

    #[serde(default = "default_true")]
    pub measure_loudness: bool,

    #[serde(default)]
    pub measure_range: bool,

    #[serde(default = "default_max_meter_rate")]
    pub max_meter_rate: u32,

    #[serde(default = "default_fallback_meter_rate")]
    pub fallback_meter_rate: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanSettings {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub follow_links: bool,

    #[serde(default)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Command line flags that override the loaded configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagOverrides {
    pub no_decode: bool,
    pub no_loudness: bool,
    pub lra: bool,
    pub json: bool,
}

impl AnalysisSettings {
    pub fn options(&self) -> AnalysisOptions {
        AnalysisOptions::default()
            .decode(self.decode)
            .measure_loudness(self.measure_loudness)
            .measure_range(self.measure_range)
            .conversion(ConversionSettings {
                max_meter_rate: self.max_meter_rate,
                fallback_meter_rate: self.fallback_meter_rate,
            })
    }
}

impl CliConfig {
    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist. Without one, `soul-analyze.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()).required(true));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        // Override with environment variables (prefixed with SOUL_ANALYZE_)
        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("scan.extensions")
                .try_parsing(true),
        );

        let config = settings.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Command line flags win over file and environment
    pub fn apply(&mut self, flags: FlagOverrides) {
        if flags.no_decode {
            self.analysis.decode = false;
        }
        if flags.no_loudness {
            self.analysis.measure_loudness = false;
        }
        if flags.lra {
            self.analysis.measure_range = true;
        }
        if flags.json {
            self.output.format = OutputFormat::Json;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if analysis.fallback_meter_rate == 0 {
            return Err(CliError::Config(
                "analysis.fallback_meter_rate must be positive".to_string(),
            ));
        }

        if analysis.fallback_meter_rate > analysis.max_meter_rate {
            return Err(CliError::Config(format!(
                "analysis.fallback_meter_rate ({}) exceeds analysis.max_meter_rate ({})",
                analysis.fallback_meter_rate, analysis.max_meter_rate
            )));
        }

        if self.scan.extensions.is_empty() {
            return Err(CliError::Config(
                "scan.extensions must list at least one extension".to_string(),
            ));
        }

        Ok(())
    }
}

// Default values
fn default_analysis() -> AnalysisSettings {
    AnalysisSettings {
        decode: true,
        measure_loudness: true,
        measure_range: false,
        max_meter_rate: default_max_meter_rate(),
        fallback_meter_rate: default_fallback_meter_rate(),
    }
}

fn default_true() -> bool {
    true
}

fn default_max_meter_rate() -> u32 {
    ConversionSettings::default().max_meter_rate
}

fn default_fallback_meter_rate() -> u32 {
    ConversionSettings::default().fallback_meter_rate
}

fn default_scan() -> ScanSettings {
    ScanSettings {
        extensions: default_extensions(),
        follow_links: false,
        max_depth: None,
    }
}

fn default_extensions() -> Vec<String> {
    ["mp3", "flac", "ogg", "oga", "opus", "wav", "aac", "m4a", "mka", "caf"]
        .iter()
        .map(|ext| (*ext).to_string())
        .collect()
}

fn default_output() -> OutputSettings {
    OutputSettings {
        format: OutputFormat::default(),
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            analysis: default_analysis(),
            scan: default_scan(),
            output: default_output(),
        }
    }
}
