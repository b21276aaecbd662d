//! Directory scanning for audio files

use crate::config::ScanSettings;
use crate::error::{CliError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Scanner for audio files in directories
pub struct FileScanner {
    /// Lower-case extensions without the dot
    extensions: Vec<String>,

    /// Whether to follow symbolic links
    follow_links: bool,

    /// Maximum depth to traverse
    max_depth: Option<usize>,
}

impl FileScanner {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            follow_links: false,
            max_depth: None,
        }
    }

    pub fn from_settings(settings: &ScanSettings) -> Self {
        let mut scanner = Self::new(&settings.extensions).follow_links(settings.follow_links);
        if let Some(depth) = settings.max_depth {
            scanner = scanner.max_depth(depth);
        }
        scanner
    }

    /// Set whether to follow symbolic links
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Set maximum directory depth to traverse
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Audio files below `path`, sorted so album tracks come out in order
    pub fn scan_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !path.exists() {
            return Err(CliError::Scan(format!("{} does not exist", path.display())));
        }

        if !path.is_dir() {
            return Err(CliError::Scan(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        let mut walker = WalkDir::new(path).follow_links(self.follow_links);
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut audio_files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_file() && self.is_audio_file(entry.path()) {
                audio_files.push(entry.into_path());
            }
        }

        audio_files.sort();
        Ok(audio_files)
    }

    /// Check if a file has one of the configured extensions
    pub fn is_audio_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}
