use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::document::ReportFormat;

/// Environment variable that overrides `flat_io.api_key`.
pub const FLAT_IO_API_KEY_ENV: &str = "FLAT_IO_API_KEY";

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the file is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Title printed on rendered staves and reports.
    pub title: String,
    /// Author credited in report headers and footers.
    pub author: String,
    /// Where reports are written when `transcribe` has no `-o`.
    pub output_dir: Option<PathBuf>,
    /// Default report format.
    pub format: ReportFormat,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    pub analysis: AnalysisConfig,
    pub render: RenderConfig,
    pub flat_io: FlatIoConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lashir: Your Ultimate Sound to Solfa Converter".to_string(),
            author: "Lashir".to_string(),
            output_dir: None,
            format: ReportFormat::Html,
            workers: 0,
            analysis: AnalysisConfig::default(),
            render: RenderConfig::default(),
            flat_io: FlatIoConfig::default(),
        }
    }
}

/// Which frames become pitch events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// One event per detected onset, pitched from the nearest frame.
    Onsets,
    /// One event per analysis frame.
    Frames,
}

/// Pitch, onset and tempo detection parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub frame_length: usize,
    pub hop_length: usize,
    /// Lowest detectable pitch (C2).
    pub fmin_hz: f64,
    /// Highest detectable pitch (C7).
    pub fmax_hz: f64,
    /// Minimum YIN clarity (0..1) for a frame to be voiced.
    pub clarity_threshold: f64,
    /// Frames quieter than this RMS are treated as silence.
    pub silence_rms: f64,
    pub event_source: EventSource,
    /// Energy rise, in dB, that counts as an onset.
    pub onset_threshold_db: f64,
    /// Minimum frames between onsets.
    pub onset_wait: usize,
    /// Tempo reported when no beat period can be estimated.
    pub default_tempo_bpm: f64,
    /// Nominal note length in quarter notes.
    pub note_duration: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
            fmin_hz: 65.41,
            fmax_hz: 2093.0,
            clarity_threshold: 0.7,
            silence_rms: 0.01,
            event_source: EventSource::Onsets,
            onset_threshold_db: -20.0,
            onset_wait: 10,
            default_tempo_bpm: 120.0,
            note_duration: crate::notes::DEFAULT_NOTE_DURATION,
        }
    }
}

/// Local staff rendering style.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Disable to skip straight to the remote renderer.
    pub local: bool,
    pub staff_color: String,
    pub note_color: String,
    pub background_color: String,
    pub staff_line_width: f64,
    pub note_radius: f64,
    pub stem_length: f64,
    pub stem_width: f64,
    /// Horizontal distance between consecutive notes, in staff spaces.
    pub note_spacing: f64,
    /// Pixels per staff space.
    pub scale: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            local: true,
            staff_color: "#000000".to_string(),
            note_color: "#000000".to_string(),
            background_color: "#FFFFFF".to_string(),
            staff_line_width: 1.2,
            note_radius: 0.4,
            stem_length: 3.5,
            stem_width: 0.1,
            note_spacing: 1.5,
            scale: 12.0,
        }
    }
}

/// Flat.io API settings for the remote renderer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlatIoConfig {
    /// Empty or missing disables the remote renderer.
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub resolution: u32,
    pub margin: u32,
}

impl Default for FlatIoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.flat.io/v2".to_string(),
            timeout_secs: 30,
            resolution: 300,
            margin: 50,
        }
    }
}

impl AppConfig {
    /// Load config from `explicit` if given, else `~/.config/lashir/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Self {
        let config_path = explicit.map(Path::to_path_buf).or_else(Self::config_path);
        let mut config = match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::from_toml(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Some(path) if explicit.is_some() => {
                log::warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply overrides from the environment. `lookup` is `std::env::var` in practice.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(FLAT_IO_API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            log::debug!("Using Flat.io API key from {FLAT_IO_API_KEY_ENV}");
            self.flat_io.api_key = Some(key);
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
