use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::core::analyzer::{
    PitchMethod, DEFAULT_MAX_FREQUENCY, DEFAULT_MIN_FREQUENCY, DEFAULT_SILENCE_DB,
    DEFAULT_TOLERANCE,
};
use crate::core::audio::{DEFAULT_HOP_SIZE, DEFAULT_SAMPLE_RATE, DEFAULT_WINDOW_SIZE};
use crate::core::engine::{
    EngineConfig, DEFAULT_MAX_VELOCITY, DEFAULT_OFF_THRESHOLD, DEFAULT_ON_THRESHOLD,
};

/// Environment variable that points at an alternative settings file
pub const CONFIG_ENV_VAR: &str = "INSTRUMENT2MIDI_CONFIG";

const APP_DIR: &str = "instrument2midi";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Audio input
    pub sample_rate: u32,
    pub window_size: usize,
    pub hop_size: usize,
    /// Capture device name, host default when unset
    pub input_device: Option<String>,
    /// Transcribe a WAV file instead of live input
    pub input_file: Option<PathBuf>,

    // Pitch detection
    pub pitch_method: String,
    pub silence_db: f32,
    pub tolerance: f32,
    pub min_frequency: f32,
    pub max_frequency: f32,

    // Note decisions
    pub on_threshold: f32,
    pub off_threshold: f32,
    pub max_velocity: u8,
    pub resend_all_sound_off: bool,

    // MIDI output
    pub port_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_size: DEFAULT_WINDOW_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
            input_device: None,
            input_file: None,
            pitch_method: "default".to_string(),
            silence_db: DEFAULT_SILENCE_DB,
            tolerance: DEFAULT_TOLERANCE,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: DEFAULT_MAX_FREQUENCY,
            on_threshold: DEFAULT_ON_THRESHOLD,
            off_threshold: DEFAULT_OFF_THRESHOLD,
            max_velocity: DEFAULT_MAX_VELOCITY,
            resend_all_sound_off: true,
            port_name: APP_DIR.to_string(),
        }
    }
}

impl Settings {
    /// Settings file location: `$INSTRUMENT2MIDI_CONFIG`, or
    /// `<config dir>/instrument2midi/settings.json`
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push(APP_DIR);
        path.push(SETTINGS_FILE);
        Ok(path)
    }

    /// Load settings, writing the defaults out first if the file is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let settings = if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open settings: {}", path.display()))?;
            let settings: Self = serde_json::from_reader(file)
                .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
            info!("Loaded settings from {}", path.display());
            settings
        } else {
            let settings = Self::default();
            settings.save(path)?;
            info!("Wrote default settings to {}", path.display());
            settings
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create settings: {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write settings")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            bail!(
                "hop_size ({}) must be between 1 and window_size ({})",
                self.hop_size,
                self.window_size
            );
        }
        if !(0.0 <= self.off_threshold
            && self.off_threshold < self.on_threshold
            && self.on_threshold < 1.0)
        {
            bail!(
                "thresholds must satisfy 0 <= off_threshold ({}) < on_threshold ({}) < 1",
                self.off_threshold,
                self.on_threshold
            );
        }
        if self.max_velocity > 127 {
            bail!("max_velocity ({}) must be at most 127", self.max_velocity);
        }
        if !(0.0 < self.min_frequency && self.min_frequency < self.max_frequency) {
            bail!(
                "frequency range {}..{} Hz is empty",
                self.min_frequency,
                self.max_frequency
            );
        }
        self.pitch_method()?;
        Ok(())
    }

    pub fn pitch_method(&self) -> Result<PitchMethod> {
        self.pitch_method.parse()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            on_threshold: self.on_threshold,
            off_threshold: self.off_threshold,
            max_velocity: self.max_velocity,
            resend_all_sound_off: self.resend_all_sound_off,
        }
    }
}
