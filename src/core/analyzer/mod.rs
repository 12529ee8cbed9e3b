use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use pitch_detection::detector::autocorrelation::AutocorrelationDetector;
use pitch_detection::detector::mcleod::McLeodDetector;
use pitch_detection::detector::yin::YINDetector;
use pitch_detection::detector::PitchDetector as WindowDetector;

pub const DEFAULT_SILENCE_DB: f32 = -20.0;
pub const DEFAULT_TOLERANCE: f32 = 0.15;
pub const DEFAULT_MIN_FREQUENCY: f32 = 40.0;
pub const DEFAULT_MAX_FREQUENCY: f32 = 4000.0;

/// Pitch estimation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchMethod {
    Yin,
    McLeod,
    Autocorrelation,
}

impl FromStr for PitchMethod {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "default" | "yin" => Ok(PitchMethod::Yin),
            "mcleod" | "mpm" => Ok(PitchMethod::McLeod),
            "acf" | "autocorrelation" => Ok(PitchMethod::Autocorrelation),
            other => bail!("Unknown pitch method '{}'", other),
        }
    }
}

impl fmt::Display for PitchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitchMethod::Yin => write!(f, "yin"),
            PitchMethod::McLeod => write!(f, "mcleod"),
            PitchMethod::Autocorrelation => write!(f, "autocorrelation"),
        }
    }
}

/// Anything that can estimate the fundamental frequency of a stream of frames
pub trait PitchDetector {
    /// Estimate the pitch of the latest frame in Hz, `None` when the frame is
    /// silent or unvoiced
    fn estimate(&mut self, frame: &[f32]) -> Option<f32>;
}

/// Level of a frame in dB relative to full scale (mean square power)
pub fn level_db(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return f32::NEG_INFINITY;
    }
    let sum: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let power = sum / frame.len() as f64;
    if power <= 0.0 {
        f32::NEG_INFINITY
    } else {
        (10.0 * power.log10()) as f32
    }
}

fn window_detector(method: PitchMethod, size: usize) -> Box<dyn WindowDetector<f32>> {
    let padding = size / 2;
    match method {
        PitchMethod::Yin => Box::new(YINDetector::<f32>::new(size, padding)),
        PitchMethod::McLeod => Box::new(McLeodDetector::<f32>::new(size, padding)),
        PitchMethod::Autocorrelation => {
            Box::new(AutocorrelationDetector::<f32>::new(size, padding))
        }
    }
}

/// Streaming pitch estimator.
///
/// Incoming hop-sized frames slide into an analysis window of `window_size`
/// samples, so consecutive windows overlap by `window_size - hop_size`. The
/// window is handed to a `pitch_detection` detector; the level gate and the
/// frequency range are applied around it.
pub struct PitchTracker {
    method: PitchMethod,
    detector: Box<dyn WindowDetector<f32>>,
    window: Vec<f32>,
    hop_size: usize,
    sample_rate: usize,
    silence_db: f32,
    tolerance: f32,
    min_frequency: f32,
    max_frequency: f32,
}

impl PitchTracker {
    pub fn new(
        method: PitchMethod,
        window_size: usize,
        hop_size: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if hop_size == 0 || hop_size > window_size {
            bail!(
                "Hop size {} must be between 1 and the window size {}",
                hop_size,
                window_size
            );
        }
        if sample_rate == 0 {
            bail!("Sample rate must be positive");
        }

        Ok(Self {
            method,
            detector: window_detector(method, window_size),
            window: vec![0.0; window_size],
            hop_size,
            sample_rate: sample_rate as usize,
            silence_db: DEFAULT_SILENCE_DB,
            tolerance: DEFAULT_TOLERANCE,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: DEFAULT_MAX_FREQUENCY,
        })
    }

    /// Frames quieter than this level (dB) are reported as unvoiced
    pub fn set_silence(&mut self, db: f32) {
        self.silence_db = db;
    }

    /// Accept estimates whose clarity is at least `1 - tolerance`
    pub fn set_tolerance(&mut self, tolerance: f32) {
        self.tolerance = tolerance;
    }

    pub fn set_range(&mut self, min_frequency: f32, max_frequency: f32) {
        self.min_frequency = min_frequency;
        self.max_frequency = max_frequency;
    }

    pub fn method(&self) -> PitchMethod {
        self.method
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    fn push_frame(&mut self, frame: &[f32]) {
        let size = self.window.len();
        if frame.len() >= size {
            self.window.copy_from_slice(&frame[frame.len() - size..]);
        } else {
            self.window.rotate_left(frame.len());
            self.window[size - frame.len()..].copy_from_slice(frame);
        }
    }
}

impl PitchDetector for PitchTracker {
    fn estimate(&mut self, frame: &[f32]) -> Option<f32> {
        self.push_frame(frame);

        if level_db(frame) < self.silence_db {
            return None;
        }

        let clarity = (1.0 - self.tolerance).clamp(0.0, 1.0);
        let pitch = self
            .detector
            .get_pitch(&self.window, self.sample_rate, 0.0, clarity)?;

        let range = self.min_frequency..=self.max_frequency;
        if pitch.frequency.is_finite() && range.contains(&pitch.frequency) {
            Some(pitch.frequency)
        } else {
            None
        }
    }
}
