use std::fmt;

/// Reference pitch for A4 (MIDI note 69)
pub const A4_FREQUENCY: f32 = 440.0;
pub const A4_MIDI_NOTE: u8 = 69;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Reasons a pitch estimate cannot be turned into a MIDI note
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PitchError {
    /// The estimator reported no pitch for the frame (unvoiced or silent)
    NoPitch,
    /// Zero or negative frequency
    NonPositive(f32),
    /// The nearest semitone falls outside 0..=127, or the estimate is not finite
    OutOfRange(f32),
}

impl fmt::Display for PitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitchError::NoPitch => write!(f, "no pitch detected"),
            PitchError::NonPositive(freq) => write!(f, "non-positive frequency {} Hz", freq),
            PitchError::OutOfRange(freq) => {
                write!(f, "frequency {} Hz is outside the MIDI note range", freq)
            }
        }
    }
}

impl std::error::Error for PitchError {}

/// Convert a frequency in Hz to the nearest MIDI note number.
///
/// Halfway between two semitones rounds up.
pub fn freq_to_midi(freq: f32) -> Result<u8, PitchError> {
    if freq.is_nan() || freq.is_infinite() {
        return Err(PitchError::OutOfRange(freq));
    }
    if freq <= 0.0 {
        return Err(PitchError::NonPositive(freq));
    }

    let semitones = A4_MIDI_NOTE as f64 + 12.0 * (freq as f64 / A4_FREQUENCY as f64).log2();
    let nearest = round_half_up(semitones);
    if !(0.0..=127.0).contains(&nearest) {
        return Err(PitchError::OutOfRange(freq));
    }

    Ok(nearest as u8)
}

fn round_half_up(semitones: f64) -> f64 {
    (semitones + 0.5).floor()
}

/// Convert a MIDI note number to the centre frequency of that semitone
pub fn midi_to_freq(note: u8) -> f32 {
    A4_FREQUENCY * 2.0f32.powf((note as f32 - A4_MIDI_NOTE as f32) / 12.0)
}

/// Name of a MIDI note in scientific pitch notation, e.g. 69 -> "A4"
pub fn note_name(note: u8) -> String {
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[note as usize % 12], octave)
}
