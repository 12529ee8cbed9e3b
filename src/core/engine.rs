//! Note decision engine: turns a per-frame (pitch, loudness) signal into
//! discrete MIDI events.
//!
//! Two loudness thresholds form a hysteresis band. Frames louder than the
//! on-threshold start (or change) the sounding note, frames quieter than the
//! off-threshold silence it, and frames in between leave everything as is so
//! a level hovering around one threshold does not flood the output.

use log::{debug, info, warn};

use crate::core::midi::MidiEvent;
use crate::core::note::{freq_to_midi, midi_to_freq, note_name, PitchError};

pub const DEFAULT_ON_THRESHOLD: f32 = 0.8;
pub const DEFAULT_OFF_THRESHOLD: f32 = 0.6;
pub const DEFAULT_MAX_VELOCITY: u8 = 112;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Loudness a frame must exceed to trigger a note-on
    pub on_threshold: f32,
    /// Loudness below which all sound is switched off
    pub off_threshold: f32,
    /// Velocity reached at full-scale loudness
    pub max_velocity: u8,
    /// Send All Sound Off on every quiet frame instead of only when a note
    /// was sounding
    pub resend_all_sound_off: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            on_threshold: DEFAULT_ON_THRESHOLD,
            off_threshold: DEFAULT_OFF_THRESHOLD,
            max_velocity: DEFAULT_MAX_VELOCITY,
            resend_all_sound_off: true,
        }
    }
}

/// State carried from one frame to the next.
///
/// `current_note` is `Some(n)` exactly when a note-on for `n` was sent and no
/// All Sound Off has been sent since.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineState {
    pub current_note: Option<u8>,
}

/// Outcome of processing one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Event(MidiEvent),
    NoOp,
    Invalid(PitchError),
}

/// Mean squared amplitude of a frame
pub fn loudness(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / frame.len() as f64) as f32
}

/// Map the loudness above the on-threshold onto a MIDI velocity
pub fn velocity(loudness: f32, on_threshold: f32, max_velocity: u8) -> u8 {
    let scaled = (loudness - on_threshold) / (1.0 - on_threshold) * max_velocity as f32;
    scaled.round().clamp(0.0, 127.0) as u8
}

pub struct NoteDecisionEngine {
    config: EngineConfig,
    state: EngineState,
}

impl NoteDecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: EngineState::default(),
        }
    }

    pub fn current_note(&self) -> Option<u8> {
        self.state.current_note
    }

    /// Decide what, if anything, to send for one frame.
    ///
    /// `frequency` is `None` when the pitch estimator found no pitch. A quiet
    /// frame releases regardless of its pitch, since silence is exactly when
    /// the estimator reports none.
    pub fn process(&mut self, frame: &[f32], frequency: Option<f32>) -> Decision {
        if frame.is_empty() {
            return Decision::NoOp;
        }

        let level = loudness(frame);

        if level < self.config.off_threshold {
            let previous = self.state.current_note.take();
            if previous.is_none() && !self.config.resend_all_sound_off {
                return Decision::NoOp;
            }
            if let Some(note) = previous {
                debug!("release {} at loudness {}", note_name(note), level);
            }
            return Decision::Event(MidiEvent::AllSoundOff);
        }

        let note = match frequency.ok_or(PitchError::NoPitch).and_then(freq_to_midi) {
            Ok(note) => note,
            Err(err) => {
                warn!("{}", err);
                return Decision::Invalid(err);
            }
        };

        if let Some(freq) = frequency {
            debug!("{:.1} Hz -> {} ({:.1} Hz)", freq, note, midi_to_freq(note));
        }

        if level > self.config.on_threshold {
            info!("{:3} {}", note_name(note), level);

            if self.state.current_note != Some(note) {
                let velocity =
                    velocity(level, self.config.on_threshold, self.config.max_velocity);
                info!("midi: {}", note);
                self.state.current_note = Some(note);
                return Decision::Event(MidiEvent::NoteOn { note, velocity });
            }
        }

        Decision::NoOp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_SIZE: usize = 1024;

    fn frame_with_loudness(level: f32) -> Vec<f32> {
        vec![level.sqrt(); FRAME_SIZE]
    }

    fn create_test_engine() -> NoteDecisionEngine {
        NoteDecisionEngine::new(EngineConfig::default())
    }

    #[test]
    fn test_loudness_is_mean_square() {
        assert_eq!(loudness(&[]), 0.0);
        assert_eq!(loudness(&[0.0; 16]), 0.0);
        assert!((loudness(&[1.0, -1.0, 0.0, 0.0]) - 0.5).abs() < 1e-6);
        assert!((loudness(&frame_with_loudness(0.9)) - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_velocity_scaling_and_clamp() {
        assert_eq!(velocity(0.9, 0.8, 112), 56);
        assert_eq!(velocity(1.0, 0.8, 112), 112);
        assert_eq!(velocity(0.8, 0.8, 112), 0);
        // Clipped input can be far louder than full scale
        assert_eq!(velocity(4.0, 0.8, 112), 127);
    }

    #[test]
    fn test_silent_frame_sends_all_sound_off() {
        let mut engine = create_test_engine();
        engine.state.current_note = Some(64);

        let decision = engine.process(&[0.0; FRAME_SIZE], None);
        assert_eq!(decision, Decision::Event(MidiEvent::AllSoundOff));
        assert_eq!(engine.current_note(), None);
    }

    #[test]
    fn test_loud_frame_from_silence_starts_note() {
        let mut engine = create_test_engine();

        let decision = engine.process(&frame_with_loudness(0.9), Some(440.0));
        assert_eq!(
            decision,
            Decision::Event(MidiEvent::NoteOn {
                note: 69,
                velocity: 56
            })
        );
        assert_eq!(engine.current_note(), Some(69));
    }

    #[test]
    fn test_same_note_is_sustained() {
        let mut engine = create_test_engine();
        let frame = frame_with_loudness(0.9);

        engine.process(&frame, Some(440.0));
        assert_eq!(engine.process(&frame, Some(440.0)), Decision::NoOp);
        // Slightly detuned still quantizes to A4
        assert_eq!(engine.process(&frame, Some(443.0)), Decision::NoOp);
        assert_eq!(engine.current_note(), Some(69));
    }

    #[test]
    fn test_note_change_sends_new_note_on() {
        let mut engine = create_test_engine();
        let frame = frame_with_loudness(0.9);

        engine.process(&frame, Some(440.0));
        let decision = engine.process(&frame, Some(880.0));
        assert_eq!(
            decision,
            Decision::Event(MidiEvent::NoteOn {
                note: 81,
                velocity: 56
            })
        );
        assert_eq!(engine.current_note(), Some(81));
    }

    #[test]
    fn test_dead_zone_changes_nothing() {
        let mut engine = create_test_engine();
        let frame = frame_with_loudness(0.7);

        assert_eq!(engine.process(&frame, Some(440.0)), Decision::NoOp);
        assert_eq!(engine.current_note(), None);

        engine.state.current_note = Some(69);
        assert_eq!(engine.process(&frame, Some(880.0)), Decision::NoOp);
        assert_eq!(engine.current_note(), Some(69));
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let mut engine = NoteDecisionEngine::new(EngineConfig {
            on_threshold: 0.25,
            off_threshold: 0.0625,
            ..EngineConfig::default()
        });

        // Loudness exactly on either threshold lands in the dead zone
        assert_eq!(
            engine.process(&[0.5; FRAME_SIZE], Some(440.0)),
            Decision::NoOp
        );
        assert_eq!(
            engine.process(&[0.25; FRAME_SIZE], Some(440.0)),
            Decision::NoOp
        );
        assert_eq!(engine.current_note(), None);
    }

    #[test]
    fn test_missing_pitch_is_invalid() {
        let mut engine = create_test_engine();
        let frame = frame_with_loudness(0.9);

        assert_eq!(
            engine.process(&frame, None),
            Decision::Invalid(PitchError::NoPitch)
        );
        assert_eq!(engine.current_note(), None);

        engine.process(&frame, Some(440.0));
        assert_eq!(
            engine.process(&frame, Some(0.0)),
            Decision::Invalid(PitchError::NonPositive(0.0))
        );
        assert!(matches!(
            engine.process(&frame, Some(30_000.0)),
            Decision::Invalid(PitchError::OutOfRange(_))
        ));
        assert_eq!(engine.current_note(), Some(69));
    }

    #[test]
    fn test_quiet_frame_releases_even_with_unusable_pitch() {
        let mut engine = create_test_engine();
        engine.process(&frame_with_loudness(0.9), Some(440.0));

        for pitch in [Some(-5.0), Some(0.0), Some(30_000.0), None] {
            assert_eq!(
                engine.process(&[0.0; FRAME_SIZE], pitch),
                Decision::Event(MidiEvent::AllSoundOff)
            );
            assert_eq!(engine.current_note(), None);
        }
    }

    #[test]
    fn test_all_sound_off_resent_on_every_quiet_frame() {
        let mut engine = create_test_engine();
        let quiet = frame_with_loudness(0.1);

        for _ in 0..3 {
            assert_eq!(
                engine.process(&quiet, Some(440.0)),
                Decision::Event(MidiEvent::AllSoundOff)
            );
            assert_eq!(engine.current_note(), None);
        }
    }

    #[test]
    fn test_all_sound_off_only_on_release_when_not_resending() {
        let mut engine = NoteDecisionEngine::new(EngineConfig {
            resend_all_sound_off: false,
            ..EngineConfig::default()
        });
        let quiet = frame_with_loudness(0.1);

        assert_eq!(engine.process(&quiet, None), Decision::NoOp);

        engine.process(&frame_with_loudness(0.9), Some(440.0));
        assert_eq!(
            engine.process(&quiet, None),
            Decision::Event(MidiEvent::AllSoundOff)
        );
        assert_eq!(engine.process(&quiet, None), Decision::NoOp);
        assert_eq!(engine.current_note(), None);
    }

    #[test]
    fn test_empty_frame_is_ignored() {
        let mut engine = create_test_engine();
        engine.state.current_note = Some(69);

        assert_eq!(engine.process(&[], Some(440.0)), Decision::NoOp);
        assert_eq!(engine.process(&[], None), Decision::NoOp);
        assert_eq!(engine.current_note(), Some(69));
    }
}
