mod output;

pub use output::{list_output_ports, MidiOutputHandler};

use anyhow::Result;

pub const NOTE_ON: u8 = 0x90;
pub const CONTROL_CHANGE: u8 = 0xB0;
/// Controller number for "All Sound Off"
pub const ALL_SOUND_OFF: u8 = 120;

/// Outbound channel-voice messages, always on channel 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    AllSoundOff,
}

impl MidiEvent {
    /// Encode as a 3-byte MIDI message
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiEvent::NoteOn { note, velocity } => [NOTE_ON, note & 0x7F, velocity & 0x7F],
            MidiEvent::AllSoundOff => [CONTROL_CHANGE, ALL_SOUND_OFF, 0],
        }
    }
}

/// Destination for the events produced by the note engine
pub trait EventSink {
    fn send(&mut self, event: &MidiEvent) -> Result<()>;
}
