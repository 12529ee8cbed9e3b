use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::debug;

use crate::core::analyzer::PitchDetector;
use crate::core::audio::FrameSource;
use crate::core::engine::{Decision, NoteDecisionEngine};
use crate::core::midi::EventSink;

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub events: u64,
    pub invalid_frames: u64,
}

/// The audio-to-MIDI loop: read a frame, estimate its pitch, decide, send
pub struct Transcriber<S, P, K> {
    source: S,
    detector: P,
    engine: NoteDecisionEngine,
    sink: K,
}

impl<S, P, K> Transcriber<S, P, K>
where
    S: FrameSource,
    P: PitchDetector,
    K: EventSink,
{
    pub fn new(source: S, detector: P, engine: NoteDecisionEngine, sink: K) -> Self {
        Self {
            source,
            detector,
            engine,
            sink,
        }
    }

    /// Process a single frame, returning the decision taken for it
    pub fn step(&mut self, frame: &[f32]) -> Result<Decision> {
        let frequency = self.detector.estimate(frame);
        let decision = self.engine.process(frame, frequency);

        if let Decision::Event(event) = &decision {
            self.sink.send(event).context("Failed to send MIDI event")?;
        }
        Ok(decision)
    }

    /// Run until `stop` is set or the source runs dry.
    ///
    /// The flag is checked between frames, so the frame in flight always
    /// completes. Read and send failures end the loop with an error.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        while !stop.load(Ordering::SeqCst) {
            let frame = match self.source.read().context("Failed to read audio frame")? {
                Some(frame) => frame,
                None => {
                    debug!("Input exhausted after {} frames", summary.frames);
                    break;
                }
            };

            summary.frames += 1;
            match self.step(&frame)? {
                Decision::Event(_) => summary.events += 1,
                Decision::Invalid(_) => summary.invalid_frames += 1,
                Decision::NoOp => {}
            }
        }

        Ok(summary)
    }

    /// Take the collaborators apart again, e.g. to close them in a set order
    pub fn into_parts(self) -> (S, P, NoteDecisionEngine, K) {
        (self.source, self.detector, self.engine, self.sink)
    }
}
