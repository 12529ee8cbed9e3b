use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};

mod core;
mod pipeline;
mod settings;

use crate::core::analyzer::PitchTracker;
use crate::core::audio::{list_input_devices, CaptureSource, FrameSource, WavSource};
use crate::core::engine::NoteDecisionEngine;
use crate::core::midi::{list_output_ports, MidiOutputHandler};
use crate::core::note::note_name;
use crate::pipeline::{RunSummary, Transcriber};
use crate::settings::Settings;

fn main() -> Result<()> {
    // Diagnostics go to stdout, RUST_LOG overrides the level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    let settings_path = Settings::default_path()?;
    let settings = Settings::load_or_create(&settings_path)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("Failed to install Ctrl+C handler")?;
    }

    let summary = match &settings.input_file {
        Some(path) => {
            let source = WavSource::open(path, settings.hop_size)?;
            transcribe(source, &settings, &stop)?
        }
        None => {
            match list_input_devices() {
                Ok(devices) => info!("Input devices: {:?}", devices),
                Err(err) => warn!("Could not list input devices: {:#}", err),
            }
            let source = CaptureSource::open(
                settings.input_device.as_deref(),
                settings.sample_rate,
                settings.hop_size,
            )?;
            info!("Listening on '{}'", source.device_name());
            transcribe(source, &settings, &stop)?
        }
    };

    if stop.load(Ordering::SeqCst) {
        info!("Ctrl+C pressed, exiting");
    }
    info!(
        "Processed {} frames, sent {} events, {} frames without a usable pitch",
        summary.frames, summary.events, summary.invalid_frames
    );
    Ok(())
}

/// Wire a frame source to the pitch tracker, note engine and MIDI port and
/// run until stopped. Everything opened here is released before returning.
fn transcribe<S: FrameSource>(
    source: S,
    settings: &Settings,
    stop: &AtomicBool,
) -> Result<RunSummary> {
    let sample_rate = source.sample_rate();
    if sample_rate != settings.sample_rate {
        warn!(
            "Input runs at {} Hz instead of the configured {} Hz",
            sample_rate, settings.sample_rate
        );
    }

    let mut detector = PitchTracker::new(
        settings.pitch_method()?,
        settings.window_size,
        settings.hop_size,
        sample_rate,
    )?;
    detector.set_silence(settings.silence_db);
    detector.set_tolerance(settings.tolerance);
    detector.set_range(settings.min_frequency, settings.max_frequency);
    info!(
        "Pitch method {} over {} samples, hop {}, {} sample frames at {} Hz",
        detector.method(),
        detector.window_size(),
        detector.hop_size(),
        source.frame_size(),
        sample_rate
    );

    match list_output_ports() {
        Ok(ports) => debug!("MIDI output ports: {:?}", ports),
        Err(err) => warn!("Could not list MIDI output ports: {:#}", err),
    }
    let sink = MidiOutputHandler::open(&settings.port_name)?;
    info!("Sending notes to MIDI port '{}'", sink.port_name());

    let engine = NoteDecisionEngine::new(settings.engine_config());
    let mut transcriber = Transcriber::new(source, detector, engine, sink);

    info!("Starting to listen, press Ctrl+C to stop");
    let summary = transcriber.run(stop)?;

    // Close the port before letting go of the input device
    let (source, _, engine, sink) = transcriber.into_parts();
    if let Some(note) = engine.current_note() {
        debug!("Stopped while {} was sounding", note_name(note));
    }
    drop(sink);
    drop(source);

    Ok(summary)
}
