use anyhow::{anyhow, Result};
use log::{debug, info};
use midir::{MidiOutput, MidiOutputConnection};

use super::{EventSink, MidiEvent};

const CLIENT_NAME: &str = "instrument2midi";

/// List all MIDI output ports other software has registered on this host
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new(CLIENT_NAME)
        .map_err(|err| anyhow!("Failed to initialize MIDI output: {}", err))?;

    let mut port_names = Vec::new();
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            port_names.push(name);
        }
    }
    Ok(port_names)
}

/// Owns the MIDI output port the transcribed notes are written to.
///
/// The port is closed when the handler is dropped.
pub struct MidiOutputHandler {
    connection: Option<MidiOutputConnection>,
    port_name: String,
}

impl MidiOutputHandler {
    /// Open the output port.
    ///
    /// On Unix hosts this registers a virtual port that synths and DAWs can
    /// connect to. Other hosts have no virtual ports, so the first existing
    /// port whose name contains `port_name` is used instead.
    pub fn open(port_name: &str) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|err| anyhow!("Failed to create MIDI output: {}", err))?;

        let connection = Self::connect(midi_out, port_name)?;
        info!("Opened MIDI output port '{}'", port_name);

        Ok(Self {
            connection: Some(connection),
            port_name: port_name.to_string(),
        })
    }

    #[cfg(unix)]
    fn connect(midi_out: MidiOutput, port_name: &str) -> Result<MidiOutputConnection> {
        use midir::os::unix::VirtualOutput;

        midi_out
            .create_virtual(port_name)
            .map_err(|err| anyhow!("Failed to create virtual MIDI port '{}': {}", port_name, err))
    }

    #[cfg(not(unix))]
    fn connect(midi_out: MidiOutput, port_name: &str) -> Result<MidiOutputConnection> {
        // Find the port with the given name
        let ports = midi_out.ports();
        let port = ports.into_iter().find(|port| {
            midi_out
                .port_name(port)
                .map(|name| name.contains(port_name))
                .unwrap_or(false)
        });

        let port = match port {
            Some(p) => p,
            None => return Err(anyhow!("MIDI port '{}' not found", port_name)),
        };

        midi_out
            .connect(&port, CLIENT_NAME)
            .map_err(|err| anyhow!("Failed to connect to MIDI port '{}': {}", port_name, err))
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send_raw(&mut self, message: &[u8]) -> Result<()> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| anyhow!("MIDI port '{}' is closed", self.port_name))?;

        conn.send(message)
            .map_err(|err| anyhow!("Failed to send MIDI message: {}", err))
    }
}

impl EventSink for MidiOutputHandler {
    fn send(&mut self, event: &MidiEvent) -> Result<()> {
        debug!("Sending {:?}", event);
        self.send_raw(&event.to_bytes())
    }
}

impl Drop for MidiOutputHandler {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            let _ = conn.close();
            info!("Closed MIDI output port '{}'", self.port_name);
        }
    }
}
