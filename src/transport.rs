//! MIDI input transport
//!
//! The dispatcher only needs two things from a transport: open an input by
//! device identifier, and hand over whatever messages are pending without
//! blocking. `MidirOpener` provides both on top of `midir`.

use crate::error::{MappingError, Result};
use crate::midi::{format_hex, ControlEvent, MidiMessage};
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, trace};

/// Client name announced to the MIDI subsystem
const CLIENT_NAME: &str = "MIDI-Shortcuts";

/// Capacity of the callback → dispatcher queue
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// How often an idle input checks that its port still exists
const PORT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// An open input that can be drained without blocking
pub trait MessageSource {
    /// Identifier the source was opened with
    fn device_id(&self) -> &str;

    /// Every event received since the last call, in arrival order
    ///
    /// Fails with `TransportUnavailable` once the device has gone away; the
    /// caller should close the source and reopen later.
    fn drain_pending(&mut self) -> Result<Vec<ControlEvent>>;

    /// Release the underlying port
    fn close(self);
}

/// Opens message sources by device identifier
pub trait TransportOpener {
    type Source: MessageSource;

    fn open(&mut self, device_id: &str) -> Result<Self::Source>;
}

/// List available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new(&format!("{}-Scanner", CLIENT_NAME))
        .map_err(|e| MappingError::transport("(scanner)", e))?;

    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

/// Pick the port for `device_id`: exact name first, then case-insensitive substring
fn find_input_port(midi_in: &MidiInput, device_id: &str) -> Option<(midir::MidiInputPort, String)> {
    let named: Vec<_> = midi_in
        .ports()
        .into_iter()
        .filter_map(|port| midi_in.port_name(&port).ok().map(|name| (port, name)))
        .collect();

    if let Some(found) = named.iter().find(|(_, name)| name == device_id) {
        return Some(found.clone());
    }

    let pattern = device_id.to_lowercase();
    named.into_iter().find(|(_, name)| {
        let matched = name.to_lowercase().contains(&pattern);
        if matched {
            debug!("Found port '{}' matching pattern '{}'", name, device_id);
        }
        matched
    })
}

/// `midir`-backed transport opener
#[derive(Debug, Default)]
pub struct MidirOpener;

impl MidirOpener {
    pub fn new() -> Self {
        Self
    }
}

impl TransportOpener for MidirOpener {
    type Source = MidirSource;

    fn open(&mut self, device_id: &str) -> Result<MidirSource> {
        let mut midi_in = MidiInput::new(&format!("{}-Input", CLIENT_NAME))
            .map_err(|e| MappingError::transport(device_id, e))?;
        midi_in.ignore(Ignore::All);

        let (port, port_name) = find_input_port(&midi_in, device_id)
            .ok_or_else(|| MappingError::transport(device_id, "input port not found"))?;

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let connection = midi_in
            .connect(
                &port,
                CLIENT_NAME,
                move |_timestamp, data, _| match MidiMessage::parse(data) {
                    Some(message) => match message.control_event() {
                        // Don't block the MIDI thread; a full queue drops the event
                        Some(event) => {
                            let _ = tx.try_send(event);
                        }
                        None => trace!("Ignoring non-CC message: {}", message),
                    },
                    None => debug!("Failed to parse MIDI: {}", format_hex(data)),
                },
                (),
            )
            .map_err(|e| MappingError::transport(device_id, e))?;

        info!("Listening on MIDI input '{}'", port_name);

        Ok(MidirSource {
            device_id: device_id.to_string(),
            port_name,
            connection: Some(connection),
            rx,
            last_port_check: Instant::now(),
        })
    }
}

/// An open `midir` input connection
pub struct MidirSource {
    device_id: String,
    /// Full name of the port that matched `device_id`
    port_name: String,
    connection: Option<MidiInputConnection<()>>,
    rx: mpsc::Receiver<ControlEvent>,
    last_port_check: Instant,
}

impl MidirSource {
    /// Whether the port is still listed by the MIDI subsystem
    fn port_present(&self) -> Result<bool> {
        Ok(list_input_ports()?.iter().any(|name| *name == self.port_name))
    }
}

impl MessageSource for MidirSource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn drain_pending(&mut self) -> Result<Vec<ControlEvent>> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(MappingError::transport(&self.device_id, "input callback gone"));
                }
            }
        }

        // A device that just sent data is alive; only check the port list when quiet
        if events.is_empty() && self.last_port_check.elapsed() >= PORT_CHECK_INTERVAL {
            self.last_port_check = Instant::now();
            if !self.port_present()? {
                return Err(MappingError::transport(
                    &self.device_id,
                    format!("port '{}' disappeared", self.port_name),
                ));
            }
        }

        Ok(events)
    }

    fn close(mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
            info!("Closed MIDI input '{}'", self.device_id);
        }
    }
}

impl Drop for MidirSource {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
        }
    }
}
