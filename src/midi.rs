//! MIDI message decoding
//!
//! Turns the raw bytes handed over by the transport callback into typed
//! messages, and extracts the control-change events that drive dispatch.

use std::fmt;

/// Highest value a 7-bit MIDI data byte can carry
pub const MAX_VALUE: u8 = 127;

/// Highest MIDI channel number (channels are 0-based on the wire)
pub const MAX_CHANNEL: u8 = 15;

/// Decoded MIDI channel message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// Anything else with a valid status byte (aftertouch, clock, sysex, ...)
    Other { status: u8 },
}

/// A control-change event as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlEvent {
    /// MIDI channel, 0-based; selects the program
    pub channel: u8,
    /// Controller number; matched against the device's control ids
    pub control: u8,
    /// Controller value (0-127)
    pub value: u8,
}

impl ControlEvent {
    pub fn new(channel: u8, control: u8, value: u8) -> Self {
        Self {
            channel,
            control,
            value,
        }
    }
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    ///
    /// Running status is not tracked; a leading data byte yields `None`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if status < 0x80 {
            return None;
        }

        if status >= 0xF0 {
            return Some(MidiMessage::Other { status });
        }

        let channel = status & 0x0F;
        let byte = |i: usize| rest.get(i).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: byte(0)?,
                velocity: byte(1)?,
            }),
            0x90 => {
                let note = byte(0)?;
                let velocity = byte(1)?;
                // Velocity 0 is a Note Off in disguise
                if velocity == 0 {
                    Some(MidiMessage::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    })
                } else {
                    Some(MidiMessage::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: byte(0)?,
                value: byte(1)?,
            }),
            0xC0 => Some(MidiMessage::ProgramChange {
                channel,
                program: byte(0)?,
            }),
            0xE0 => {
                let lsb = byte(0)? as u16;
                let msb = byte(1)? as u16;
                Some(MidiMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            // Poly pressure (0xA0) and channel pressure (0xD0)
            _ => Some(MidiMessage::Other { status }),
        }
    }

    /// Get the channel for channel messages (0-15)
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => Some(channel),
            MidiMessage::Other { status } if status < 0xF0 => Some(status & 0x0F),
            MidiMessage::Other { .. } => None,
        }
    }

    /// The dispatchable event carried by this message, if any
    pub fn control_event(&self) -> Option<ControlEvent> {
        match *self {
            MidiMessage::ControlChange { channel, cc, value } => {
                Some(ControlEvent::new(channel, cc, value))
            }
            _ => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::Other { status } => write!(f, "Status 0x{:02X}", status),
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_change() {
        let data = [0xB2, 7, 100]; // CC ch 3, volume, value 100
        let msg = MidiMessage::parse(&data).unwrap();

        assert_eq!(
            msg,
            MidiMessage::ControlChange {
                channel: 2,
                cc: 7,
                value: 100,
            }
        );
        assert_eq!(msg.control_event(), Some(ControlEvent::new(2, 7, 100)));
    }

    #[test]
    fn test_note_on_velocity_zero() {
        let msg = MidiMessage::parse(&[0x90, 60, 0]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOff {
                channel: 0,
                note: 60,
                velocity: 0,
            }
        );
        assert_eq!(msg.control_event(), None);
    }

    #[test]
    fn test_pitch_bend() {
        let msg = MidiMessage::parse(&[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(msg, MidiMessage::PitchBend { channel: 0, value: 8192 });
    }

    #[test]
    fn test_truncated_and_running_status() {
        assert_eq!(MidiMessage::parse(&[]), None);
        assert_eq!(MidiMessage::parse(&[0xB0, 7]), None);
        assert_eq!(MidiMessage::parse(&[0x07, 0x40]), None);
    }

    #[test]
    fn test_system_messages_have_no_channel() {
        let msg = MidiMessage::parse(&[0xF8]).unwrap();
        assert_eq!(msg.channel(), None);
        assert_eq!(msg.control_event(), None);

        let pressure = MidiMessage::parse(&[0xD3, 0x20]).unwrap();
        assert_eq!(pressure.channel(), Some(3));
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xB0, 0x07, 0x7F]), "B0 07 7F");
    }
}
