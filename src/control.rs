//! Control definitions and per-program action bindings
//!
//! A `ControlDefinition` describes one physical control of a device model.
//! An `ActionBinding` is that control relabelled and bound to an action key
//! inside one program.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of a physical control (its MIDI controller number)
///
/// Accepts both `23` and `"23"` in resource files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ControlId(pub u8);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ControlId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for ControlId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        let number = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n,
            Raw::Text(s) => s.trim().parse::<u64>().map_err(|_| {
                serde::de::Error::custom(format!("control id '{}' is not a number", s))
            })?,
        };

        u8::try_from(number)
            .ok()
            .filter(|n| *n <= crate::midi::MAX_VALUE)
            .map(ControlId)
            .ok_or_else(|| {
                serde::de::Error::custom(format!("control id {} out of range (0-127)", number))
            })
    }
}

/// Which kind of physical control an entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceClass {
    Button,
    Slider,
    Toggle,
    Dial,
}

impl InterfaceClass {
    pub const ALL: [InterfaceClass; 4] = [
        InterfaceClass::Button,
        InterfaceClass::Slider,
        InterfaceClass::Toggle,
        InterfaceClass::Dial,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InterfaceClass::Button => "button",
            InterfaceClass::Slider => "slider",
            InterfaceClass::Toggle => "toggle",
            InterfaceClass::Dial => "dial",
        }
    }
}

impl fmt::Display for InterfaceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one control on a device model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlDefinition {
    pub control_id: ControlId,
    pub interface_class: InterfaceClass,
    /// Message type as written in the device file (e.g. "control_change")
    pub message_type: String,
}

impl ControlDefinition {
    /// Start an unbound binding for this control
    pub fn blank_binding(&self) -> ActionBinding {
        ActionBinding {
            control_id: self.control_id,
            display_name: String::new(),
            message_type: self.message_type.clone(),
            interface_class: self.interface_class,
            action: String::new(),
        }
    }
}

/// A control bound to a named action within one program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionBinding {
    pub control_id: ControlId,
    pub display_name: String,
    pub message_type: String,
    pub interface_class: InterfaceClass,
    /// Key into the action registry; empty means unbound
    pub action: String,
}

impl ActionBinding {
    pub fn is_bound(&self) -> bool {
        !self.action.is_empty()
    }

    /// Relabel and rebind this control
    pub(crate) fn overlay(&mut self, name: &str, action: &str) {
        self.display_name = name.to_string();
        self.action = action.to_string();
    }
}

impl fmt::Display for ActionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, control {} \"{}\" ({}): {}",
            self.interface_class, self.control_id, self.display_name, self.message_type, self.action
        )
    }
}
