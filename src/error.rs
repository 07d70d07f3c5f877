//! Error taxonomy for loading mappings and dispatching actions
//!
//! Load-time errors (`ConfigNotFound`, `ConfigParse`, `UnknownControl`) are
//! returned to the caller so the host can show them. Run-time errors
//! (`ActionExecution`, `TransportUnavailable`) are caught by the dispatch
//! loop and only logged.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    /// No device description or config resource matched the request
    #[error("no configuration found for '{0}'")]
    ConfigNotFound(String),

    /// The resource exists but could not be parsed or failed validation
    #[error("failed to parse {}: {reason}", path.display())]
    ConfigParse { path: PathBuf, reason: String },

    /// A program entry references a control the device does not have
    #[error("program '{program}' (channel {channel}) references unknown control {control}")]
    UnknownControl {
        program: String,
        channel: u8,
        control: String,
    },

    /// An action failed while executing (backend gone, command failed, ...)
    #[error("action '{action}' failed: {reason}")]
    ActionExecution { action: String, reason: String },

    /// The MIDI input could not be opened or has disappeared
    #[error("MIDI transport '{device_id}' unavailable: {reason}")]
    TransportUnavailable { device_id: String, reason: String },

    /// The config file could not be watched for changes
    #[error("cannot watch {}: {reason}", path.display())]
    Watch { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MappingError {
    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ConfigParse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn action(action: impl Into<String>, reason: impl ToString) -> Self {
        Self::ActionExecution {
            action: action.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transport(device_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::TransportUnavailable {
            device_id: device_id.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn watch(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Watch {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MappingError::UnknownControl {
            program: "Desktop".to_string(),
            channel: 2,
            control: "99".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "program 'Desktop' (channel 2) references unknown control 99"
        );

        let err = MappingError::parse("devices/x.yaml", "missing field `control`");
        assert_eq!(
            err.to_string(),
            "failed to parse devices/x.yaml: missing field `control`"
        );
    }

    #[test]
    fn test_runtime_error_messages() {
        let err = MappingError::transport("nanoKONTROL", "port closed");
        assert_eq!(
            err.to_string(),
            "MIDI transport 'nanoKONTROL' unavailable: port closed"
        );

        let err = MappingError::watch("maps/desktop.yaml", "No such file");
        assert_eq!(err.to_string(), "cannot watch maps/desktop.yaml: No such file");
    }
}
