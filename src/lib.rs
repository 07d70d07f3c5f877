//! MIDI Shortcuts - drive desktop actions from a MIDI controller
//!
//! A device description lists the controls of a controller model; a mapping
//! config names and binds those controls per program (MIDI channel). The
//! engine builds a program table from both and dispatches incoming control
//! changes to registered actions.

pub mod actions;
pub mod config;
pub mod control;
pub mod defaults;
pub mod device;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod midi;
pub mod paths;
pub mod programs;
pub mod transport;

pub use actions::{Action, ActionRegistry, DesktopControl};
pub use config::{ConfigWatcher, MappingConfig};
pub use control::{ActionBinding, ControlId, InterfaceClass};
pub use device::{DeviceLibrary, DeviceTemplate};
pub use dispatch::{DispatchLoop, LoopState, TickOutcome, TICK_INTERVAL};
pub use engine::Engine;
pub use error::{MappingError, Result};
pub use programs::{ProgramSummary, ProgramTable};
pub use transport::{MidirOpener, TransportOpener};
