//! Program tables - per-channel bindings built from a template and a config
//!
//! Every declared program starts from a full copy of the device template
//! and overlays the names and actions listed in the config. Programs never
//! share bindings, so editing one cannot leak into another.

use crate::config::{MappingConfig, ProgramEntry};
use crate::control::{ActionBinding, ControlId};
use crate::device::DeviceTemplate;
use crate::error::{MappingError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Action key of the null (no-op) action
pub const NULL_ACTION: &str = "";

/// Bindings of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub name: String,
    pub bindings: BTreeMap<ControlId, ActionBinding>,
}

impl Program {
    /// A copy of every template control with no label and no action
    fn blank(name: &str, template: &DeviceTemplate) -> Self {
        Self {
            name: name.to_string(),
            bindings: template
                .controls()
                .map(|def| (def.control_id, def.blank_binding()))
                .collect(),
        }
    }

    /// Overlay a config entry onto a fresh copy of the template
    fn from_entry(entry: &ProgramEntry, template: &DeviceTemplate) -> Result<Self> {
        let mut program = Self::blank(&entry.name, template);

        for (class, line) in entry.bindings() {
            let binding = program.bindings.get_mut(&line.control).ok_or_else(|| {
                MappingError::UnknownControl {
                    program: entry.name.clone(),
                    channel: entry.channel,
                    control: line.control.to_string(),
                }
            })?;

            if binding.interface_class != class {
                debug!(
                    "Program '{}': control {} listed under '{}' but the device declares it as '{}'",
                    entry.name, line.control, class, binding.interface_class
                );
            }

            binding.overlay(&line.name, &line.action);
        }

        Ok(program)
    }
}

/// Serializable view of one program, used for summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramSummary {
    pub channel: u8,
    pub name: String,
    pub bindings: Vec<ActionBinding>,
}

/// Channel → program, rebuilt in full on every device or config change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramTable {
    programs: BTreeMap<u8, Program>,
}

/// Result of building a table: the table plus the entries that were skipped
#[derive(Debug)]
pub struct BuildReport {
    pub table: ProgramTable,
    pub skipped: Vec<MappingError>,
}

impl ProgramTable {
    /// Build a table by overlaying every program entry onto the template
    ///
    /// Entries are applied in order; a later entry on the same channel
    /// replaces the earlier one. An entry naming a control the template
    /// lacks is skipped as a whole and reported in `skipped`.
    pub fn build(template: &DeviceTemplate, config: &MappingConfig) -> BuildReport {
        let mut programs = BTreeMap::new();
        let mut skipped = Vec::new();

        for entry in &config.program {
            match Program::from_entry(entry, template) {
                Ok(program) => {
                    if programs.insert(entry.channel, program).is_some() {
                        debug!(
                            "Program '{}' replaces an earlier program on channel {}",
                            entry.name, entry.channel
                        );
                    }
                }
                Err(e) => {
                    warn!("Skipping program '{}': {}", entry.name, e);
                    skipped.push(e);
                }
            }
        }

        info!(
            "Built {} program(s) for device '{}' ({} skipped)",
            programs.len(),
            template.name(),
            skipped.len()
        );

        BuildReport {
            table: ProgramTable { programs },
            skipped,
        }
    }

    /// Action key bound to `control` on `channel`, or the null action
    pub fn resolve(&self, channel: u8, control: ControlId) -> &str {
        self.binding(channel, control)
            .map(|b| b.action.as_str())
            .unwrap_or(NULL_ACTION)
    }

    pub fn binding(&self, channel: u8, control: ControlId) -> Option<&ActionBinding> {
        self.programs.get(&channel)?.bindings.get(&control)
    }

    pub fn program(&self, channel: u8) -> Option<&Program> {
        self.programs.get(&channel)
    }

    pub fn program_name(&self, channel: u8) -> Option<&str> {
        self.programs.get(&channel).map(|p| p.name.as_str())
    }

    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.programs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Every declared program with its full binding set, ordered by channel
    pub fn summary(&self) -> Vec<ProgramSummary> {
        self.programs
            .iter()
            .map(|(channel, program)| ProgramSummary {
                channel: *channel,
                name: program.name.clone(),
                bindings: program.bindings.values().cloned().collect(),
            })
            .collect()
    }
}
