//! Mapping configuration
//!
//! Handles loading, parsing, and hot-reloading of the YAML mapping config
//! that names and binds device controls per program.

pub mod watcher;

use crate::control::{ControlId, InterfaceClass};
use crate::error::{MappingError, Result};
use crate::midi::MAX_CHANNEL;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::warn;

pub use watcher::ConfigWatcher;

/// One binding line inside a program entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BindingEntry {
    pub control: ControlId,
    #[serde(default)]
    pub name: String,
    /// Action key; empty means "no action"
    #[serde(default)]
    pub action: String,
}

/// One program entry: a channel and the controls it names or binds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProgramEntry {
    pub name: String,
    pub channel: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub button: Vec<BindingEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slider: Vec<BindingEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub toggle: Vec<BindingEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dial: Vec<BindingEntry>,
    /// Keys that are not part of a program entry, e.g. a misspelled class
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ProgramEntry {
    /// Binding lines in category order (button, slider, toggle, dial)
    pub fn bindings(&self) -> impl Iterator<Item = (InterfaceClass, &BindingEntry)> {
        let lists = [
            (InterfaceClass::Button, &self.button),
            (InterfaceClass::Slider, &self.slider),
            (InterfaceClass::Toggle, &self.toggle),
            (InterfaceClass::Dial, &self.dial),
        ];
        lists
            .into_iter()
            .flat_map(|(class, list)| list.iter().map(move |entry| (class, entry)))
    }

    /// Keys this entry carries that are ignored when building the table
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(String::as_str)
    }
}

/// Root of the mapping config
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub program: Vec<ProgramEntry>,
}

impl MappingConfig {
    /// Parse a mapping config; `origin` is only used in error messages
    pub fn from_yaml_str(contents: &str, origin: impl AsRef<Path>) -> Result<Self> {
        let origin = origin.as_ref();
        let config: MappingConfig =
            serde_yaml::from_str(contents).map_err(|e| MappingError::parse(origin, e))?;
        config.validate(origin)?;
        config.warn_unknown_keys(origin);
        Ok(config)
    }

    /// Load a mapping config from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MappingError::ConfigNotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_yaml_str(&contents, path)
    }

    /// Save the config as YAML
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).map_err(|e| MappingError::parse(path, e))?;
        fs::write(path, yaml).await?;
        Ok(())
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        if let Some(entry) = self.program.iter().find(|p| p.channel > MAX_CHANNEL) {
            return Err(MappingError::parse(
                origin,
                format!(
                    "program '{}' has invalid channel {} (must be 0-{})",
                    entry.name, entry.channel, MAX_CHANNEL
                ),
            ));
        }
        Ok(())
    }

    fn warn_unknown_keys(&self, origin: &Path) {
        for entry in &self.program {
            for key in entry.unknown_keys() {
                warn!(
                    "{}: program '{}' has unknown key '{}' (expected button, slider, toggle or dial), ignoring it",
                    origin.display(),
                    entry.name,
                    key
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const YAML: &str = r#"
program:
  - name: Desktop
    channel: 0
    slider:
      - { control: 3, name: Master, action: pulse_volume }
      - { control: "4", name: Spare }
    button:
      - { control: 23, name: Mute, action: pulse_mute }
"#;

    #[test]
    fn test_parse_program_entries() {
        let config = MappingConfig::from_yaml_str(YAML, "desktop.yaml").unwrap();
        assert_eq!(config.program.len(), 1);

        let desktop = &config.program[0];
        assert_eq!(desktop.channel, 0);
        assert_eq!(desktop.slider[1].control, ControlId(4));
        assert_eq!(desktop.slider[1].action, "");

        let classes: Vec<_> = desktop.bindings().map(|(class, _)| class).collect();
        assert_eq!(
            classes,
            vec![InterfaceClass::Button, InterfaceClass::Slider, InterfaceClass::Slider]
        );
    }

    #[test]
    fn test_misspelled_class_is_reported_not_bound() {
        let yaml = r#"
program:
  - name: Desktop
    channel: 0
    sliders:
      - { control: 3, action: pulse_volume }
    slider:
      - { control: 4, action: pulse_mute }
"#;
        let config = MappingConfig::from_yaml_str(yaml, "typo.yaml").unwrap();
        let desktop = &config.program[0];

        assert_eq!(desktop.unknown_keys().collect::<Vec<_>>(), vec!["sliders"]);
        assert_eq!(desktop.slider.len(), 1);
        assert_eq!(desktop.bindings().count(), 1);

        let clean = MappingConfig::from_yaml_str(YAML, "desktop.yaml").unwrap();
        assert_eq!(clean.program[0].unknown_keys().count(), 0);
    }

    #[test]
    fn test_empty_config_has_no_programs() {
        let config = MappingConfig::from_yaml_str("{}", "empty.yaml").unwrap();
        assert!(config.program.is_empty());
    }

    #[test]
    fn test_rejects_bad_channel() {
        let yaml = "program:\n  - { name: X, channel: 16 }\n";
        let err = MappingConfig::from_yaml_str(yaml, "x.yaml").unwrap_err();
        assert!(matches!(err, MappingError::ConfigParse { .. }));

        // Channel is required
        let yaml = "program:\n  - { name: X }\n";
        assert!(MappingConfig::from_yaml_str(yaml, "x.yaml").is_err());
    }

    #[tokio::test]
    async fn test_load_missing_config() {
        let err = MappingConfig::load("/nonexistent/map.yaml").await.unwrap_err();
        assert!(matches!(err, MappingError::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn test_save_then_load() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("map.yaml");

        let config = MappingConfig::from_yaml_str(YAML, "desktop.yaml")?;
        config.save(&path).await?;

        assert_eq!(MappingConfig::load(&path).await?, config);
        Ok(())
    }
}
