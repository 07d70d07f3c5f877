//! Device templates - the blank set of controls of one controller model
//!
//! Device descriptions live as YAML files in a devices directory, one per
//! model, identified by their top-level `name`:
//!
//! ```yaml
//! name: WORLDE easy CTRL
//! slider:
//!   - { control: 3, msg_type: control_change }
//! button:
//!   - { control: 23, msg_type: control_change }
//! ```

use crate::control::{ControlDefinition, ControlId, InterfaceClass};
use crate::error::{MappingError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Separator between the device name and the port suffix in a port identifier
pub const DEVICE_ID_SEPARATOR: char = ':';

/// Device display name encoded in a transport identifier
///
/// ALSA port names look like `WORLDE easy CTRL:WORLDE easy CTRL MIDI 1 24:0`;
/// the description file is keyed by the part before the first separator.
pub fn device_name_from_id(device_id: &str) -> &str {
    device_id
        .split(DEVICE_ID_SEPARATOR)
        .next()
        .unwrap_or(device_id)
        .trim()
}

#[derive(Debug, Deserialize)]
struct ControlEntry {
    control: ControlId,
    msg_type: String,
}

#[derive(Debug, Deserialize)]
struct DeviceDescription {
    name: String,
    #[serde(default)]
    button: Vec<ControlEntry>,
    #[serde(default)]
    slider: Vec<ControlEntry>,
    #[serde(default)]
    toggle: Vec<ControlEntry>,
    #[serde(default)]
    dial: Vec<ControlEntry>,
}

impl DeviceDescription {
    fn entries(&self, class: InterfaceClass) -> &[ControlEntry] {
        match class {
            InterfaceClass::Button => &self.button,
            InterfaceClass::Slider => &self.slider,
            InterfaceClass::Toggle => &self.toggle,
            InterfaceClass::Dial => &self.dial,
        }
    }
}

/// Only the header, used while scanning for a matching description
#[derive(Debug, Deserialize)]
struct DeviceHeader {
    name: String,
}

/// The blank controls of one device model, keyed by control id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTemplate {
    name: String,
    controls: BTreeMap<ControlId, ControlDefinition>,
}

impl DeviceTemplate {
    /// Parse a device description
    ///
    /// `origin` is only used in error messages.
    pub fn from_yaml_str(contents: &str, origin: impl AsRef<Path>) -> Result<Self> {
        let origin = origin.as_ref();
        let description: DeviceDescription =
            serde_yaml::from_str(contents).map_err(|e| MappingError::parse(origin, e))?;

        let mut controls = BTreeMap::new();
        for class in InterfaceClass::ALL {
            for entry in description.entries(class) {
                if entry.msg_type.trim().is_empty() {
                    return Err(MappingError::parse(
                        origin,
                        format!("{} {} has an empty msg_type", class, entry.control),
                    ));
                }

                let definition = ControlDefinition {
                    control_id: entry.control,
                    interface_class: class,
                    message_type: entry.msg_type.clone(),
                };
                if controls.insert(entry.control, definition).is_some() {
                    return Err(MappingError::parse(
                        origin,
                        format!("control {} is declared more than once", entry.control),
                    ));
                }
            }
        }

        debug!(
            "Parsed device '{}' with {} controls from {}",
            description.name,
            controls.len(),
            origin.display()
        );

        Ok(Self {
            name: description.name,
            controls,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn get(&self, control_id: ControlId) -> Option<&ControlDefinition> {
        self.controls.get(&control_id)
    }

    pub fn contains(&self, control_id: ControlId) -> bool {
        self.controls.contains_key(&control_id)
    }

    pub fn controls(&self) -> impl Iterator<Item = &ControlDefinition> {
        self.controls.values()
    }
}

/// A directory of device description files
#[derive(Debug, Clone)]
pub struct DeviceLibrary {
    dir: PathBuf,
}

impl DeviceLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All description files in the directory, sorted for stable lookup order
    async fn description_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MappingError::ConfigNotFound(format!(
                    "devices directory {}",
                    self.dir.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
                .unwrap_or(false);
            if is_yaml && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Names of every readable description in the library
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for path in self.description_files().await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            match serde_yaml::from_str::<DeviceHeader>(&contents) {
                Ok(header) => names.push(header.name),
                Err(e) => warn!("Skipping unreadable device file {}: {}", path.display(), e),
            }
        }
        Ok(names)
    }

    /// Load the template whose description `name` equals `device_name`
    pub async fn load(&self, device_name: &str) -> Result<DeviceTemplate> {
        for path in self.description_files().await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            let header = match serde_yaml::from_str::<DeviceHeader>(&contents) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Skipping unreadable device file {}: {}", path.display(), e);
                    continue;
                }
            };

            if header.name == device_name {
                let template = DeviceTemplate::from_yaml_str(&contents, &path)?;
                info!(
                    "Loaded device '{}' ({} controls) from {}",
                    template.name(),
                    template.len(),
                    path.display()
                );
                return Ok(template);
            }
        }

        Err(MappingError::ConfigNotFound(device_name.to_string()))
    }

    /// Load the template for a transport identifier (`name:port...`)
    pub async fn load_for_id(&self, device_id: &str) -> Result<DeviceTemplate> {
        self.load(device_name_from_id(device_id)).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) const WORLDE_YAML: &str = r#"
name: WORLDE easy CTRL
slider:
  - { control: 3, msg_type: control_change }
  - { control: 4, msg_type: control_change }
button:
  - { control: 23, msg_type: control_change }
toggle:
  - { control: 24, msg_type: control_change }
dial:
  - { control: 14, msg_type: control_change }
"#;

    pub(crate) fn worlde_template() -> DeviceTemplate {
        DeviceTemplate::from_yaml_str(WORLDE_YAML, "worlde.yaml").unwrap()
    }

    #[test]
    fn test_parse_template() {
        let template = worlde_template();
        assert_eq!(template.name(), "WORLDE easy CTRL");
        assert_eq!(template.len(), 5);

        let dial = template.get(ControlId(14)).unwrap();
        assert_eq!(dial.interface_class, InterfaceClass::Dial);
        assert_eq!(dial.message_type, "control_change");
    }

    #[test]
    fn test_missing_required_field() {
        let yaml = "name: Broken\nslider:\n  - { control: 3 }\n";
        let err = DeviceTemplate::from_yaml_str(yaml, "broken.yaml").unwrap_err();
        assert!(matches!(err, MappingError::ConfigParse { .. }));
    }

    #[test]
    fn test_wrong_type() {
        let yaml = "name: Broken\nbutton: 5\n";
        let err = DeviceTemplate::from_yaml_str(yaml, "broken.yaml").unwrap_err();
        assert!(matches!(err, MappingError::ConfigParse { .. }));
    }

    #[test]
    fn test_duplicate_control_rejected() {
        let yaml = r#"
name: Dup
slider:
  - { control: 3, msg_type: control_change }
dial:
  - { control: 3, msg_type: control_change }
"#;
        let err = DeviceTemplate::from_yaml_str(yaml, "dup.yaml").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_device_name_from_id() {
        assert_eq!(
            device_name_from_id("WORLDE easy CTRL:WORLDE easy CTRL MIDI 1 24:0"),
            "WORLDE easy CTRL"
        );
        assert_eq!(device_name_from_id("nanoKONTROL2"), "nanoKONTROL2");
    }

    #[tokio::test]
    async fn test_library_lookup() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("worlde.yaml"), WORLDE_YAML).unwrap();
        std::fs::write(dir.path().join("other.yml"), "name: Other\n").unwrap();
        std::fs::write(dir.path().join("garbage.yaml"), "[unclosed").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "name: Ignored").unwrap();

        let library = DeviceLibrary::new(dir.path());

        let mut names = library.list().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["Other", "WORLDE easy CTRL"]);

        let template = library
            .load_for_id("WORLDE easy CTRL:WORLDE easy CTRL MIDI 1 24:0")
            .await
            .unwrap();
        assert_eq!(template.len(), 5);

        let err = library.load("Launchpad").await.unwrap_err();
        assert!(matches!(err, MappingError::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn test_library_missing_dir() {
        let library = DeviceLibrary::new("/nonexistent/devices");
        let err = library.load("anything").await.unwrap_err();
        assert!(matches!(err, MappingError::ConfigNotFound(_)));
    }
}
