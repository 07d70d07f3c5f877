//! Engine - the session a host drives
//!
//! Owns the device library, the selected device template, the active
//! mapping config and the dispatch loop. Every device or config change
//! rebuilds the program table from scratch and swaps it in whole; a
//! change that fails to load leaves the running table untouched.

use crate::actions::ActionRegistry;
use crate::config::MappingConfig;
use crate::device::{DeviceLibrary, DeviceTemplate};
use crate::dispatch::{DispatchLoop, LoopState, TickOutcome};
use crate::error::{MappingError, Result};
use crate::programs::{ProgramSummary, ProgramTable, NULL_ACTION};
use crate::transport::TransportOpener;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Engine<O: TransportOpener> {
    library: DeviceLibrary,
    template: Option<DeviceTemplate>,
    config_path: Option<PathBuf>,
    config: MappingConfig,
    dispatch: DispatchLoop<O>,
}

impl<O: TransportOpener> Engine<O> {
    pub fn new(library: DeviceLibrary, opener: O, registry: Arc<ActionRegistry>) -> Self {
        Self::with_dispatch(library, DispatchLoop::new(opener, registry))
    }

    /// Use a preconfigured dispatch loop
    pub fn with_dispatch(library: DeviceLibrary, dispatch: DispatchLoop<O>) -> Self {
        Self {
            library,
            template: None,
            config_path: None,
            config: MappingConfig::default(),
            dispatch,
        }
    }

    pub fn template(&self) -> Option<&DeviceTemplate> {
        self.template.as_ref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn dispatch(&self) -> &DispatchLoop<O> {
        &self.dispatch
    }

    pub fn programs(&self) -> &Arc<ProgramTable> {
        self.dispatch.programs()
    }

    pub fn state(&self) -> LoopState {
        self.dispatch.state()
    }

    /// Switch to the device behind `device_id`
    ///
    /// Loads its description, rebuilds the table against the current config
    /// and points the dispatch loop at the new transport. Events still queued
    /// on the previous device are dispatched with the previous table first.
    /// Returns the program entries that had to be skipped.
    pub async fn select_device(&mut self, device_id: &str) -> Result<Vec<MappingError>> {
        let template = self.library.load_for_id(device_id).await?;

        let report = ProgramTable::build(&template, &self.config);
        self.warn_unregistered(&report.table);
        self.dispatch.switch_device(device_id, report.table).await;
        self.template = Some(template);

        Ok(report.skipped)
    }

    /// Load the mapping config at `path` and make it active
    pub async fn set_config(&mut self, path: impl AsRef<Path>) -> Result<Vec<MappingError>> {
        let path = path.as_ref();
        let config = MappingConfig::load(path).await?;
        info!("📄 Loaded mapping config: {}", path.display());

        self.config_path = Some(path.to_path_buf());
        Ok(self.apply_config(config))
    }

    /// Make an already parsed config active (used by hot reload)
    pub fn apply_config(&mut self, config: MappingConfig) -> Vec<MappingError> {
        let skipped = match self.template.take() {
            Some(template) => {
                let skipped = self.install(&template, &config);
                self.template = Some(template);
                skipped
            }
            None => {
                debug!("No device selected yet, table will be built on selection");
                Vec::new()
            }
        };
        self.config = config;
        skipped
    }

    /// Build the table for `template` + `config` and hand it to the dispatch loop
    fn install(&mut self, template: &DeviceTemplate, config: &MappingConfig) -> Vec<MappingError> {
        let report = ProgramTable::build(template, config);
        self.warn_unregistered(&report.table);
        self.dispatch.replace_programs(report.table);
        report.skipped
    }

    /// Warn once per action key that nothing is registered for
    fn warn_unregistered(&self, table: &ProgramTable) {
        let registry = self.dispatch.registry();
        let missing: BTreeSet<&str> = table
            .channels()
            .filter_map(|ch| table.program(ch))
            .flat_map(|program| program.bindings.values())
            .map(|binding| binding.action.as_str())
            .filter(|key| *key != NULL_ACTION && !registry.contains(key))
            .collect();

        for key in missing {
            warn!("Action '{}' is not available, its controls will do nothing", key);
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.dispatch.start()
    }

    pub fn stop(&mut self) {
        self.dispatch.stop()
    }

    pub async fn tick(&mut self) -> TickOutcome {
        self.dispatch.tick().await
    }

    /// Every program of the active table with its complete binding set
    pub fn summary(&self) -> Vec<ProgramSummary> {
        self.dispatch.programs().summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlId;
    use crate::dispatch::tests::{FakeMidi, RecordingAction, MAP_YAML};
    use crate::device::tests::WORLDE_YAML;
    use crate::midi::ControlEvent;
    use std::time::Duration;
    use tempfile::TempDir;

    const DEVICE_ID: &str = "WORLDE easy CTRL:WORLDE easy CTRL MIDI 1 24:0";

    struct Fixture {
        _dir: TempDir,
        map_path: PathBuf,
        midi: FakeMidi,
        volume: Arc<RecordingAction>,
        engine: Engine<FakeMidi>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let devices = dir.path().join("devices");
        std::fs::create_dir(&devices).unwrap();
        std::fs::write(devices.join("worlde.yaml"), WORLDE_YAML).unwrap();

        let map_path = dir.path().join("map.yaml");
        std::fs::write(&map_path, MAP_YAML).unwrap();

        let midi = FakeMidi::with_devices(&[DEVICE_ID]);
        let volume = RecordingAction::new("volume");
        let registry = Arc::new(ActionRegistry::new().with_action(volume.clone()));
        let dispatch =
            DispatchLoop::new(midi.clone(), registry).with_reopen_delay(Duration::ZERO);

        Fixture {
            _dir: dir,
            map_path,
            midi,
            volume,
            engine: Engine::with_dispatch(DeviceLibrary::new(devices), dispatch),
        }
    }

    #[tokio::test]
    async fn test_config_then_device_builds_table() {
        let mut f = fixture();

        f.engine.set_config(&f.map_path).await.unwrap();
        assert!(f.engine.programs().is_empty());

        let skipped = f.engine.select_device(DEVICE_ID).await.unwrap();
        assert!(skipped.is_empty());
        assert_eq!(f.engine.template().unwrap().name(), "WORLDE easy CTRL");
        assert_eq!(f.engine.programs().resolve(0, ControlId(3)), "volume");

        let summary = f.engine.summary();
        assert_eq!(summary.len(), 2);
        assert!(summary.iter().all(|p| p.bindings.len() == 5));
    }

    #[tokio::test]
    async fn test_runs_end_to_end() {
        let mut f = fixture();
        f.engine.select_device(DEVICE_ID).await.unwrap();
        f.engine.set_config(&f.map_path).await.unwrap();
        f.engine.start().unwrap();

        f.midi.send(DEVICE_ID, ControlEvent::new(0, 3, 100));
        assert_eq!(f.engine.tick().await, TickOutcome::Reschedule);
        assert_eq!(f.volume.values(), vec![100]);

        f.engine.stop();
        assert_eq!(f.engine.tick().await, TickOutcome::Halt);
    }

    #[tokio::test]
    async fn test_device_switch_flushes_old_events_first() {
        let mut f = fixture();
        // Pad B lacks controls 23 and 14, so both programs are skipped for it
        std::fs::write(
            f.engine.library.dir().join("pad_b.yaml"),
            "name: Pad B\nslider:\n  - { control: 3, msg_type: control_change }\n",
        )
        .unwrap();
        f.midi.plug("Pad B:1");

        f.engine.set_config(&f.map_path).await.unwrap();
        f.engine.select_device(DEVICE_ID).await.unwrap();
        f.engine.start().unwrap();

        f.midi.send(DEVICE_ID, ControlEvent::new(0, 3, 42));
        let skipped = f.engine.select_device("Pad B:1").await.unwrap();
        assert_eq!(skipped.len(), 2);
        assert_eq!(f.volume.values(), vec![42]);
        assert!(f.engine.programs().is_empty());
        assert_eq!(f.engine.template().unwrap().name(), "Pad B");

        f.engine.tick().await;
        assert_eq!(
            f.midi.log(),
            vec![
                format!("open {}", DEVICE_ID),
                format!("close {}", DEVICE_ID),
                "open Pad B:1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_device_keeps_previous_table() {
        let mut f = fixture();
        f.engine.set_config(&f.map_path).await.unwrap();
        f.engine.select_device(DEVICE_ID).await.unwrap();

        let err = f.engine.select_device("Mystery Pad:port 0").await.unwrap_err();
        assert!(matches!(err, MappingError::ConfigNotFound(_)));
        assert_eq!(f.engine.dispatch().selected_device(), Some(DEVICE_ID));
        assert_eq!(f.engine.programs().resolve(0, ControlId(3)), "volume");
    }

    #[tokio::test]
    async fn test_bad_config_keeps_previous_table() {
        let mut f = fixture();
        f.engine.set_config(&f.map_path).await.unwrap();
        f.engine.select_device(DEVICE_ID).await.unwrap();

        let broken = f.map_path.with_file_name("broken.yaml");
        std::fs::write(&broken, "program: [unclosed").unwrap();

        let err = f.engine.set_config(&broken).await.unwrap_err();
        assert!(matches!(err, MappingError::ConfigParse { .. }));
        assert_eq!(f.engine.config_path(), Some(f.map_path.as_path()));
        assert_eq!(f.engine.programs().resolve(0, ControlId(3)), "volume");
    }

    #[tokio::test]
    async fn test_apply_config_reports_skipped_programs() {
        let mut f = fixture();
        f.engine.select_device(DEVICE_ID).await.unwrap();

        let config = MappingConfig::from_yaml_str(
            "program:\n  - name: Ghost\n    channel: 3\n    button: [{ control: 99, action: volume }]\n",
            "ghost.yaml",
        )
        .unwrap();

        let skipped = f.engine.apply_config(config);
        assert_eq!(skipped.len(), 1);
        assert!(f.engine.programs().is_empty());
    }
}
