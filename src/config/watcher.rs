//! Mapping config watcher for hot-reload support

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::MappingConfig;
use crate::error::{MappingError, Result};

/// Time left for editors to finish writing before the file is re-read
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches a mapping config file and yields each successfully reloaded version
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
    rx: mpsc::Receiver<MappingConfig>,
}

impl ConfigWatcher {
    /// Start watching `config_path`
    ///
    /// Must be called from within a tokio runtime: reloads are spawned on it.
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = config_path.into();
        let (tx, rx) = mpsc::channel(10);

        // notify callbacks run on their own OS thread, outside the runtime
        let runtime_handle = tokio::runtime::Handle::current();
        let reload_path = path.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    debug!("Mapping config modified: {:?}", event.paths);

                    let path = reload_path.clone();
                    let tx = tx.clone();

                    runtime_handle.spawn(async move {
                        tokio::time::sleep(DEBOUNCE).await;

                        match MappingConfig::load(&path).await {
                            Ok(config) => {
                                info!("🔄 Mapping config reloaded ({} programs)", config.program.len());
                                if let Err(e) = tx.send(config).await {
                                    error!("Failed to deliver config update: {}", e);
                                }
                            }
                            Err(e) => {
                                warn!("Failed to reload mapping config (keeping old one): {}", e);
                            }
                        }
                    });
                }
                Err(e) => error!("Watch error: {}", e),
            }
        })
        .map_err(|e| MappingError::watch(&path, e))?;

        watcher
            .watch(Path::new(&path), RecursiveMode::NonRecursive)
            .map_err(|e| MappingError::watch(&path, e))?;

        info!("Watching mapping config: {}", path.display());

        Ok(Self {
            _watcher: watcher,
            path,
            rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next reloaded config
    ///
    /// Returns `None` once the watcher has shut down. Several quick writes
    /// may yield several configs; the last one is the current file.
    pub async fn next_config(&mut self) -> Option<MappingConfig> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_watcher_delivers_reloaded_config() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("map.yaml");

        fs::write(
            &config_path,
            "program:\n  - { name: Before, channel: 0 }\n",
        )?;

        let mut watcher = ConfigWatcher::new(&config_path)?;
        assert_eq!(watcher.path(), config_path.as_path());

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(
            &config_path,
            "program:\n  - { name: After, channel: 2 }\n",
        )?;

        let reloaded = tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await?;

        // Some platforms coalesce events; only check content when one arrived
        if let Some(config) = reloaded {
            assert_eq!(config.program.len(), 1);
            assert_eq!(config.program[0].name, "After");
            assert_eq!(config.program[0].channel, 2);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_watching_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigWatcher::new(temp_dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(MappingError::Watch { .. })));
    }
}
