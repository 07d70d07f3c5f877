//! Application path management
//!
//! - **Installed mode** (default): everything lives under the user config
//!   directory, `~/.config/midi_shortcuts/` on Linux.
//! - **Dev mode** (debug builds only): if a `devices/` directory exists in
//!   the current working directory (typical with `cargo run`), device
//!   descriptions and control maps are read from the project tree.
//!
//! The defaults file always stays in the user config directory.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name under the platform config dir
const APP_DIR: &str = "midi_shortcuts";
const DEFAULTS_FILE: &str = "defaults";
const DEVICES_DIR: &str = "devices";
const CONTROL_MAPS_DIR: &str = "control_maps";

#[derive(Debug, Clone)]
pub struct AppPaths {
    /// User config directory
    pub config_dir: PathBuf,
    /// Persisted selections (`key| value` lines)
    pub defaults: PathBuf,
    /// Device description files
    pub devices_dir: PathBuf,
    /// Mapping config files
    pub control_maps_dir: PathBuf,
    /// Whether the project tree is used instead of the config directory
    pub is_dev: bool,
}

impl AppPaths {
    /// Detect the paths for this run
    ///
    /// Called before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no config directory, falling back to cwd");
                PathBuf::from(".")
            })
            .join(APP_DIR);

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join(DEVICES_DIR).is_dir() {
                eprintln!(
                    "[paths] Running in DEV mode (devices/ found in cwd: {})",
                    cwd.display()
                );
                let mut paths = Self::under(&config_dir);
                paths.devices_dir = cwd.join(DEVICES_DIR);
                paths.control_maps_dir = cwd.join(CONTROL_MAPS_DIR);
                paths.is_dev = true;
                return paths;
            }
        }

        Self::under(&config_dir)
    }

    /// Installed-mode layout rooted at `config_dir`
    pub fn under(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            defaults: config_dir.join(DEFAULTS_FILE),
            devices_dir: config_dir.join(DEVICES_DIR),
            control_maps_dir: config_dir.join(CONTROL_MAPS_DIR),
            is_dev: false,
        }
    }

    /// Create the config, devices and control map directories
    ///
    /// In installed mode an empty devices directory is seeded with the
    /// descriptions shipped next to the executable, if any.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.config_dir, &self.devices_dir, &self.control_maps_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }

        if !self.is_dev {
            self.seed_bundled_devices()?;
        }
        Ok(())
    }

    fn seed_bundled_devices(&self) -> anyhow::Result<()> {
        let has_devices = std::fs::read_dir(&self.devices_dir)?
            .filter_map(|e| e.ok())
            .any(|e| e.path().extension().is_some_and(|ext| ext == "yaml"));
        if has_devices {
            return Ok(());
        }

        let bundled = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.join(DEVICES_DIR)))
            .filter(|dir| dir.is_dir());
        let Some(bundled) = bundled else {
            return Ok(());
        };

        for entry in std::fs::read_dir(&bundled)?.filter_map(|e| e.ok()) {
            let source = entry.path();
            if source.extension().is_some_and(|ext| ext == "yaml") {
                let target = self.devices_dir.join(entry.file_name());
                info!("Installing device description {}", target.display());
                std::fs::copy(&source, &target).with_context(|| {
                    format!(
                        "Failed to copy {} to {}",
                        source.display(),
                        target.display()
                    )
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_under_config_dir() {
        let paths = AppPaths::under(Path::new("/home/u/.config/midi_shortcuts"));
        assert_eq!(
            paths.defaults,
            PathBuf::from("/home/u/.config/midi_shortcuts/defaults")
        );
        assert_eq!(
            paths.devices_dir,
            PathBuf::from("/home/u/.config/midi_shortcuts/devices")
        );
        assert!(!paths.is_dev);
    }

    #[test]
    fn test_ensure_directories_creates_layout() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let paths = AppPaths::under(&root.path().join("midi_shortcuts"));

        paths.ensure_directories()?;
        assert!(paths.config_dir.is_dir());
        assert!(paths.devices_dir.is_dir());
        assert!(paths.control_maps_dir.is_dir());

        // Idempotent
        paths.ensure_directories()?;
        Ok(())
    }
}
