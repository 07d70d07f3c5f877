//! Persisted user selections
//!
//! A tiny line-oriented store: each setting is a `key| value` line. Comment
//! lines and anything that does not look like a setting are kept verbatim
//! so hand edits survive a save.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Key of the last selected MIDI device identifier
pub const DEVICE_KEY: &str = "midi device";
/// Key of the last selected mapping config path
pub const CONFIG_KEY: &str = "config";

const SEPARATOR: char = '|';
const HEADER: &str = "# User config file for MIDI shortcuts";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Setting { key: String, value: String },
    Verbatim(String),
}

impl Line {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('#') {
            return Line::Verbatim(trimmed.to_string());
        }
        let mut parts = trimmed.split(SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.trim().is_empty() => Line::Setting {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            },
            _ => Line::Verbatim(trimmed.to_string()),
        }
    }

    fn render(&self) -> String {
        match self {
            Line::Setting { key, value } => format!("{}{} {}", key, SEPARATOR, value),
            Line::Verbatim(text) => text.clone(),
        }
    }
}

/// The defaults file, loaded into memory
#[derive(Debug, Clone)]
pub struct DefaultsStore {
    path: PathBuf,
    lines: Vec<Line>,
}

impl DefaultsStore {
    /// Load the store, creating the file (and its directory) when missing
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, format!("{}\n", HEADER))
                .await
                .with_context(|| format!("Failed to create defaults file {}", path.display()))?;
            info!("Created defaults file: {}", path.display());
        }

        let contents = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read defaults file {}", path.display()))?;

        Ok(Self::parse(path, &contents))
    }

    /// Build a store from file contents without touching the disk
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Self {
        Self {
            path: path.into(),
            lines: contents.lines().map(Line::parse).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of the first setting named `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Setting { key: k, value } if k == key && !value.is_empty() => {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    /// Set `key`, replacing existing lines for it or appending a new one
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let mut found = false;

        for line in &mut self.lines {
            if let Line::Setting { key: k, value: v } = line {
                if k == key {
                    *v = value.clone();
                    found = true;
                }
            }
        }

        if !found {
            self.lines.push(Line::Setting {
                key: key.to_string(),
                value,
            });
        }
        debug!("Default '{}' updated", key);
    }

    /// Write the store back to its file
    pub async fn save(&self) -> Result<()> {
        let mut contents: String = self
            .lines
            .iter()
            .map(|line| line.render() + "\n")
            .collect();
        if contents.is_empty() {
            contents = format!("{}\n", HEADER);
        }

        fs::write(&self.path, contents)
            .await
            .with_context(|| format!("Failed to write defaults file {}", self.path.display()))?;
        info!("💾 Saved defaults to {}", self.path.display());
        Ok(())
    }
}
