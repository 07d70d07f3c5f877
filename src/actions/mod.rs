//! Desktop actions and the registry the dispatcher resolves them from
//!
//! Every action exposes a single `execute(value)` capability. The registry
//! always holds the null action under the empty key so that unbound
//! controls have something to resolve to.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod audio;
pub mod console;

pub use audio::{
    AudioBackend, AudioState, BackgroundBackend, MemoryBackend, MuteAction, PactlBackend,
    VolumeAction,
};
pub use console::ConsoleAction;

use crate::programs::NULL_ACTION;

/// A desktop side effect driven by a 7-bit controller value
///
/// Implementations use interior mutability; `execute` takes `&self` so the
/// registry can hand out shared `Arc<dyn Action>` handles.
#[async_trait]
pub trait Action: Send + Sync {
    /// Registry key this action is normally registered under
    fn key(&self) -> &str;

    /// Apply the controller value (0-127)
    ///
    /// Errors are reported as `MappingError::ActionExecution`; the dispatcher
    /// logs them and moves on.
    async fn execute(&self, value: u8) -> Result<()>;
}

/// Action bound to unmapped controls; does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAction;

#[async_trait]
impl Action for NullAction {
    fn key(&self) -> &str {
        NULL_ACTION
    }

    async fn execute(&self, _value: u8) -> Result<()> {
        Ok(())
    }
}

/// String-keyed table of executable actions
#[derive(Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
    null: Arc<dyn Action>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    /// A registry holding only the null action
    pub fn new() -> Self {
        let null: Arc<dyn Action> = Arc::new(NullAction);
        let mut actions = HashMap::new();
        actions.insert(NULL_ACTION.to_string(), null.clone());
        Self { actions, null }
    }

    /// Register an action under its own key
    pub fn with_action(mut self, action: Arc<dyn Action>) -> Self {
        let key = action.key().to_string();
        self.register(key, action);
        self
    }

    /// Register an action under `key`, replacing any previous entry
    ///
    /// The null action cannot be replaced.
    pub fn register(&mut self, key: impl Into<String>, action: Arc<dyn Action>) {
        let key = key.into();
        if key == NULL_ACTION {
            warn!("Refusing to replace the null action");
            return;
        }
        debug!("Registered action '{}'", key);
        self.actions.insert(key, action);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(key).cloned()
    }

    /// Action for `key`, falling back to the null action for unknown keys
    ///
    /// Unknown keys log at debug level only; the engine warns about them
    /// when a table is built.
    pub fn resolve(&self, key: &str) -> Arc<dyn Action> {
        match self.actions.get(key) {
            Some(action) => action.clone(),
            None => {
                debug!("No action registered for '{}', ignoring", key);
                self.null.clone()
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.actions.contains_key(key)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Builds the session registry for the desktop
pub struct DesktopControl;

impl DesktopControl {
    /// Registry with the audio actions bound to `backend`, plus the console logger
    pub fn registry(backend: Arc<dyn AudioBackend>) -> ActionRegistry {
        ActionRegistry::new()
            .with_action(Arc::new(VolumeAction::new(backend.clone())))
            .with_action(Arc::new(MuteAction::new(backend)))
            .with_action(Arc::new(ConsoleAction::new(console::CONSOLE_ACTION)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_registry_has_null_action() {
        let registry = ActionRegistry::new();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(NULL_ACTION));

        let null = registry.resolve(NULL_ACTION);
        assert_eq!(null.key(), NULL_ACTION);
        assert!(null.execute(64).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_key_resolves_to_null() {
        let registry = ActionRegistry::new();
        assert!(registry.get("pulse_volume").is_none());

        let action = registry.resolve("pulse_volume");
        assert_eq!(action.key(), NULL_ACTION);
        assert!(action.execute(127).await.is_ok());
    }

    #[test]
    fn test_null_action_cannot_be_replaced() {
        let mut registry = ActionRegistry::new();
        registry.register(NULL_ACTION, Arc::new(ConsoleAction::new("sneaky")));
        assert_eq!(registry.resolve(NULL_ACTION).key(), NULL_ACTION);
    }

    #[test]
    fn test_desktop_registry_keys() {
        let backend = Arc::new(MemoryBackend::default());
        let registry = DesktopControl::registry(backend);
        assert_eq!(
            registry.keys(),
            vec!["", "console", "pulse_mute", "pulse_volume"]
        );
    }
}
