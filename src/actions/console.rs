//! Console action - logs every invocation for dry runs and debugging

use crate::actions::Action;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Default registry key of the console action
pub const CONSOLE_ACTION: &str = "console";

/// Logs the received value instead of touching the desktop
///
/// Useful for checking a mapping without real audio hardware.
pub struct ConsoleAction {
    key: String,
    /// Execution counter for debugging
    execution_count: AtomicU64,
}

impl ConsoleAction {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            execution_count: AtomicU64::new(0),
        }
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Action for ConsoleAction {
    fn key(&self) -> &str {
        &self.key
    }

    async fn execute(&self, value: u8) -> Result<()> {
        let exec_num = self.execution_count.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            "🎮 [{}] Action '{}' → value {} [exec #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.key,
            value,
            exec_num
        );

        debug!(
            action = %self.key,
            value = value,
            exec_count = exec_num,
            "ConsoleAction execution"
        );

        Ok(())
    }
}
