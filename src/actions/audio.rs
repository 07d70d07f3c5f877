//! Audio actions: sink volume and mute
//!
//! The actions only translate controller values; the actual audio system
//! sits behind `AudioBackend`. `PactlBackend` talks to PulseAudio (or
//! PipeWire's pulse shim) through the `pactl` command line tool.

use crate::actions::Action;
use crate::error::{MappingError, Result};
use crate::midi::MAX_VALUE;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Registry key of the volume action
pub const VOLUME_ACTION: &str = "pulse_volume";
/// Registry key of the mute action
pub const MUTE_ACTION: &str = "pulse_mute";

/// Controller value meaning "mute on"
pub const MUTE_ON_VALUE: u8 = MAX_VALUE;
/// Controller value meaning "mute off"
pub const MUTE_OFF_VALUE: u8 = 0;

/// Target of the audio actions
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Set the sink volume on all channels, `fraction` in [0.0, 1.0]
    async fn set_volume(&self, fraction: f64) -> Result<()>;

    /// Mute or unmute the sink
    async fn set_mute(&self, muted: bool) -> Result<()>;
}

/// Map a 7-bit controller value linearly onto [0.0, 1.0]
pub fn value_to_fraction(value: u8) -> f64 {
    f64::from(value.min(MAX_VALUE)) / f64::from(MAX_VALUE)
}

/// Sets the sink volume from a slider or dial
pub struct VolumeAction {
    backend: Arc<dyn AudioBackend>,
}

impl VolumeAction {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for VolumeAction {
    fn key(&self) -> &str {
        VOLUME_ACTION
    }

    async fn execute(&self, value: u8) -> Result<()> {
        let fraction = value_to_fraction(value);
        trace!("Volume {} → {:.3}", value, fraction);
        self.backend.set_volume(fraction).await
    }
}

/// Mutes on 127, unmutes on 0, ignores everything in between
///
/// Continuous controls bound to mute therefore only act at their end stops.
pub struct MuteAction {
    backend: Arc<dyn AudioBackend>,
}

impl MuteAction {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for MuteAction {
    fn key(&self) -> &str {
        MUTE_ACTION
    }

    async fn execute(&self, value: u8) -> Result<()> {
        match value {
            MUTE_ON_VALUE => self.backend.set_mute(true).await,
            MUTE_OFF_VALUE => self.backend.set_mute(false).await,
            _ => {
                trace!("Mute ignores intermediate value {}", value);
                Ok(())
            }
        }
    }
}

/// Drives one sink through `pactl`
#[derive(Debug, Clone)]
pub struct PactlBackend {
    sink: String,
}

impl PactlBackend {
    /// Backend for a named sink; `@DEFAULT_SINK@` targets the default one
    pub fn new(sink: impl Into<String>) -> Self {
        Self { sink: sink.into() }
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    async fn pactl(&self, action: &str, args: &[&str]) -> Result<()> {
        debug!("pactl {}", args.join(" "));

        let output = Command::new("pactl")
            .args(args)
            .output()
            .await
            .map_err(|e| MappingError::action(action, format!("failed to run pactl: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MappingError::action(
                action,
                format!(
                    "pactl exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }
}

#[async_trait]
impl AudioBackend for PactlBackend {
    async fn set_volume(&self, fraction: f64) -> Result<()> {
        let percent = format!("{}%", (fraction.clamp(0.0, 1.0) * 100.0).round() as u32);
        self.pactl(VOLUME_ACTION, &["set-sink-volume", &self.sink, &percent])
            .await
    }

    async fn set_mute(&self, muted: bool) -> Result<()> {
        let flag = if muted { "1" } else { "0" };
        self.pactl(MUTE_ACTION, &["set-sink-mute", &self.sink, flag])
            .await
    }
}

/// Values set but not yet applied by the worker
#[derive(Debug, Default)]
struct Pending {
    volume: Option<f64>,
    muted: Option<bool>,
}

/// Applies audio changes on a worker task, keeping only the latest value
///
/// `set_volume` and `set_mute` return as soon as the value is stored, so a
/// slow backend never holds up the dispatch tick. A burst of slider moves
/// collapses into the most recent position. Failures are logged by the
/// worker.
pub struct BackgroundBackend {
    pending: Arc<Mutex<Pending>>,
    wake: mpsc::Sender<()>,
}

impl BackgroundBackend {
    /// Start the worker for `inner`
    ///
    /// Must be called from within a tokio runtime. The worker stops once
    /// this handle is dropped.
    pub fn spawn(inner: Arc<dyn AudioBackend>) -> Self {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let (wake, mut rx) = mpsc::channel::<()>(1);

        let worker_pending = pending.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let Pending { volume, muted } = std::mem::take(&mut *worker_pending.lock());

                if let Some(fraction) = volume {
                    if let Err(e) = inner.set_volume(fraction).await {
                        warn!("{}", e);
                    }
                }
                if let Some(muted) = muted {
                    if let Err(e) = inner.set_mute(muted).await {
                        warn!("{}", e);
                    }
                }
            }
            debug!("Audio worker stopped");
        });

        Self { pending, wake }
    }

    fn notify(&self, action: &str) -> Result<()> {
        match self.wake.try_send(()) {
            // Full: the worker has a wakeup queued and will see the new value
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => {
                Err(MappingError::action(action, "audio worker stopped"))
            }
        }
    }
}

#[async_trait]
impl AudioBackend for BackgroundBackend {
    async fn set_volume(&self, fraction: f64) -> Result<()> {
        self.pending.lock().volume = Some(fraction);
        self.notify(VOLUME_ACTION)
    }

    async fn set_mute(&self, muted: bool) -> Result<()> {
        self.pending.lock().muted = Some(muted);
        self.notify(MUTE_ACTION)
    }
}

/// Last state applied to a `MemoryBackend`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioState {
    pub volume: Option<f64>,
    pub muted: Option<bool>,
    /// Number of calls that reached the backend
    pub calls: u64,
}

/// In-memory backend for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<AudioState>,
}

impl MemoryBackend {
    pub fn state(&self) -> AudioState {
        *self.state.lock()
    }
}

#[async_trait]
impl AudioBackend for MemoryBackend {
    async fn set_volume(&self, fraction: f64) -> Result<()> {
        let mut state = self.state.lock();
        state.volume = Some(fraction);
        state.calls += 1;
        debug!("[dry-run] volume → {:.0}%", fraction * 100.0);
        Ok(())
    }

    async fn set_mute(&self, muted: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.muted = Some(muted);
        state.calls += 1;
        debug!("[dry-run] mute → {}", muted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_fraction_endpoints() {
        assert_eq!(value_to_fraction(0), 0.0);
        assert!((value_to_fraction(127) - 1.0).abs() < f64::EPSILON);
        assert!((value_to_fraction(64) - 64.0 / 127.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_volume_action_scales_linearly() {
        let backend = Arc::new(MemoryBackend::default());
        let action = VolumeAction::new(backend.clone());

        action.execute(0).await.unwrap();
        assert_eq!(backend.state().volume, Some(0.0));

        action.execute(127).await.unwrap();
        let volume = backend.state().volume.unwrap();
        assert!((volume - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mute_action_end_stops() {
        let backend = Arc::new(MemoryBackend::default());
        let action = MuteAction::new(backend.clone());

        action.execute(127).await.unwrap();
        assert_eq!(backend.state().muted, Some(true));

        // Mid-range is ignored
        action.execute(64).await.unwrap();
        assert_eq!(backend.state().muted, Some(true));
        assert_eq!(backend.state().calls, 1);

        action.execute(0).await.unwrap();
        assert_eq!(backend.state().muted, Some(false));

        action.execute(1).await.unwrap();
        action.execute(126).await.unwrap();
        assert_eq!(backend.state().muted, Some(false));
        assert_eq!(backend.state().calls, 2);
    }

    /// Backend that takes a while per call, like a `pactl` subprocess
    #[derive(Default)]
    struct SlowBackend {
        inner: MemoryBackend,
    }

    #[async_trait]
    impl AudioBackend for SlowBackend {
        async fn set_volume(&self, fraction: f64) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inner.set_volume(fraction).await
        }

        async fn set_mute(&self, muted: bool) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inner.set_mute(muted).await
        }
    }

    #[tokio::test]
    async fn test_background_backend_does_not_wait_for_slow_backend() {
        let slow = Arc::new(SlowBackend::default());
        let backend = BackgroundBackend::spawn(slow.clone());
        let action = VolumeAction::new(Arc::new(backend));

        let started = std::time::Instant::now();
        for value in 0..=100u8 {
            action.execute(value).await.unwrap();
        }
        assert!(started.elapsed() < std::time::Duration::from_millis(500));

        let settled = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while slow.inner.state().volume != Some(value_to_fraction(100)) {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(settled.is_ok(), "last volume never reached the backend");
        assert!(slow.inner.state().calls < 101);
    }

    #[tokio::test]
    async fn test_background_backend_applies_mute() {
        let memory = Arc::new(MemoryBackend::default());
        let backend = BackgroundBackend::spawn(memory.clone());
        backend.set_mute(true).await.unwrap();

        let settled = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while memory.state().muted != Some(true) {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(settled.is_ok());
    }

    #[tokio::test]
    async fn test_pactl_missing_binary_is_action_error() {
        // Spawning fails when pactl is absent; a present pactl with a bogus
        // sink exits non-zero. Either way the error is ActionExecution.
        let backend = PactlBackend::new("no-such-sink-for-tests");
        if let Err(err) = backend.set_mute(false).await {
            assert!(matches!(err, MappingError::ActionExecution { .. }));
        }
    }
}
