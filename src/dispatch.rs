//! Dispatch loop - turns pending controller events into action calls
//!
//! The loop is a small state machine (`Idle` → `Listening` ⇄ `Stopped`)
//! driven by repeated calls to [`DispatchLoop::tick`]. Each tick drains
//! whatever the transport has queued, resolves every event through the
//! program table and runs the bound action, then hands control back to
//! the host. The host decides how to wait before the next tick (a tokio
//! interval, a GUI timer, ...); [`TICK_INTERVAL`] is the suggested delay.

use crate::actions::ActionRegistry;
use crate::control::ControlId;
use crate::error::{MappingError, Result};
use crate::midi::ControlEvent;
use crate::programs::ProgramTable;
use crate::transport::{MessageSource, TransportOpener};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Delay the host should leave between two ticks
pub const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Minimum delay between two attempts to open an unavailable transport
pub const DEFAULT_REOPEN_DELAY: Duration = Duration::from_secs(1);

/// Lifecycle of the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Never started, no transport
    Idle,
    /// Transport open (or waiting to be reopened), draining every tick
    Listening,
    /// Stopped by the user; transport closed
    Stopped,
}

/// What the host should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Call `tick` again after the tick interval
    Reschedule,
    /// The loop is not listening; stop scheduling
    Halt,
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub ticks: u64,
    /// Events resolved and executed (including null actions)
    pub dispatched: u64,
    /// Actions that returned an error
    pub failures: u64,
    /// Transports opened
    pub opens: u64,
    /// Transports closed
    pub closes: u64,
}

/// Drains controller events and runs the bound actions
pub struct DispatchLoop<O: TransportOpener> {
    opener: O,
    /// Device identifier chosen by the host
    selected: Option<String>,
    /// Open transport, remembering the identifier it was opened with
    source: Option<O::Source>,
    programs: Arc<ProgramTable>,
    registry: Arc<ActionRegistry>,
    state: LoopState,
    /// Channel of the last dispatched event
    current_program: Option<u8>,
    reopen_delay: Duration,
    next_open_attempt: Option<Instant>,
    stats: DispatchStats,
}

impl<O: TransportOpener> DispatchLoop<O> {
    pub fn new(opener: O, registry: Arc<ActionRegistry>) -> Self {
        Self {
            opener,
            selected: None,
            source: None,
            programs: Arc::new(ProgramTable::default()),
            registry,
            state: LoopState::Idle,
            current_program: None,
            reopen_delay: DEFAULT_REOPEN_DELAY,
            next_open_attempt: None,
            stats: DispatchStats::default(),
        }
    }

    /// Override the delay between attempts to open a missing transport
    pub fn with_reopen_delay(mut self, delay: Duration) -> Self {
        self.reopen_delay = delay;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == LoopState::Listening
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Identifier of the currently open transport, if any
    pub fn open_device(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.device_id())
    }

    pub fn current_program(&self) -> Option<u8> {
        self.current_program
    }

    pub fn programs(&self) -> &Arc<ProgramTable> {
        &self.programs
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Switch device and program table together
    ///
    /// Events already queued on the old transport are dispatched through the
    /// table they were sent against, then the old transport is closed. The
    /// new one opens on the next tick.
    pub async fn switch_device(
        &mut self,
        device_id: impl Into<String>,
        programs: impl Into<Arc<ProgramTable>>,
    ) {
        let device_id = device_id.into();
        for event in self.retire_stale_source(&device_id) {
            self.dispatch(event).await;
        }
        self.replace_programs(programs);
        self.select_device(device_id);
    }

    /// Choose the device to listen on
    ///
    /// A running loop notices the change on its next tick and swaps the
    /// transport before processing further events.
    pub fn select_device(&mut self, device_id: impl Into<String>) {
        let device_id = device_id.into();
        if self.selected.as_deref() != Some(device_id.as_str()) {
            info!("Selected MIDI device '{}'", device_id);
            self.selected = Some(device_id);
            self.next_open_attempt = None;
        }
    }

    /// Swap in a freshly built program table
    ///
    /// The table is replaced as a whole; the next tick sees only the new one.
    pub fn replace_programs(&mut self, programs: impl Into<Arc<ProgramTable>>) {
        self.programs = programs.into();
        debug!("Program table replaced ({} programs)", self.programs.len());
    }

    /// Start (or restart) listening on the selected device
    ///
    /// If the transport cannot be opened the loop still enters `Listening`
    /// and keeps retrying on later ticks; the error is returned so the host
    /// can tell the user.
    pub fn start(&mut self) -> Result<()> {
        if self.state == LoopState::Listening {
            debug!("Dispatch loop already listening");
            return Ok(());
        }

        info!("▶️  Dispatch loop starting");
        self.state = LoopState::Listening;
        self.next_open_attempt = None;

        let device_id = self
            .selected
            .clone()
            .ok_or_else(|| MappingError::transport("(none)", "no device selected"))?;
        self.ensure_transport(&device_id)
    }

    /// Stop listening and close the transport
    ///
    /// A tick already in progress completes; the next one returns `Halt`.
    pub fn stop(&mut self) {
        if self.state != LoopState::Listening {
            return;
        }
        self.close_transport();
        self.state = LoopState::Stopped;
        info!("⏹️  Dispatch loop stopped");
    }

    /// Process every pending event once
    pub async fn tick(&mut self) -> TickOutcome {
        if self.state != LoopState::Listening {
            return TickOutcome::Halt;
        }
        self.stats.ticks += 1;

        let events = self.poll_transport();
        if !events.is_empty() {
            trace!("Tick {}: {} pending event(s)", self.stats.ticks, events.len());
        }
        for event in events {
            self.dispatch(event).await;
        }

        TickOutcome::Reschedule
    }

    /// Resolve and execute one event; failures are logged, never returned
    pub async fn dispatch(&mut self, event: ControlEvent) {
        self.current_program = Some(event.channel);

        let key = self
            .programs
            .resolve(event.channel, ControlId(event.control))
            .to_string();
        let action = self.registry.resolve(&key);

        debug!(
            "ch {} control {} value {} → '{}'",
            event.channel, event.control, event.value, key
        );

        match action.execute(event.value).await {
            Ok(()) => self.stats.dispatched += 1,
            Err(e) => {
                self.stats.failures += 1;
                warn!(
                    "Action '{}' failed for control {} on channel {}: {}",
                    key, event.control, event.channel, e
                );
            }
        }
    }

    /// Collect pending events, swapping the transport if the device changed
    fn poll_transport(&mut self) -> Vec<ControlEvent> {
        let Some(selected) = self.selected.clone() else {
            return Vec::new();
        };

        let mut events = self.retire_stale_source(&selected);

        if self.source.is_none() {
            let due = self
                .next_open_attempt
                .map_or(true, |at| Instant::now() >= at);
            if !due {
                return events;
            }
            if let Err(e) = self.ensure_transport(&selected) {
                trace!("Transport still unavailable: {}", e);
                return events;
            }
        }

        if let Some(source) = self.source.as_mut() {
            match source.drain_pending() {
                Ok(pending) => events.extend(pending),
                Err(e) => {
                    warn!("{}, waiting for the device to come back", e);
                    self.close_transport();
                    // Quiet retries from here on; the warning above covers them
                    self.next_open_attempt = Some(Instant::now() + self.reopen_delay);
                }
            }
        }
        events
    }

    /// Close the open transport if it is not for `selected`, returning what it still held
    fn retire_stale_source(&mut self, selected: &str) -> Vec<ControlEvent> {
        let stale = self
            .source
            .as_ref()
            .is_some_and(|source| source.device_id() != selected);
        if !stale {
            return Vec::new();
        }
        let Some(mut old) = self.source.take() else {
            return Vec::new();
        };

        // Events that arrived before the switch still belong to this session
        let events = old.drain_pending().unwrap_or_else(|e| {
            debug!("Nothing to drain from '{}': {}", old.device_id(), e);
            Vec::new()
        });
        info!(
            "Device changed from '{}' to '{}', reopening",
            old.device_id(),
            selected
        );
        old.close();
        self.stats.closes += 1;
        events
    }

    /// Open the transport for `device_id` unless it is already open
    fn ensure_transport(&mut self, device_id: &str) -> Result<()> {
        if self.open_device() == Some(device_id) {
            return Ok(());
        }
        self.close_transport();

        match self.opener.open(device_id) {
            Ok(source) => {
                self.source = Some(source);
                self.next_open_attempt = None;
                self.stats.opens += 1;
                Ok(())
            }
            Err(e) => {
                // Only the first failure in a row is worth a warning
                if self.next_open_attempt.is_none() {
                    warn!("Cannot open MIDI device '{}': {}", device_id, e);
                }
                self.next_open_attempt = Some(Instant::now() + self.reopen_delay);
                Err(e)
            }
        }
    }

    fn close_transport(&mut self) {
        if let Some(source) = self.source.take() {
            source.close();
            self.stats.closes += 1;
        }
    }
}
