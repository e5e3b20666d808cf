//! Receiver lifecycle state machine.
//!
//! Both the producer path (synchronizer callback) and the background loops
//! consult this state to decide whether to keep going, replacing ad hoc
//! `running` booleans with guarded transitions.

use std::sync::atomic::{AtomicU8, Ordering};

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Idle,
            1 => LifecycleState::Running,
            2 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Atomic lifecycle shared between the owner and the worker threads.
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Idle as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Workers loop while this holds.
    pub fn should_run(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Idle -> Running.
    pub fn start(&self) -> Result<()> {
        if !self.transition(LifecycleState::Idle, LifecycleState::Running) {
            bail!("cannot start from state {:?}", self.state());
        }
        Ok(())
    }

    /// Running -> Stopping. Workers observe this and exit their loops.
    pub fn request_stop(&self) -> Result<()> {
        if !self.transition(LifecycleState::Running, LifecycleState::Stopping) {
            bail!("cannot stop from state {:?}", self.state());
        }
        Ok(())
    }

    /// Stopping -> Stopped, once the workers have been joined (or given up
    /// on). Also accepts Idle -> Stopped for receivers shut down before they
    /// ever started.
    pub fn mark_stopped(&self) {
        if !self.transition(LifecycleState::Stopping, LifecycleState::Stopped) {
            let _ = self.transition(LifecycleState::Idle, LifecycleState::Stopped);
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
