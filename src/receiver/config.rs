//! Receiver configuration, loadable from YAML.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::synchronizer::{SyncPolicy, DEFAULT_QUEUE_SIZE};

/// Which matching policy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Exact,
    Approximate,
}

/// Transport hint passed through to the collaborator that delivers frames.
/// Opaque to this crate; it only shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportHint {
    Raw,
    Compressed,
}

/// Configuration for a [`CloudReceiver`](super::CloudReceiver).
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    pub policy: PolicyKind,

    /// Maximum timestamp spread accepted by the approximate policy.
    #[serde(default = "default_tolerance_ns")]
    pub tolerance_ns: u64,

    /// Per-channel queue capacity of the synchronizer.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    #[serde(default = "default_transport")]
    pub transport: TransportHint,

    /// Target reconstruction rate in Hz.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
}

fn default_tolerance_ns() -> u64 {
    20_000_000 // 20 ms, roughly two thirds of a frame period at 30 Hz
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_transport() -> TransportHint {
    TransportHint::Raw
}

fn default_rate_hz() -> f64 {
    15.0
}

impl ReceiverConfig {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse receiver config {}", path.display()))
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        match self.policy {
            PolicyKind::Exact => SyncPolicy::Exact,
            PolicyKind::Approximate => SyncPolicy::Approximate {
                tolerance_ns: self.tolerance_ns,
            },
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Approximate,
            tolerance_ns: default_tolerance_ns(),
            queue_size: default_queue_size(),
            transport: default_transport(),
            rate_hz: default_rate_hz(),
        }
    }
}
