//! Live RGB-D receiver: frame synchronization, buffering, and the
//! background point cloud reconstruction loop.
//!
//! This module contains the `CloudReceiver` that owns the worker threads,
//! along with the synchronizer, the single-slot frame buffer, and the
//! lifecycle state machine they coordinate through.

pub mod cloud_receiver;
pub mod config;
pub mod frame_buffer;
pub mod lifecycle;
pub mod messages;
pub mod synchronizer;

pub use cloud_receiver::{build_cloud, CloudReceiver, TransportSenders, DEFAULT_SHUTDOWN_GRACE};
pub use config::{PolicyKind, ReceiverConfig, TransportHint};
pub use frame_buffer::FrameBuffer;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use messages::{CameraInfo, ColorImage, DepthImage};
pub use synchronizer::{FrameSynchronizer, SyncPolicy};
