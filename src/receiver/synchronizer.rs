//! Timestamp matching across the four input channels.
//!
//! Color image, depth image, and the two calibration snapshots arrive on
//! independent channels. The synchronizer keeps a bounded queue per channel
//! and emits a `Frame` whenever a tuple matches under the configured policy.
//! Messages that never find a partner age out of their queue; that eviction
//! is deliberate backpressure, not an error, and is only surfaced through a
//! counter.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::camera::{CameraIntrinsics, Frame};

use super::messages::{CameraInfo, ColorImage, DepthImage};

/// Matching policy, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// All four timestamps must be identical.
    Exact,
    /// Minimal-spread tuple within the queues; tuples whose best achievable
    /// spread exceeds the tolerance are not emitted.
    Approximate { tolerance_ns: u64 },
}

/// Default per-channel queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 5;

/// Matches message tuples across the four channels and assembles frames.
///
/// Owned by a single ingest thread; no internal locking.
pub struct FrameSynchronizer {
    policy: SyncPolicy,
    queue_size: usize,
    color: VecDeque<ColorImage>,
    depth: VecDeque<DepthImage>,
    color_info: VecDeque<CameraInfo>,
    depth_info: VecDeque<CameraInfo>,
    color_intrinsics: CameraIntrinsics,
    depth_intrinsics: CameraIntrinsics,
    dropped: u64,
}

impl FrameSynchronizer {
    pub fn new(policy: SyncPolicy, queue_size: usize) -> Self {
        let queue_size = queue_size.max(1);
        Self {
            policy,
            queue_size,
            color: VecDeque::with_capacity(queue_size),
            depth: VecDeque::with_capacity(queue_size),
            color_info: VecDeque::with_capacity(queue_size),
            depth_info: VecDeque::with_capacity(queue_size),
            color_intrinsics: CameraIntrinsics::default(),
            depth_intrinsics: CameraIntrinsics::default(),
            dropped: 0,
        }
    }

    /// Messages discarded without contributing to a frame: queue evictions,
    /// stale entries drained by a match, and invalid tuples.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped
    }

    /// Intrinsics from the most recent matched tuple.
    pub fn color_intrinsics(&self) -> CameraIntrinsics {
        self.color_intrinsics
    }

    pub fn depth_intrinsics(&self) -> CameraIntrinsics {
        self.depth_intrinsics
    }

    pub fn push_color(&mut self, msg: ColorImage) -> Option<Frame> {
        if self.color.len() == self.queue_size {
            self.color.pop_front();
            self.dropped += 1;
        }
        self.color.push_back(msg);
        self.try_match()
    }

    pub fn push_depth(&mut self, msg: DepthImage) -> Option<Frame> {
        if self.depth.len() == self.queue_size {
            self.depth.pop_front();
            self.dropped += 1;
        }
        self.depth.push_back(msg);
        self.try_match()
    }

    pub fn push_color_info(&mut self, msg: CameraInfo) -> Option<Frame> {
        if self.color_info.len() == self.queue_size {
            self.color_info.pop_front();
            self.dropped += 1;
        }
        self.color_info.push_back(msg);
        self.try_match()
    }

    pub fn push_depth_info(&mut self, msg: CameraInfo) -> Option<Frame> {
        if self.depth_info.len() == self.queue_size {
            self.depth_info.pop_front();
            self.dropped += 1;
        }
        self.depth_info.push_back(msg);
        self.try_match()
    }

    fn try_match(&mut self) -> Option<Frame> {
        let (i, j, k, l) = match self.policy {
            SyncPolicy::Exact => self.find_exact()?,
            SyncPolicy::Approximate { tolerance_ns } => self.find_approximate(tolerance_ns)?,
        };

        let color = self.color.remove(i)?;
        let depth = self.depth.remove(j)?;
        let color_info = self.color_info.remove(k)?;
        let depth_info = self.depth_info.remove(l)?;

        // Everything older than the matched entry on each channel can never
        // match a future tuple; drain it.
        self.drain_stale(color.timestamp_ns, depth.timestamp_ns, color_info.timestamp_ns, depth_info.timestamp_ns);

        if color.width != depth.width || color.height != depth.height {
            warn!(
                color_w = color.width,
                color_h = color.height,
                depth_w = depth.width,
                depth_h = depth.height,
                "dropping tuple with mismatched color/depth resolution"
            );
            self.dropped += 4;
            return None;
        }

        let color_intrinsics = CameraIntrinsics::from_k_row_major(&color_info.k);
        let depth_intrinsics = CameraIntrinsics::from_k_row_major(&depth_info.k);
        match Frame::new(
            color.timestamp_ns,
            color.width,
            color.height,
            color.data,
            depth.data,
            color_intrinsics,
            depth_intrinsics,
        ) {
            Ok(frame) => {
                // Stored intrinsics track successful matches only; a dropped
                // tuple leaves them untouched.
                self.color_intrinsics = color_intrinsics;
                self.depth_intrinsics = depth_intrinsics;
                debug!(timestamp_ns = frame.timestamp_ns, "matched tuple");
                Some(frame)
            }
            Err(err) => {
                warn!("dropping tuple: {err:#}");
                self.dropped += 4;
                None
            }
        }
    }

    fn drain_stale(&mut self, color_ts: u64, depth_ts: u64, cinfo_ts: u64, dinfo_ts: u64) {
        let before = self.color.len() + self.depth.len() + self.color_info.len() + self.depth_info.len();
        self.color.retain(|m| m.timestamp_ns > color_ts);
        self.depth.retain(|m| m.timestamp_ns > depth_ts);
        self.color_info.retain(|m| m.timestamp_ns > cinfo_ts);
        self.depth_info.retain(|m| m.timestamp_ns > dinfo_ts);
        let after = self.color.len() + self.depth.len() + self.color_info.len() + self.depth_info.len();
        self.dropped += (before - after) as u64;
    }

    fn find_exact(&self) -> Option<(usize, usize, usize, usize)> {
        for (i, c) in self.color.iter().enumerate() {
            let ts = c.timestamp_ns;
            let Some(j) = self.depth.iter().position(|m| m.timestamp_ns == ts) else {
                continue;
            };
            let Some(k) = self.color_info.iter().position(|m| m.timestamp_ns == ts) else {
                continue;
            };
            let Some(l) = self.depth_info.iter().position(|m| m.timestamp_ns == ts) else {
                continue;
            };
            return Some((i, j, k, l));
        }
        None
    }

    /// Brute-force search over the bounded queues (at most K^4 candidates)
    /// for the tuple minimizing the maximum pairwise timestamp spread.
    fn find_approximate(&self, tolerance_ns: u64) -> Option<(usize, usize, usize, usize)> {
        let mut best: Option<((usize, usize, usize, usize), u64)> = None;
        for (i, c) in self.color.iter().enumerate() {
            for (j, d) in self.depth.iter().enumerate() {
                for (k, ci) in self.color_info.iter().enumerate() {
                    for (l, di) in self.depth_info.iter().enumerate() {
                        let stamps = [
                            c.timestamp_ns,
                            d.timestamp_ns,
                            ci.timestamp_ns,
                            di.timestamp_ns,
                        ];
                        let span = stamps.iter().max().copied().unwrap_or(0)
                            - stamps.iter().min().copied().unwrap_or(0);
                        if best.map_or(true, |(_, s)| span < s) {
                            best = Some(((i, j, k, l), span));
                        }
                    }
                }
            }
        }
        let (indices, span) = best?;
        if span > tolerance_ns {
            return None;
        }
        Some(indices)
    }
}
