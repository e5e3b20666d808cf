//! Cloud receiver: thread orchestration for the live pipeline.
//!
//! Two owned worker threads run between `start` and `shutdown`:
//!
//! - the ingest thread selects over the four transport channels, feeds the
//!   synchronizer, and publishes matched frames into the frame buffer;
//! - the reconstruction thread drains the frame buffer at its own rate and
//!   rebuilds the point cloud through the unprojection lookup tables.
//!
//! The frame buffer mutex is the only shared-mutation point between them.
//! Everything exposed to external readers (latest frame, latest cloud,
//! current lookup table) is published as an `Arc` snapshot swapped behind an
//! `RwLock`, so readers never observe a half-built cloud.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::camera::{CloudPoint, Frame, PointCloud, UnprojectionTable};

use super::config::ReceiverConfig;
use super::frame_buffer::FrameBuffer;
use super::lifecycle::{Lifecycle, LifecycleState};
use super::messages::{CameraInfo, ColorImage, DepthImage};
use super::synchronizer::FrameSynchronizer;

/// How long workers block on their channels before re-checking lifecycle.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Grace period used by the `Drop` shutdown path.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Transport-facing senders, handed out once by [`CloudReceiver::start`].
///
/// The transport collaborator pushes decoded messages here; dropping the
/// struct closes the channels, which the ingest thread treats as end of
/// stream.
pub struct TransportSenders {
    pub color: Sender<ColorImage>,
    pub depth: Sender<DepthImage>,
    pub color_info: Sender<CameraInfo>,
    pub depth_info: Sender<CameraInfo>,
}

struct TransportReceivers {
    color: Receiver<ColorImage>,
    depth: Receiver<DepthImage>,
    color_info: Receiver<CameraInfo>,
    depth_info: Receiver<CameraInfo>,
}

/// Read-only snapshots swapped in whole by the workers.
struct Snapshots {
    frame: RwLock<Option<Arc<Frame>>>,
    cloud: RwLock<Option<Arc<PointCloud>>>,
    lookup: RwLock<Option<Arc<UnprojectionTable>>>,
}

impl Snapshots {
    fn new() -> Self {
        Self {
            frame: RwLock::new(None),
            cloud: RwLock::new(None),
            lookup: RwLock::new(None),
        }
    }
}

/// An owned worker thread plus the channel it acknowledges shutdown on.
struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    done_rx: Receiver<()>,
}

/// Live RGB-D receiver: synchronizes incoming streams and keeps a point
/// cloud continuously rebuilt on a background thread.
pub struct CloudReceiver {
    config: ReceiverConfig,
    lifecycle: Arc<Lifecycle>,
    buffer: Arc<FrameBuffer>,
    snapshots: Arc<Snapshots>,
    dropped: Arc<AtomicU64>,
    workers: Vec<Worker>,
}

impl CloudReceiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            lifecycle: Arc::new(Lifecycle::new()),
            buffer: Arc::new(FrameBuffer::new()),
            snapshots: Arc::new(Snapshots::new()),
            dropped: Arc::new(AtomicU64::new(0)),
            workers: Vec::new(),
        }
    }

    /// Spawn the ingest and reconstruction threads and hand out the
    /// transport-side senders. Valid only from the Idle state.
    pub fn start(&mut self) -> Result<TransportSenders> {
        self.lifecycle.start()?;
        info!(
            policy = ?self.config.sync_policy(),
            queue_size = self.config.queue_size,
            transport = ?self.config.transport,
            rate_hz = self.config.rate_hz,
            "starting cloud receiver"
        );

        let cap = self.config.queue_size.max(1);
        let (color_tx, color_rx) = bounded(cap);
        let (depth_tx, depth_rx) = bounded(cap);
        let (cinfo_tx, cinfo_rx) = bounded(cap);
        let (dinfo_tx, dinfo_rx) = bounded(cap);

        let receivers = TransportReceivers {
            color: color_rx,
            depth: depth_rx,
            color_info: cinfo_rx,
            depth_info: dinfo_rx,
        };

        let synchronizer =
            FrameSynchronizer::new(self.config.sync_policy(), self.config.queue_size);

        let (ingest_done_tx, ingest_done_rx) = bounded(1);
        let ingest_handle = {
            let buffer = Arc::clone(&self.buffer);
            let snapshots = Arc::clone(&self.snapshots);
            let lifecycle = Arc::clone(&self.lifecycle);
            let dropped = Arc::clone(&self.dropped);
            thread::spawn(move || {
                run_ingest(synchronizer, receivers, buffer, snapshots, dropped, lifecycle);
                let _ = ingest_done_tx.send(());
            })
        };
        self.workers.push(Worker {
            name: "ingest",
            handle: ingest_handle,
            done_rx: ingest_done_rx,
        });

        let (recon_done_tx, recon_done_rx) = bounded(1);
        let recon_handle = {
            let buffer = Arc::clone(&self.buffer);
            let snapshots = Arc::clone(&self.snapshots);
            let lifecycle = Arc::clone(&self.lifecycle);
            let rate_hz = self.config.rate_hz;
            thread::spawn(move || {
                run_reconstruction(buffer, snapshots, lifecycle, rate_hz);
                let _ = recon_done_tx.send(());
            })
        };
        self.workers.push(Worker {
            name: "reconstruction",
            handle: recon_handle,
            done_rx: recon_done_rx,
        });

        Ok(TransportSenders {
            color: color_tx,
            depth: depth_tx,
            color_info: cinfo_tx,
            depth_info: dinfo_tx,
        })
    }

    /// Signal the workers to stop and wait for each to acknowledge within
    /// the grace period.
    ///
    /// Workers that miss the grace period are abandoned and reported in the
    /// returned error; the receiver still ends up in the Stopped state.
    pub fn shutdown(&mut self, grace: Duration) -> Result<()> {
        match self.lifecycle.state() {
            LifecycleState::Running => self.lifecycle.request_stop()?,
            LifecycleState::Stopped => return Ok(()),
            LifecycleState::Idle | LifecycleState::Stopping => {}
        }

        let mut stragglers = Vec::new();
        for worker in self.workers.drain(..) {
            match worker.done_rx.recv_timeout(grace) {
                Ok(()) => {
                    let _ = worker.handle.join();
                    debug!(worker = worker.name, "worker joined");
                }
                Err(_) => {
                    warn!(worker = worker.name, ?grace, "worker missed shutdown grace");
                    stragglers.push(worker.name);
                }
            }
        }

        self.lifecycle.mark_stopped();
        if !stragglers.is_empty() {
            bail!(
                "workers did not stop within {:?}: {}",
                grace,
                stragglers.join(", ")
            );
        }
        info!("cloud receiver stopped");
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Latest synchronized frame (color and depth from one publish), if any
    /// tuple has matched yet. Point-in-time snapshot; never blocks workers.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.snapshots.frame.read().clone()
    }

    /// Latest fully rebuilt point cloud. Snapshot semantics: the returned
    /// cloud is immutable and unaffected by rebuilds that follow.
    pub fn latest_cloud(&self) -> Option<Arc<PointCloud>> {
        self.snapshots.cloud.read().clone()
    }

    /// Unprojection table currently in use by the reconstruction loop.
    pub fn lookup_table(&self) -> Option<Arc<UnprojectionTable>> {
        self.snapshots.lookup.read().clone()
    }

    /// Messages discarded by synchronizer backpressure so far.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for CloudReceiver {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown(DEFAULT_SHUTDOWN_GRACE) {
            warn!("shutdown on drop incomplete: {err:#}");
        }
    }
}

fn run_ingest(
    mut synchronizer: FrameSynchronizer,
    rx: TransportReceivers,
    buffer: Arc<FrameBuffer>,
    snapshots: Arc<Snapshots>,
    dropped: Arc<AtomicU64>,
    lifecycle: Arc<Lifecycle>,
) {
    let mut open = [true; 4];
    while lifecycle.should_run() {
        let matched = select! {
            recv(rx.color) -> msg => match msg {
                Ok(m) => synchronizer.push_color(m),
                Err(_) => { open[0] = false; None }
            },
            recv(rx.depth) -> msg => match msg {
                Ok(m) => synchronizer.push_depth(m),
                Err(_) => { open[1] = false; None }
            },
            recv(rx.color_info) -> msg => match msg {
                Ok(m) => synchronizer.push_color_info(m),
                Err(_) => { open[2] = false; None }
            },
            recv(rx.depth_info) -> msg => match msg {
                Ok(m) => synchronizer.push_depth_info(m),
                Err(_) => { open[3] = false; None }
            },
            default(POLL_INTERVAL) => None,
        };

        dropped.store(synchronizer.dropped_messages(), Ordering::Relaxed);

        if let Some(frame) = matched {
            let frame = Arc::new(frame);
            *snapshots.frame.write() = Some(Arc::clone(&frame));
            buffer.publish(frame);
        }

        if open.iter().all(|&o| !o) {
            info!("all transport channels closed, ingest exiting");
            break;
        }

        // A closed channel makes select return immediately; back off so the
        // remaining open channels are not polled in a hot loop.
        if open.iter().any(|&o| !o) {
            thread::sleep(Duration::from_millis(1));
        }
    }
    debug!("ingest thread stopped");
}

fn run_reconstruction(
    buffer: Arc<FrameBuffer>,
    snapshots: Arc<Snapshots>,
    lifecycle: Arc<Lifecycle>,
    rate_hz: f64,
) {
    let period = Duration::from_secs_f64(1.0 / rate_hz.max(0.001));
    let mut table: Option<Arc<UnprojectionTable>> = None;

    while lifecycle.should_run() {
        let cycle_start = Instant::now();
        let (frame, was_dirty) = buffer.consume();

        if was_dirty && !frame.is_empty() {
            let stale = table.as_ref().map_or(true, |t| {
                !t.matches(&frame.color_intrinsics, frame.width, frame.height)
            });
            if stale {
                let built = Arc::new(UnprojectionTable::build(
                    &frame.color_intrinsics,
                    frame.width,
                    frame.height,
                ));
                debug!(
                    width = frame.width,
                    height = frame.height,
                    "rebuilt unprojection table"
                );
                *snapshots.lookup.write() = Some(Arc::clone(&built));
                table = Some(built);
            }
            if let Some(table) = &table {
                let cloud = Arc::new(build_cloud(&frame, table));
                *snapshots.cloud.write() = Some(cloud);
            }
        }

        // Sleep out the rest of the cycle in short chunks so a stop request
        // is picked up promptly even at low rates.
        let deadline = cycle_start + period;
        while lifecycle.should_run() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }
    debug!("reconstruction thread stopped");
}

/// Rebuild the structured point cloud for one frame.
///
/// The table must have been built for the frame's resolution; passing a
/// table for a different resolution is a contract violation and panics.
///
/// Zero raw depth is a valid sentinel for a failed measurement: the entry
/// gets NaN coordinates and alpha 0. Every nonzero depth passes through
/// unmodified; there is no range clamp on this path. Each pixel writes a
/// disjoint output slot from read-only inputs, so rows could be processed in
/// parallel without synchronization.
pub fn build_cloud(frame: &Frame, table: &UnprojectionTable) -> PointCloud {
    debug_assert_eq!(table.width(), frame.width, "lookup table resolution mismatch");
    debug_assert_eq!(table.height(), frame.height, "lookup table resolution mismatch");
    let mut points = Vec::with_capacity(frame.width * frame.height);
    for row in 0..frame.height {
        let lookup_y = table.lookup_y[row];
        let depth_row = &frame.depth[row * frame.width..(row + 1) * frame.width];
        let color_row = &frame.color[row * frame.width * 3..(row + 1) * frame.width * 3];
        for col in 0..frame.width {
            let d_mm = depth_row[col];
            if d_mm == 0 {
                points.push(CloudPoint::invalid());
                continue;
            }
            let depth_m = f32::from(d_mm) / 1000.0;
            let rgb = &color_row[col * 3..col * 3 + 3];
            points.push(CloudPoint {
                x: table.lookup_x[col] * depth_m,
                y: lookup_y * depth_m,
                z: depth_m,
                r: rgb[0],
                g: rgb[1],
                b: rgb[2],
                a: 255,
            });
        }
    }
    PointCloud {
        width: frame.width,
        height: frame.height,
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::camera::CameraIntrinsics;
    use crate::receiver::config::PolicyKind;

    fn test_intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0)
    }

    fn test_frame(width: usize, height: usize, depths: &[u16]) -> Frame {
        assert_eq!(depths.len(), width * height);
        let color: Vec<u8> = (0..width * height * 3).map(|i| (i % 256) as u8).collect();
        Frame::new(
            0,
            width,
            height,
            color,
            depths.to_vec(),
            test_intrinsics(),
            test_intrinsics(),
        )
        .unwrap()
    }

    #[test]
    fn zero_depth_pixels_become_nan_sentinels() {
        let frame = test_frame(3, 2, &[0, 500, 0, 1000, 0, 1500]);
        let table = UnprojectionTable::build(&test_intrinsics(), 3, 2);
        let cloud = build_cloud(&frame, &table);

        assert_eq!(cloud.width, 3);
        assert_eq!(cloud.height, 2);
        for (i, &d) in frame.depth.iter().enumerate() {
            let p = &cloud.points[i];
            if d == 0 {
                assert!(p.x.is_nan() && p.y.is_nan() && p.z.is_nan());
                assert_eq!(p.a, 0);
            } else {
                assert!(p.is_valid());
            }
        }
    }

    #[test]
    fn valid_pixels_unproject_through_the_lookup_tables() {
        let width = 4;
        let height = 3;
        let depths: Vec<u16> = (0..width * height).map(|i| (i as u16 + 1) * 250).collect();
        let frame = test_frame(width, height, &depths);
        let table = UnprojectionTable::build(&test_intrinsics(), width, height);
        let cloud = build_cloud(&frame, &table);

        for row in 0..height {
            for col in 0..width {
                let d_mm = frame.depth[row * width + col];
                let depth_m = f32::from(d_mm) / 1000.0;
                let p = cloud.get(row, col).unwrap();
                assert_relative_eq!(p.x, table.lookup_x[col] * depth_m, max_relative = 1e-5);
                assert_relative_eq!(p.y, table.lookup_y[row] * depth_m, max_relative = 1e-5);
                assert_relative_eq!(p.z, depth_m, max_relative = 1e-5);
                assert_eq!(p.a, 255);
            }
        }
    }

    #[test]
    fn colors_copy_in_buffer_channel_order() {
        let mut frame = test_frame(2, 1, &[1000, 1000]);
        frame.color = vec![10, 20, 30, 40, 50, 60];
        let table = UnprojectionTable::build(&test_intrinsics(), 2, 1);
        let cloud = build_cloud(&frame, &table);

        let p = cloud.get(0, 1).unwrap();
        assert_eq!((p.r, p.g, p.b), (40, 50, 60));
    }

    #[test]
    fn live_path_passes_far_depths_through_unclamped() {
        // 2500 mm is beyond the offline loader's 2 m cutoff but must survive
        // the live path untouched.
        let frame = test_frame(1, 1, &[2500]);
        let table = UnprojectionTable::build(&test_intrinsics(), 1, 1);
        let cloud = build_cloud(&frame, &table);
        assert_relative_eq!(cloud.points[0].z, 2.5, max_relative = 1e-6);
        assert!(cloud.points[0].is_valid());
    }

    fn fast_exact_config() -> ReceiverConfig {
        ReceiverConfig {
            policy: PolicyKind::Exact,
            rate_hz: 200.0,
            ..ReceiverConfig::default()
        }
    }

    #[test]
    fn end_to_end_match_publishes_frame_and_cloud() {
        let mut receiver = CloudReceiver::new(fast_exact_config());
        let senders = receiver.start().unwrap();

        let k = [500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0];
        senders
            .color
            .send(ColorImage {
                timestamp_ns: 42,
                width: 2,
                height: 2,
                data: vec![9; 12],
            })
            .unwrap();
        senders
            .depth
            .send(DepthImage {
                timestamp_ns: 42,
                width: 2,
                height: 2,
                data: vec![0, 800, 800, 0],
            })
            .unwrap();
        senders
            .color_info
            .send(CameraInfo {
                timestamp_ns: 42,
                k,
            })
            .unwrap();
        senders
            .depth_info
            .send(CameraInfo {
                timestamp_ns: 42,
                k,
            })
            .unwrap();

        let mut cloud = None;
        for _ in 0..200 {
            if let Some(c) = receiver.latest_cloud() {
                cloud = Some(c);
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let cloud = cloud.expect("cloud should appear after a matched tuple");
        assert_eq!((cloud.width, cloud.height), (2, 2));
        assert!(!cloud.points[0].is_valid());
        assert_relative_eq!(cloud.points[1].z, 0.8, max_relative = 1e-6);

        let frame = receiver.latest_frame().expect("frame snapshot");
        assert_eq!(frame.timestamp_ns, 42);
        let table = receiver.lookup_table().expect("lookup snapshot");
        assert_eq!(table.width(), 2);

        receiver.shutdown(Duration::from_secs(5)).unwrap();
        assert_eq!(receiver.state(), LifecycleState::Stopped);
    }

    #[test]
    #[should_panic(expected = "lookup table resolution mismatch")]
    fn build_cloud_rejects_a_table_for_another_resolution() {
        let frame = test_frame(4, 3, &[100; 12]);
        let table = UnprojectionTable::build(&test_intrinsics(), 2, 2);
        build_cloud(&frame, &table);
    }

    #[test]
    fn reconstruction_holds_the_configured_rate_under_fast_input() {
        // 2 Hz reconstruction fed at ~100 Hz: the loop must rebuild at its
        // own cadence, not once per arriving frame.
        let mut receiver = CloudReceiver::new(ReceiverConfig {
            policy: PolicyKind::Exact,
            rate_hz: 2.0,
            ..ReceiverConfig::default()
        });
        let senders = receiver.start().unwrap();
        let k = [500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0];

        let start = Instant::now();
        let mut timestamp_ns = 0u64;
        let mut rebuilds = 0usize;
        let mut last: Option<Arc<PointCloud>> = None;
        while start.elapsed() < Duration::from_millis(1500) {
            timestamp_ns += 1;
            senders
                .color
                .send(ColorImage {
                    timestamp_ns,
                    width: 2,
                    height: 2,
                    data: vec![0; 12],
                })
                .unwrap();
            senders
                .depth
                .send(DepthImage {
                    timestamp_ns,
                    width: 2,
                    height: 2,
                    data: vec![1000; 4],
                })
                .unwrap();
            senders
                .color_info
                .send(CameraInfo { timestamp_ns, k })
                .unwrap();
            senders
                .depth_info
                .send(CameraInfo { timestamp_ns, k })
                .unwrap();

            if let Some(cloud) = receiver.latest_cloud() {
                if last.as_ref().map_or(true, |prev| !Arc::ptr_eq(prev, &cloud)) {
                    rebuilds += 1;
                    last = Some(cloud);
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
        receiver.shutdown(Duration::from_secs(5)).unwrap();

        // At 2 Hz a 1.5 s window fits three cycles; leave headroom for the
        // first immediate rebuild and scheduling jitter.
        assert!(rebuilds <= 4, "expected at most 4 rebuilds at 2 Hz, got {rebuilds}");
        assert!(rebuilds >= 1, "expected at least one rebuild");
    }

    #[test]
    fn shutdown_joins_within_grace_and_is_idempotent() {
        let mut receiver = CloudReceiver::new(fast_exact_config());
        let _senders = receiver.start().unwrap();
        receiver.shutdown(Duration::from_secs(5)).unwrap();
        assert_eq!(receiver.state(), LifecycleState::Stopped);
        // Second call is a no-op.
        receiver.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut receiver = CloudReceiver::new(fast_exact_config());
        let _senders = receiver.start().unwrap();
        assert!(receiver.start().is_err());
        receiver.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn shutdown_before_start_goes_to_stopped() {
        let mut receiver = CloudReceiver::new(fast_exact_config());
        receiver.shutdown(Duration::from_millis(100)).unwrap();
        assert_eq!(receiver.state(), LifecycleState::Stopped);
        assert!(receiver.start().is_err());
    }
}
