//! Single-slot hand-off between the synchronizer callback and the
//! reconstruction loop.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::camera::Frame;

struct Slot {
    frame: Arc<Frame>,
    dirty: bool,
}

/// Mutex-guarded store for the most recent synchronized frame.
///
/// There is no queue: an unconsumed frame is overwritten by the next
/// publish. The lock is held only for the pointer swap, so a slow consumer
/// never blocks the producer for the duration of a rebuild.
pub struct FrameBuffer {
    slot: Mutex<Slot>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                frame: Arc::new(Frame::empty()),
                dirty: false,
            }),
        }
    }

    /// Replace the stored frame and mark it dirty.
    ///
    /// Replacement is atomic: a concurrent `consume` observes either the
    /// previous frame or this one, never a mix.
    pub fn publish(&self, frame: Arc<Frame>) {
        let mut slot = self.slot.lock();
        slot.frame = frame;
        slot.dirty = true;
    }

    /// Take a snapshot of the stored frame and clear the dirty flag.
    ///
    /// Returns `(frame, was_dirty)`. When `was_dirty` is false the frame is
    /// the same one returned last time, so the caller can skip recomputation.
    pub fn consume(&self) -> (Arc<Frame>, bool) {
        let mut slot = self.slot.lock();
        let was_dirty = slot.dirty;
        slot.dirty = false;
        (Arc::clone(&slot.frame), was_dirty)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::camera::CameraIntrinsics;

    /// A 2x2 frame whose color bytes and depth values all carry `tag`, so a
    /// torn publish would be detectable as disagreeing buffers.
    fn tagged_frame(tag: u16) -> Frame {
        Frame::new(
            u64::from(tag),
            2,
            2,
            vec![tag as u8; 12],
            vec![tag; 4],
            CameraIntrinsics::default(),
            CameraIntrinsics::default(),
        )
        .unwrap()
    }

    #[test]
    fn consume_without_publish_is_clean() {
        let buffer = FrameBuffer::new();
        let (frame, was_dirty) = buffer.consume();
        assert!(!was_dirty);
        assert!(frame.is_empty());

        // Still clean, still the same frame.
        let (frame2, was_dirty) = buffer.consume();
        assert!(!was_dirty);
        assert!(Arc::ptr_eq(&frame, &frame2));
    }

    #[test]
    fn publish_then_consume_returns_exactly_the_published_frame() {
        let buffer = FrameBuffer::new();
        let published = Arc::new(tagged_frame(7));
        buffer.publish(Arc::clone(&published));

        let (frame, was_dirty) = buffer.consume();
        assert!(was_dirty);
        assert!(Arc::ptr_eq(&frame, &published));

        // Dirty flag was reset.
        let (frame, was_dirty) = buffer.consume();
        assert!(!was_dirty);
        assert!(Arc::ptr_eq(&frame, &published));
    }

    #[test]
    fn publish_overwrites_unconsumed_frame() {
        let buffer = FrameBuffer::new();
        buffer.publish(Arc::new(tagged_frame(1)));
        buffer.publish(Arc::new(tagged_frame(2)));

        let (frame, was_dirty) = buffer.consume();
        assert!(was_dirty);
        assert_eq!(frame.depth[0], 2);
    }

    #[test]
    fn concurrent_publish_and_consume_never_mixes_buffers() {
        let buffer = Arc::new(FrameBuffer::new());
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for tag in 0..2000u16 {
                    buffer.publish(Arc::new(tagged_frame(tag % 251)));
                }
            })
        };

        for _ in 0..2000 {
            let (frame, _) = buffer.consume();
            if frame.is_empty() {
                continue;
            }
            let color_tag = u16::from(frame.color[0]);
            let depth_tag = frame.depth[0];
            assert_eq!(
                color_tag, depth_tag,
                "color and depth from different publishes"
            );
            assert!(frame.color.iter().all(|&b| u16::from(b) == depth_tag));
            assert!(frame.depth.iter().all(|&d| d == depth_tag));
        }

        producer.join().unwrap();
    }
}
