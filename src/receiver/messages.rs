//! Messages delivered by the transport collaborator.
//!
//! The transport (driver, middleware bridge, replay tool) is a black box to
//! this crate: it hands over already-decoded image buffers and calibration
//! snapshots on independent channels, each stamped with the capture time.

/// Decoded color image, interleaved RGB8.
#[derive(Debug, Clone)]
pub struct ColorImage {
    pub timestamp_ns: u64,
    pub width: usize,
    pub height: usize,
    /// `width * height * 3` bytes, row-major, RGB order.
    pub data: Vec<u8>,
}

/// Decoded depth image, 16-bit millimeters, 0 = invalid.
#[derive(Debug, Clone)]
pub struct DepthImage {
    pub timestamp_ns: u64,
    pub width: usize,
    pub height: usize,
    /// `width * height` entries, row-major.
    pub data: Vec<u16>,
}

/// Calibration snapshot for one camera.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub timestamp_ns: u64,
    /// Row-major flattened 3x3 calibration matrix K.
    pub k: [f64; 9],
}
