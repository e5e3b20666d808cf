//! Synchronized color+depth frames and the structured point cloud built
//! from them.

use anyhow::{bail, Result};

use super::intrinsics::CameraIntrinsics;

/// One synchronized color+depth capture.
///
/// The color buffer is interleaved RGB8 (`width * height * 3` bytes); the
/// depth buffer holds 16-bit depths in millimeters (`width * height`
/// entries), where 0 marks an invalid measurement. Both buffers always share
/// the same resolution and always originate from the same matched tuple.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp_ns: u64,
    pub width: usize,
    pub height: usize,
    pub color: Vec<u8>,
    pub depth: Vec<u16>,
    pub color_intrinsics: CameraIntrinsics,
    pub depth_intrinsics: CameraIntrinsics,
}

impl Frame {
    /// Build a frame, validating that both buffers match the resolution.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp_ns: u64,
        width: usize,
        height: usize,
        color: Vec<u8>,
        depth: Vec<u16>,
        color_intrinsics: CameraIntrinsics,
        depth_intrinsics: CameraIntrinsics,
    ) -> Result<Self> {
        if color.len() != width * height * 3 {
            bail!(
                "color buffer has {} bytes, expected {} for {}x{} RGB8",
                color.len(),
                width * height * 3,
                width,
                height
            );
        }
        if depth.len() != width * height {
            bail!(
                "depth buffer has {} entries, expected {} for {}x{}",
                depth.len(),
                width * height,
                width,
                height
            );
        }
        Ok(Self {
            timestamp_ns,
            width,
            height,
            color,
            depth,
            color_intrinsics,
            depth_intrinsics,
        })
    }

    /// The zero-sized placeholder held by the frame buffer before the first
    /// publish.
    pub fn empty() -> Self {
        Self {
            timestamp_ns: 0,
            width: 0,
            height: 0,
            color: Vec::new(),
            depth: Vec::new(),
            color_intrinsics: CameraIntrinsics::default(),
            depth_intrinsics: CameraIntrinsics::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One entry of the structured point cloud.
///
/// Invalid measurements carry NaN coordinates and alpha 0; valid points have
/// alpha 255 and the color pixel's RGB channels.
#[derive(Debug, Clone, Copy)]
pub struct CloudPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl CloudPoint {
    /// The invalid-measurement sentinel.
    pub fn invalid() -> Self {
        Self {
            x: f32::NAN,
            y: f32::NAN,
            z: f32::NAN,
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.a != 0
    }
}

/// Structured point cloud with the same dimensions as the frame it was built
/// from, one entry per pixel in row-major order.
#[derive(Debug, Clone)]
pub struct PointCloud {
    pub width: usize,
    pub height: usize,
    pub points: Vec<CloudPoint>,
}

impl PointCloud {
    pub fn get(&self, row: usize, col: usize) -> Option<&CloudPoint> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.points.get(row * self.width + col)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
