//! Pinhole intrinsics and per-pixel unprojection lookup tables.

use nalgebra::Matrix3;

/// Pinhole camera intrinsics.
///
/// Only the focal lengths and principal point are carried; distortion is
/// handled upstream by the driver before images reach this crate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Extract intrinsics from a 3x3 calibration matrix K.
    pub fn from_k(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    /// Extract intrinsics from a row-major flattened K, as delivered in
    /// camera info messages.
    pub fn from_k_row_major(k: &[f64; 9]) -> Self {
        Self {
            fx: k[0],
            fy: k[4],
            cx: k[2],
            cy: k[5],
        }
    }
}

/// Precomputed per-column and per-row unprojection scale factors.
///
/// `lookup_x[c] = (c - cx) / fx` and `lookup_y[r] = (r - cy) / fy`, so the
/// camera-space coordinates of pixel `(r, c)` at depth `z` meters are
/// `(lookup_x[c] * z, lookup_y[r] * z, z)`.
///
/// A table is valid only for the intrinsics/resolution pair it was built
/// with. There is no runtime staleness check: callers are responsible for
/// rebuilding when either changes, otherwise the geometry is silently wrong.
#[derive(Debug, Clone)]
pub struct UnprojectionTable {
    pub lookup_x: Vec<f32>,
    pub lookup_y: Vec<f32>,
    width: usize,
    height: usize,
    intrinsics: CameraIntrinsics,
}

impl UnprojectionTable {
    /// Build the lookup tables for the given intrinsics and resolution.
    /// O(width + height).
    pub fn build(intrinsics: &CameraIntrinsics, width: usize, height: usize) -> Self {
        let lookup_x = (0..width)
            .map(|c| ((c as f64 - intrinsics.cx) / intrinsics.fx) as f32)
            .collect();
        let lookup_y = (0..height)
            .map(|r| ((r as f64 - intrinsics.cy) / intrinsics.fy) as f32)
            .collect();
        Self {
            lookup_x,
            lookup_y,
            width,
            height,
            intrinsics: *intrinsics,
        }
    }

    /// True if this table was built for the given intrinsics/resolution pair.
    pub fn matches(&self, intrinsics: &CameraIntrinsics, width: usize, height: usize) -> bool {
        self.width == width && self.height == height && self.intrinsics == *intrinsics
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}
