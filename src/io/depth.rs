//! Offline depth image loading.
//!
//! This is the static/offline counterpart to the live receiver path: depth
//! frames saved as 16-bit PNGs (millimeters) are loaded back as meters.
//! Unlike the live path, this loader treats anything beyond 2 m as invalid
//! and zeroes it; the live reconstruction loop passes all nonzero depths
//! through unmodified.

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Depth cutoff applied by the offline loader, meters.
pub const MAX_DEPTH_M: f32 = 2.0;

/// Read an `height x width` 16-bit depth image and return depths in meters,
/// row-major. Values beyond [`MAX_DEPTH_M`] are zeroed.
pub fn read_depth_image<P: AsRef<Path>>(path: P, height: usize, width: usize) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let img = image::open(path)
        .with_context(|| format!("Failed to read depth image {}", path.display()))?
        .into_luma16();

    if img.width() as usize != width || img.height() as usize != height {
        bail!(
            "depth image {} is {}x{}, expected {}x{}",
            path.display(),
            img.width(),
            img.height(),
            width,
            height
        );
    }

    Ok(img
        .pixels()
        .map(|p| {
            let depth_m = f32::from(p.0[0]) / 1000.0;
            if depth_m > MAX_DEPTH_M {
                0.0
            } else {
                depth_m
            }
        })
        .collect())
}
