//! Surface point extraction from a TSDF grid and binary PLY serialization.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::geometry::Mat4;

use super::grid::VoxelGrid;

/// Extract the thresholded surface point set from a voxel grid.
///
/// A voxel qualifies when `|tsdf| < tsdf_thresh && weight > weight_thresh`.
/// Points are emitted in increasing linear-index order (x fastest, then y,
/// then z) and transformed into world space by `cam_to_world`, so the output
/// is deterministic for fixed inputs.
pub fn extract_surface(
    grid: &VoxelGrid,
    tsdf_thresh: f32,
    weight_thresh: f32,
    cam_to_world: &Mat4,
) -> Vec<[f32; 3]> {
    // First pass fixes the output size.
    let count = (0..grid.voxel_count())
        .filter(|&i| grid.tsdf[i].abs() < tsdf_thresh && grid.weight[i] > weight_thresh)
        .count();

    let mut points = Vec::with_capacity(count);
    for i in 0..grid.voxel_count() {
        if grid.tsdf[i].abs() >= tsdf_thresh || grid.weight[i] <= weight_thresh {
            continue;
        }
        let [x, y, z] = grid.voxel_coords(i);
        let pt_cam = [
            grid.origin[0] + x as f32 * grid.voxel_size,
            grid.origin[1] + y as f32 * grid.voxel_size,
            grid.origin[2] + z as f32 * grid.voxel_size,
        ];
        points.push(cam_to_world.transform_point(pt_cam));
    }
    debug!(
        total = grid.voxel_count(),
        surface = points.len(),
        "extracted surface points"
    );
    points
}

/// Serialize points to a binary little-endian PLY file.
///
/// The file is written to a temporary sibling and renamed into place on
/// success, so a failed write never leaves a partial file under the target
/// name.
pub fn write_surface_ply<P: AsRef<Path>>(path: P, points: &[[f32; 3]]) -> Result<()> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| format!(".{n}.tmp"));
    let Some(file_name) = file_name else {
        bail!("invalid output path {}", path.display());
    };
    let tmp_path = path.with_file_name(file_name);

    let result = write_ply_records(&tmp_path, points)
        .and_then(|()| {
            fs::rename(&tmp_path, path)
                .with_context(|| format!("Failed to move {} into place", tmp_path.display()))
        })
        .with_context(|| format!("Failed to write {}", path.display()));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_ply_records(path: &Path, points: &[[f32; 3]]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    write!(
        out,
        "ply\nformat binary_little_endian 1.0\nelement vertex {}\nproperty float x\nproperty float y\nproperty float z\nend_header\n",
        points.len()
    )?;
    for p in points {
        out.write_f32::<LittleEndian>(p[0])?;
        out.write_f32::<LittleEndian>(p[1])?;
        out.write_f32::<LittleEndian>(p[2])?;
    }
    out.flush()?;
    Ok(())
}

/// Extract the surface point set and write it in one step.
///
/// Returns the number of points written.
pub fn save_surface_cloud<P: AsRef<Path>>(
    path: P,
    grid: &VoxelGrid,
    tsdf_thresh: f32,
    weight_thresh: f32,
    cam_to_world: &Mat4,
) -> Result<usize> {
    let points = extract_surface(grid, tsdf_thresh, weight_thresh, cam_to_world);
    write_surface_ply(path, &points)?;
    Ok(points.len())
}
