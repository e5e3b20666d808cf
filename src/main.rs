use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use rust_rgbd::geometry::Mat4;
use rust_rgbd::io::{load_transform4, load_voxel_grid};
use rust_rgbd::volume::save_surface_cloud;

/// Offline surface export: voxel grid file in, binary PLY out.
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!(
            "usage: surface-export <grid.bin> <out.ply> [cam2world.txt] [tsdf_thresh] [weight_thresh]"
        );
    }
    let grid_path = PathBuf::from(&args[0]);
    let out_path = PathBuf::from(&args[1]);
    let cam_to_world = match args.get(2) {
        Some(path) => load_transform4(path)?,
        None => Mat4::identity(),
    };
    let tsdf_thresh: f32 = match args.get(3) {
        Some(raw) => raw.parse().context("invalid tsdf threshold")?,
        None => 0.2,
    };
    let weight_thresh: f32 = match args.get(4) {
        Some(raw) => raw.parse().context("invalid weight threshold")?,
        None => 0.0,
    };

    let grid = load_voxel_grid(&grid_path)?;
    info!(
        dims = ?grid.dims,
        voxel_size = grid.voxel_size,
        "loaded voxel grid from {}",
        grid_path.display()
    );

    let written = save_surface_cloud(&out_path, &grid, tsdf_thresh, weight_thresh, &cam_to_world)?;
    info!(
        points = written,
        "wrote surface cloud to {}",
        out_path.display()
    );
    Ok(())
}
