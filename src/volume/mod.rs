//! Volumetric utilities: TSDF voxel grid and surface point extraction.

pub mod extract;
pub mod grid;

pub use extract::{extract_surface, save_surface_cloud, write_surface_ply};
pub use grid::VoxelGrid;
