//! Offline file I/O: matrix text files, saved depth images, voxel grid
//! files.

pub mod depth;
pub mod grid_file;
pub mod matrix_file;

pub use depth::read_depth_image;
pub use grid_file::{load_voxel_grid, save_voxel_grid};
pub use matrix_file::{load_matrix, load_transform4};
