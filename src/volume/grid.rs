//! Dense TSDF voxel grid.

use anyhow::{bail, Result};

/// Dense truncated signed distance field over a regular lattice.
///
/// `tsdf` and `weight` are row-major with x fastest, then y, then z. The
/// grid is populated by an external fusion engine and read-only here.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    pub dims: [usize; 3],
    /// Camera-space position of voxel (0, 0, 0), meters.
    pub origin: [f32; 3],
    /// Edge length of one voxel, meters.
    pub voxel_size: f32,
    pub tsdf: Vec<f32>,
    pub weight: Vec<f32>,
}

impl VoxelGrid {
    pub fn new(
        dims: [usize; 3],
        origin: [f32; 3],
        voxel_size: f32,
        tsdf: Vec<f32>,
        weight: Vec<f32>,
    ) -> Result<Self> {
        let count = dims[0] * dims[1] * dims[2];
        if tsdf.len() != count {
            bail!("tsdf has {} entries, expected {}", tsdf.len(), count);
        }
        if weight.len() != count {
            bail!("weight has {} entries, expected {}", weight.len(), count);
        }
        Ok(Self {
            dims,
            origin,
            voxel_size,
            tsdf,
            weight,
        })
    }

    pub fn voxel_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Decompose a linear index into (x, y, z) voxel coordinates.
    pub fn voxel_coords(&self, index: usize) -> [usize; 3] {
        let slice = self.dims[0] * self.dims[1];
        let z = index / slice;
        let y = (index - z * slice) / self.dims[0];
        let x = index - z * slice - y * self.dims[0];
        [x, y, z]
    }
}
