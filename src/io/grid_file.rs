//! Binary voxel grid files.
//!
//! Layout, all little-endian: dims as 3 x u32, origin as 3 x f32, voxel
//! size as f32, then `dimX*dimY*dimZ` f32 tsdf values followed by the same
//! number of f32 weights.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::volume::VoxelGrid;

/// Upper bound on voxels per dimension, to reject corrupt headers before
/// allocating.
const MAX_DIM: u32 = 4096;

/// Fixed-size portion preceding the voxel arrays: dims, origin, voxel size.
const HEADER_BYTES: u64 = 3 * 4 + 3 * 4 + 4;

pub fn load_voxel_grid<P: AsRef<Path>>(path: P) -> Result<VoxelGrid> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open voxel grid {}", path.display()))?;
    let file_len = file
        .metadata()
        .with_context(|| format!("Failed to stat voxel grid {}", path.display()))?
        .len();
    let mut rdr = BufReader::new(file);

    let mut dims = [0usize; 3];
    for d in dims.iter_mut() {
        let v = rdr.read_u32::<LittleEndian>()?;
        if v == 0 || v > MAX_DIM {
            bail!("voxel grid {} has invalid dimension {}", path.display(), v);
        }
        *d = v as usize;
    }
    let mut origin = [0.0f32; 3];
    for o in origin.iter_mut() {
        *o = rdr.read_f32::<LittleEndian>()?;
    }
    let voxel_size = rdr.read_f32::<LittleEndian>()?;

    let count = dims[0] * dims[1] * dims[2];
    // Check the claimed volume against the actual file size before
    // allocating, so a corrupt header cannot trigger a huge allocation.
    let expected_len = HEADER_BYTES + 2 * count as u64 * 4;
    if file_len != expected_len {
        bail!(
            "voxel grid {} is {} bytes, expected {} for dims {}x{}x{}",
            path.display(),
            file_len,
            expected_len,
            dims[0],
            dims[1],
            dims[2]
        );
    }
    let mut tsdf = vec![0.0f32; count];
    rdr.read_f32_into::<LittleEndian>(&mut tsdf)
        .with_context(|| format!("Truncated tsdf data in {}", path.display()))?;
    let mut weight = vec![0.0f32; count];
    rdr.read_f32_into::<LittleEndian>(&mut weight)
        .with_context(|| format!("Truncated weight data in {}", path.display()))?;

    VoxelGrid::new(dims, origin, voxel_size, tsdf, weight)
}

pub fn save_voxel_grid<P: AsRef<Path>>(path: P, grid: &VoxelGrid) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create voxel grid {}", path.display()))?;
    let mut out = BufWriter::new(file);

    for &d in &grid.dims {
        out.write_u32::<LittleEndian>(d as u32)?;
    }
    for &o in &grid.origin {
        out.write_f32::<LittleEndian>(o)?;
    }
    out.write_f32::<LittleEndian>(grid.voxel_size)?;
    for &v in &grid.tsdf {
        out.write_f32::<LittleEndian>(v)?;
    }
    for &v in &grid.weight {
        out.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rust_rgbd_{}_{}.bin", std::process::id(), name))
    }

    #[test]
    fn roundtrips_grid_contents() {
        let grid = VoxelGrid::new(
            [2, 1, 2],
            [0.5, -1.0, 2.0],
            0.01,
            vec![0.1, -0.2, 0.3, -0.4],
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();

        let path = temp_path("roundtrip");
        save_voxel_grid(&path, &grid).unwrap();
        let loaded = load_voxel_grid(&path).unwrap();

        assert_eq!(loaded.dims, grid.dims);
        assert_relative_eq!(loaded.voxel_size, grid.voxel_size);
        assert_relative_eq!(loaded.origin[2], 2.0);
        assert_eq!(loaded.tsdf, grid.tsdf);
        assert_eq!(loaded.weight, grid.weight);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn truncated_file_is_an_error() {
        let grid =
            VoxelGrid::new([2, 2, 2], [0.0; 3], 1.0, vec![0.0; 8], vec![0.0; 8]).unwrap();
        let path = temp_path("truncated");
        save_voxel_grid(&path, &grid).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();
        assert!(load_voxel_grid(&path).is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_a_recoverable_error() {
        assert!(load_voxel_grid("/nonexistent/grid.bin").is_err());
    }

    #[test]
    fn oversized_header_claim_is_rejected_before_allocating() {
        // A header claiming 4096^3 voxels over a few bytes of payload must
        // come back as an error, not as a ~256 GiB allocation attempt.
        let path = temp_path("huge_claim");
        let file = File::create(&path).unwrap();
        let mut out = BufWriter::new(file);
        for _ in 0..3 {
            out.write_u32::<LittleEndian>(4096).unwrap();
        }
        for _ in 0..3 {
            out.write_f32::<LittleEndian>(0.0).unwrap();
        }
        out.write_f32::<LittleEndian>(1.0).unwrap();
        out.write_f32::<LittleEndian>(0.0).unwrap();
        drop(out);

        let err = load_voxel_grid(&path).unwrap_err();
        assert!(err.to_string().contains("expected"), "got: {err:#}");

        std::fs::remove_file(&path).unwrap();
    }
}
