//! Whitespace-delimited matrix text files.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::geometry::Mat4;

/// Load an `rows x cols` matrix from a text file of whitespace/newline
/// delimited floats, row-major.
pub fn load_matrix<P: AsRef<Path>>(path: P, rows: usize, cols: usize) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let mut values = Vec::with_capacity(rows * cols);
    for token in text.split_whitespace() {
        let value: f32 = token
            .parse()
            .with_context(|| format!("Invalid float {token:?} in {}", path.display()))?;
        values.push(value);
    }
    if values.len() != rows * cols {
        bail!(
            "{} holds {} values, expected {} for a {}x{} matrix",
            path.display(),
            values.len(),
            rows * cols,
            rows,
            cols
        );
    }
    Ok(values)
}

/// Load a 4x4 row-major transform from a text file.
pub fn load_transform4<P: AsRef<Path>>(path: P) -> Result<Mat4> {
    let values = load_matrix(path, 4, 4)?;
    let mut m = [0.0f32; 16];
    m.copy_from_slice(&values);
    Ok(Mat4(m))
}
