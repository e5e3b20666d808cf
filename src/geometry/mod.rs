//! Geometric primitives shared by the live pipeline and the volumetric
//! exporter.

pub mod matrix;

pub use matrix::Mat4;
