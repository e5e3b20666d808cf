//! Camera data model: intrinsics, unprojection lookup tables, and the
//! synchronized color+depth frame types produced by the receiver.

pub mod frame;
pub mod intrinsics;

pub use frame::{CloudPoint, Frame, PointCloud};
pub use intrinsics::{CameraIntrinsics, UnprojectionTable};
