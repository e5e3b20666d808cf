pub mod camera;
pub mod geometry;
pub mod io;
pub mod receiver;
pub mod volume;
