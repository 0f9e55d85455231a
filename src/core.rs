mod periodic_box;
mod structure;

pub use periodic_box::*;
pub use structure::*;

// Aliases for vectors and points
/// Convenience alias for 3D vector
pub type Vector3d = nalgebra::Vector3<f64>;
/// Convenience alias for 3x3 matrix
pub type Matrix3d = nalgebra::Matrix3<f64>;
/// Site or atom position
pub type Pos = nalgebra::Point3<f64>;
/// Point in the 2D parameter plane used for triangulation
pub type Pos2 = nalgebra::Point2<f64>;
