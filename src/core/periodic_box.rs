use crate::core::{Matrix3d, Pos, Vector3d};
use thiserror::Error;

/// Rectangular periodic box of the assembled system.
///
/// Only orthogonal boxes are produced by the bilayer builder, so the box
/// is stored as its three extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicBox {
    extents: Vector3d,
}

/// Set of periodic dimensions encoded as a bit mask.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PbcDims(u8);

impl PbcDims {
    pub fn get_dim(&self, n: usize) -> bool {
        if n > 2 {
            panic!("pbc has only 3 dimentions")
        }
        (self.0 & (1 << n)) != 0
    }

    /// Iterator over indexes of periodic dimensions
    pub fn iter_dims(&self) -> impl Iterator<Item = usize> + '_ {
        (0..3).filter(|d| self.get_dim(*d))
    }
}

/// Lateral periodicity of a membrane system
pub const PBC_XY: PbcDims = PbcDims(0b0000_0011);

#[derive(Error, Debug)]
pub enum PeriodicBoxError {
    #[error("zero or negative box extent {0}")]
    BadExtent(f64),

    #[error("box matrix is not orthogonal")]
    NotOrthogonal,
}

impl PeriodicBox {
    pub fn from_extents(lx: f64, ly: f64, lz: f64) -> Result<Self, PeriodicBoxError> {
        for l in [lx, ly, lz] {
            if !(l > 0.0) || !l.is_finite() {
                return Err(PeriodicBoxError::BadExtent(l));
            }
        }
        Ok(Self {
            extents: Vector3d::new(lx, ly, lz),
        })
    }

    pub fn from_matrix(m: Matrix3d) -> Result<Self, PeriodicBoxError> {
        for i in 0..3 {
            for j in 0..3 {
                if i != j && m[(i, j)] != 0.0 {
                    return Err(PeriodicBoxError::NotOrthogonal);
                }
            }
        }
        Self::from_extents(m[(0, 0)], m[(1, 1)], m[(2, 2)])
    }

    #[inline(always)]
    pub fn get_box_extents(&self) -> Vector3d {
        self.extents
    }

    /// Box vector numbers as written to the last line of a GRO file.
    pub fn to_gro_vectors(&self) -> [f64; 3] {
        [self.extents.x, self.extents.y, self.extents.z]
    }

    /// Lateral center of the box at height `z`
    pub fn lateral_center(&self, z: f64) -> Pos {
        Pos::new(0.5 * self.extents.x, 0.5 * self.extents.y, z)
    }

    /// Minimum-image vector along periodic dimensions.
    #[inline(always)]
    pub fn shortest_vector_dims(&self, vec: &Vector3d, pbc_dims: PbcDims) -> Vector3d {
        let mut v = *vec;
        for d in pbc_dims.iter_dims() {
            v[d] -= self.extents[d] * (v[d] / self.extents[d]).round();
        }
        v
    }

    #[inline(always)]
    pub fn distance(&self, p1: &Pos, p2: &Pos, pbc_dims: PbcDims) -> f64 {
        self.shortest_vector_dims(&(p2 - p1), pbc_dims).norm()
    }

    /// Element-wise maximum of two boxes
    pub fn union(&self, other: &PeriodicBox) -> PeriodicBox {
        PeriodicBox {
            extents: self.extents.sup(&other.extents),
        }
    }
}
