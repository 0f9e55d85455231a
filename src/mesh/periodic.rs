use crate::core::{PbcDims, PeriodicBox, Pos, Vector3d};
use itertools::iproduct;

/// Margin of the periodic extension around the box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowSize {
    /// Fraction of the box extent along each periodic dimension
    Fraction(f64),
    /// Literal distance, converted to the largest equivalent fraction
    Absolute(f64),
}

impl Default for GrowSize {
    fn default() -> Self {
        GrowSize::Fraction(0.2)
    }
}

//==============================================================
// Periodic extension of a point set
//==============================================================

/// Replicates a point set across neighboring periodic images so that
/// triangulation close to the box edges sees a complete neighborhood.
#[derive(Debug, Clone)]
pub struct PeriodicExtender {
    dims: PbcDims,
    growsize: GrowSize,
}

impl PeriodicExtender {
    pub fn new(dims: PbcDims, growsize: GrowSize) -> Self {
        Self { dims, growsize }
    }

    fn fraction(&self, ext: &Vector3d) -> f64 {
        match self.growsize {
            GrowSize::Fraction(f) => f,
            GrowSize::Absolute(d) => self
                .dims
                .iter_dims()
                .map(|i| d / ext[i])
                .fold(0.0, f64::max),
        }
    }

    /// Returns the extended points and, for each of them, the index of
    /// the original point it mirrors.
    ///
    /// Originals come first and in input order, so index `i < points.len()`
    /// in the output is always the original point `i`.
    pub fn extend(&self, points: &[Pos], pbox: &PeriodicBox) -> (Vec<Pos>, Vec<usize>) {
        let ext = pbox.get_box_extents();
        let grow = self.fraction(&ext);

        let mut out = points.to_vec();
        let mut ids = (0..points.len()).collect::<Vec<_>>();

        let allowed = |d: usize, s: i32| s == 0 || self.dims.get_dim(d);
        for (sx, sy, sz) in iproduct!(-1..=1, -1..=1, -1..=1) {
            if (sx, sy, sz) == (0, 0, 0)
                || !allowed(0, sx)
                || !allowed(1, sy)
                || !allowed(2, sz)
            {
                continue;
            }
            let shift = Vector3d::new(
                sx as f64 * ext.x,
                sy as f64 * ext.y,
                sz as f64 * ext.z,
            );
            for (i, p) in points.iter().enumerate() {
                let img = p + shift;
                let inside = self
                    .dims
                    .iter_dims()
                    .all(|d| img[d] > -ext[d] * grow && img[d] < ext[d] * (1.0 + grow));
                if inside {
                    out.push(img);
                    ids.push(i);
                }
            }
        }
        (out, ids)
    }
}

//==============================================================
// Distances on the lateral torus
//==============================================================

/// Pairwise distances with minimum-image wrapping along the periodic axes.
///
/// Each periodic component longer than half of the box is shortened by
/// one box length, then the norm is taken over all three axes.
#[derive(Debug, Clone)]
pub struct PeriodicNeighborMetric {
    extents: Vector3d,
    dims: PbcDims,
}

impl PeriodicNeighborMetric {
    pub fn new(pbox: &PeriodicBox, dims: PbcDims) -> Self {
        Self {
            extents: pbox.get_box_extents(),
            dims,
        }
    }

    pub fn distance(&self, p1: &Pos, p2: &Pos) -> f64 {
        let mut d = (p2 - p1).abs();
        for i in self.dims.iter_dims() {
            if d[i] > 0.5 * self.extents[i] {
                d[i] -= self.extents[i];
            }
        }
        d.norm()
    }

    /// Index of the first candidate coinciding with `point` up to `tol`
    pub fn find_image(&self, point: &Pos, candidates: &[Pos], tol: f64) -> Option<usize> {
        candidates
            .iter()
            .position(|c| self.distance(point, c) <= tol)
    }
}
