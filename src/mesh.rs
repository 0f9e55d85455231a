use crate::core::{PbcDims, PeriodicBox, Pos, Pos2, Vector3d, PBC_XY};
use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use sorted_vec::SortedSet;
use thiserror::Error;

mod curvature;
mod delaunay;
mod periodic;

pub use periodic::{GrowSize, PeriodicExtender, PeriodicNeighborMetric};

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("too few points for triangulation: {0}")]
    TooFewPoints(usize),

    #[error("degenerate point set, no triangles could be built")]
    Degenerate,

    #[error("point {0} is not a vertex of any triangle (duplicated point?)")]
    Unreferenced(usize),

    #[error("triangle {0} has zero area")]
    ZeroArea(usize),

    #[error("normal of vertex {0} is undefined")]
    ZeroNormal(usize),

    #[error("no real point matches periodic image {0}")]
    GhostLookup(usize),
}

/// Triangulated monolayer midplane with per-vertex geometry.
///
/// Vertices are the real sites in input order. Simplices reference real
/// vertices only, with triangles crossing the periodic boundary folded
/// back onto their real counterparts.
#[derive(Debug, Clone)]
pub struct Mesh {
    pbox: PeriodicBox,
    points: Vec<Pos>,
    simplices: Vec<[usize; 3]>,
    areas: Vec<f64>,
    face_normals: Vec<Vector3d>,
    vertex_normals: Vec<Vector3d>,
    principals: Vec<[f64; 2]>,
    neighbors: Vec<Vec<usize>>,
}

impl Mesh {
    pub fn num_vertices(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[Pos] {
        &self.points
    }

    pub fn simplices(&self) -> &[[usize; 3]] {
        &self.simplices
    }

    pub fn areas(&self) -> &[f64] {
        &self.areas
    }

    pub fn face_normals(&self) -> &[Vector3d] {
        &self.face_normals
    }

    pub fn vertex_normals(&self) -> &[Vector3d] {
        &self.vertex_normals
    }

    pub fn vertex_normal(&self, i: usize) -> &Vector3d {
        &self.vertex_normals[i]
    }

    /// Principal curvatures of vertex `i`
    pub fn principal_curvatures(&self, i: usize) -> (f64, f64) {
        let [p0, p1] = self.principals[i];
        (3.0 * p0 - p1, 3.0 * p1 - p0)
    }

    pub fn mean_curvature(&self, i: usize) -> f64 {
        let (k1, k2) = self.principal_curvatures(i);
        0.5 * (k1 + k2)
    }

    pub fn gaussian_curvature(&self, i: usize) -> f64 {
        let (k1, k2) = self.principal_curvatures(i);
        k1 * k2
    }

    /// Neighbours of vertex `i` resolved across periodic boundaries
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    pub fn get_box(&self) -> &PeriodicBox {
        &self.pbox
    }
}

//==============================================================
// Mesh construction
//==============================================================

pub struct MeshBuilder {
    extender: PeriodicExtender,
    dims: PbcDims,
}

impl Default for MeshBuilder {
    fn default() -> Self {
        Self::new(GrowSize::default())
    }
}

// Orders the simplex by decreasing atan2(dx,dy) around its centroid.
// Face normals of upward-facing patches then point to +z.
fn reclock(pts: &[Pos], s: [usize; 3]) -> [usize; 3] {
    let c = (pts[s[0]].coords + pts[s[1]].coords + pts[s[2]].coords) / 3.0;
    let key = |i: usize| {
        let r = pts[i].coords - c;
        r.x.atan2(r.y)
    };
    let mut s = s;
    s.sort_by(|a, b| key(*b).total_cmp(&key(*a)));
    s
}

impl MeshBuilder {
    pub fn new(growsize: GrowSize) -> Self {
        Self {
            extender: PeriodicExtender::new(PBC_XY, growsize),
            dims: PBC_XY,
        }
    }

    pub fn build(&self, points: &[Pos], pbox: &PeriodicBox) -> Result<Mesh, MeshError> {
        let nmol = points.len();
        if nmol < 3 {
            return Err(MeshError::TooFewPoints(nmol));
        }

        let (ext, ghost_ids) = self.extender.extend(points, pbox);
        debug!("{} points extended to {} over periodic images", nmol, ext.len());

        // Planar projection
        let proj = ext.iter().map(|p| Pos2::new(p.x, p.y)).collect::<Vec<_>>();
        let triangles = delaunay::triangulate(&proj)?;

        // Keep only simplices touching at least one real point
        let kept = triangles
            .into_iter()
            .filter(|s| s.iter().any(|i| *i < nmol))
            .map(|s| reclock(&ext, s))
            .collect::<Vec<_>>();

        let relevant = SortedSet::from_unsorted(kept.iter().flatten().copied().collect());
        // Real points have the lowest indexes, so all of them are
        // referenced if the first nmol entries are 0..nmol
        if let Some(missing) = (0..nmol).find(|i| relevant.get(*i) != Some(i)) {
            return Err(MeshError::Unreferenced(missing));
        }

        let pts = relevant.iter().map(|i| ext[*i]).collect::<Vec<_>>();
        let ghosts = relevant.iter().map(|i| ghost_ids[*i]).collect::<Vec<_>>();
        let simplices = kept
            .iter()
            .map(|s| s.map(|i| relevant.binary_search(&i).unwrap_or(i)))
            .collect::<Vec<_>>();
        debug!(
            "trimmed mesh: {} vertices, {} simplices",
            pts.len(),
            simplices.len()
        );

        // Simplex areas and face normals
        let mut areas = Vec::with_capacity(simplices.len());
        let mut face_normals = Vec::with_capacity(simplices.len());
        for (k, s) in simplices.iter().enumerate() {
            let cross = (pts[s[1]] - pts[s[0]]).cross(&(pts[s[2]] - pts[s[0]]));
            areas.push(0.5 * cross.norm());
            face_normals.push(
                cross
                    .try_normalize(f64::MIN_POSITIVE)
                    .ok_or(MeshError::ZeroArea(k))?,
            );
        }

        // Vertex to simplex map for real vertices
        let mut v2s = vec![vec![]; nmol];
        for (k, s) in simplices.iter().enumerate() {
            for i in s.iter().filter(|i| **i < nmol) {
                v2s[*i].push(k);
            }
        }

        let vertex_normals = v2s
            .iter()
            .enumerate()
            .map(|(v, around)| {
                around
                    .iter()
                    .map(|k| face_normals[*k] * areas[*k])
                    .sum::<Vector3d>()
                    .try_normalize(f64::MIN_POSITIVE)
                    .ok_or(MeshError::ZeroNormal(v))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (principals, neib): (Vec<_>, Vec<_>) = (0..nmol)
            .into_par_iter()
            .map(|v| {
                curvature::shape_operator(
                    v,
                    &pts,
                    &simplices,
                    &areas,
                    &v2s[v],
                    &vertex_normals[v],
                )
            })
            .unzip();

        // Map each mesh vertex to its real counterpart
        let metric = PeriodicNeighborMetric::new(pbox, self.dims);
        let tol = 1e-6 * pbox.get_box_extents().max();
        let real = pts
            .iter()
            .zip(&ghosts)
            .enumerate()
            .map(|(k, (p, id))| {
                if k < nmol || metric.distance(p, &points[*id]) <= tol {
                    Ok(*id)
                } else {
                    metric
                        .find_image(p, points, tol)
                        .ok_or(MeshError::GhostLookup(k))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let neighbors = neib
            .into_iter()
            .enumerate()
            .map(|(v, nl)| {
                let mut nl = nl
                    .into_iter()
                    .map(|i| real[i])
                    .filter(|i| *i != v)
                    .collect::<Vec<_>>();
                nl.sort_unstable();
                nl.dedup();
                nl
            })
            .collect::<Vec<_>>();

        // Fold simplices onto real vertices dropping periodic duplicates
        let mut seen = FxHashSet::default();
        let mut real_simplices = vec![];
        let mut real_areas = vec![];
        let mut real_normals = vec![];
        for (k, s) in simplices.iter().enumerate() {
            let rs = s.map(|i| real[i]);
            let mut key = rs;
            key.sort_unstable();
            if seen.insert(key) {
                real_simplices.push(rs);
                real_areas.push(areas[k]);
                real_normals.push(face_normals[k]);
            }
        }

        Ok(Mesh {
            pbox: *pbox,
            points: points.to_vec(),
            simplices: real_simplices,
            areas: real_areas,
            face_normals: real_normals,
            vertex_normals,
            principals,
            neighbors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn grid(nx: usize, ny: usize, step: f64, f: impl Fn(f64, f64) -> f64) -> Vec<Pos> {
        let mut pts = vec![];
        for i in 0..nx {
            for j in 0..ny {
                let (x, y) = (i as f64 * step, j as f64 * step);
                pts.push(Pos::new(x, y, f(x, y)));
            }
        }
        pts
    }

    #[test]
    fn flat_mesh() -> anyhow::Result<()> {
        let pts = grid(10, 10, 1.0, |_, _| 0.0);
        let b = PeriodicBox::from_extents(10.0, 10.0, 10.0)?;
        let mesh = MeshBuilder::default().build(&pts, &b)?;

        assert_eq!(mesh.num_vertices(), 100);
        for i in 0..mesh.num_vertices() {
            let n = mesh.vertex_normal(i);
            assert!((n.norm() - 1.0).abs() < 1e-9);
            assert!((n.z - 1.0).abs() < 1e-9);
            assert!(mesh.mean_curvature(i).abs() < 1e-9);
            assert!(mesh.gaussian_curvature(i).abs() < 1e-9);
            let nb = mesh.neighbors(i);
            assert!(nb.len() >= 4 && nb.len() <= 8);
            assert!(nb.iter().all(|j| *j < 100 && *j != i));
        }
        for (s, a) in mesh.simplices().iter().zip(mesh.areas()) {
            assert!(s.iter().all(|i| *i < 100));
            assert!((a - 0.5).abs() < 1e-9);
        }
        Ok(())
    }

    #[test]
    fn neighbors_across_boundary() -> anyhow::Result<()> {
        let pts = grid(10, 10, 1.0, |_, _| 0.0);
        let b = PeriodicBox::from_extents(10.0, 10.0, 10.0)?;
        let mesh = MeshBuilder::default().build(&pts, &b)?;
        // Site (0,0) touches (9,0) and (0,9) through the boundary
        let nb = mesh.neighbors(0);
        assert!(nb.contains(&90));
        assert!(nb.contains(&9));
        assert!(nb.contains(&1));
        assert!(nb.contains(&10));
        Ok(())
    }

    #[test]
    fn buckle_curvature_sign() -> anyhow::Result<()> {
        let (lx, ly) = (20.0, 10.0);
        let pts = grid(20, 10, 1.0, |x, _| 2.0 * (2.0 * PI * x / lx).sin());
        let b = PeriodicBox::from_extents(lx, ly, 10.0)?;
        let mesh = MeshBuilder::default().build(&pts, &b)?;

        // Crest at x=5, trough at x=15
        let crest = 5 * 10 + 4;
        let trough = 15 * 10 + 4;
        assert!(mesh.mean_curvature(crest) > 0.01);
        assert!(mesh.mean_curvature(trough) < -0.01);
        // Normals tilt away from z on the slopes
        let slope = 10 * 10 + 4;
        assert!(mesh.vertex_normal(slope).x.abs() > 0.1);
        for n in mesh.vertex_normals() {
            assert!((n.norm() - 1.0).abs() < 1e-9);
        }
        Ok(())
    }

    #[test]
    fn reclock_orientation() {
        let pts = vec![
            Pos::new(0.0, 0.0, 0.0),
            Pos::new(1.0, 0.0, 0.0),
            Pos::new(0.0, 1.0, 0.0),
        ];
        for s in [[0, 1, 2], [2, 1, 0], [1, 0, 2]] {
            let s = reclock(&pts, s);
            let n = (pts[s[1]] - pts[s[0]]).cross(&(pts[s[2]] - pts[s[0]]));
            assert!(n.z > 0.0);
        }
    }

    #[test]
    fn collinear_input() -> anyhow::Result<()> {
        let pts = (0..10)
            .map(|i| Pos::new(i as f64, i as f64, 0.0))
            .collect::<Vec<_>>();
        let b = PeriodicBox::from_extents(10.0, 10.0, 10.0)?;
        let res = MeshBuilder::new(GrowSize::Fraction(0.0)).build(&pts, &b);
        assert!(matches!(res, Err(MeshError::Degenerate)));
        Ok(())
    }

    #[test]
    fn duplicated_point() -> anyhow::Result<()> {
        let mut pts = grid(6, 6, 1.0, |_, _| 0.0);
        pts.push(pts[7]);
        let b = PeriodicBox::from_extents(6.0, 6.0, 10.0)?;
        let res = MeshBuilder::default().build(&pts, &b);
        assert!(matches!(res, Err(MeshError::Unreferenced(36))));
        Ok(())
    }

    #[test]
    fn too_few_points() -> anyhow::Result<()> {
        let pts = vec![Pos::new(1.0, 1.0, 0.0), Pos::new(2.0, 1.0, 0.0)];
        let b = PeriodicBox::from_extents(6.0, 6.0, 10.0)?;
        let res = MeshBuilder::default().build(&pts, &b);
        assert!(matches!(res, Err(MeshError::TooFewPoints(2))));
        Ok(())
    }
}
