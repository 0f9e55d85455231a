use super::MeshError;
use crate::core::Pos2;
use rustc_hash::FxHashMap;

// Relative tolerance of the circumcircle test. Co-circular points
// (every square of a regular grid) are treated as outside.
const CIRCLE_TOL: f64 = 1e-10;

struct Triangle {
    // Counterclockwise
    v: [usize; 3],
    // Neighbour across the edge opposite to v[i]
    nb: [Option<usize>; 3],
    center: Pos2,
    r2: f64,
    alive: bool,
}

struct Triangulation {
    verts: Vec<Pos2>,
    tris: Vec<Triangle>,
    // Insertion stamp per triangle, used to mark cavity members
    mark: Vec<usize>,
    orient_tol: f64,
}

#[inline(always)]
fn orient(a: &Pos2, b: &Pos2, c: &Pos2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

impl Triangulation {
    fn new_triangle(&self, v: [usize; 3]) -> Triangle {
        let a = &self.verts[v[0]];
        let b = self.verts[v[1]] - a;
        let c = self.verts[v[2]] - a;
        let d = 2.0 * (b.x * c.y - b.y * c.x);
        let (center, r2) = if d.abs() > f64::MIN_POSITIVE {
            let b2 = b.norm_squared();
            let c2 = c.norm_squared();
            let ux = (c.y * b2 - b.y * c2) / d;
            let uy = (b.x * c2 - c.x * b2) / d;
            (Pos2::new(a.x + ux, a.y + uy), ux * ux + uy * uy)
        } else {
            // Flat triangle, its circle degenerates to a half-plane
            (*a, f64::INFINITY)
        };
        Triangle {
            v,
            nb: [None; 3],
            center,
            r2,
            alive: true,
        }
    }

    #[inline(always)]
    fn in_circle(&self, t: usize, p: &Pos2) -> bool {
        let tri = &self.tris[t];
        (p - tri.center).norm_squared() < tri.r2 * (1.0 - CIRCLE_TOL)
    }

    fn edge_orient(&self, t: usize, i: usize, p: &Pos2) -> f64 {
        let v = &self.tris[t].v;
        orient(&self.verts[v[(i + 1) % 3]], &self.verts[v[(i + 2) % 3]], p)
    }

    // Walks towards p starting from triangle `start`.
    // Falls back to a linear scan if the walk does not converge.
    fn locate(&self, p: &Pos2, start: usize) -> usize {
        let mut t = start;
        'walk: for _ in 0..self.tris.len() {
            for i in 0..3 {
                if self.edge_orient(t, i, p) < 0.0 {
                    if let Some(nb) = self.tris[t].nb[i] {
                        t = nb;
                        continue 'walk;
                    }
                }
            }
            return t;
        }

        let min_orient = |t: usize| {
            (0..3)
                .map(|i| self.edge_orient(t, i, p))
                .fold(f64::INFINITY, f64::min)
        };
        (0..self.tris.len())
            .filter(|t| self.tris[*t].alive)
            .max_by(|a, b| min_orient(*a).total_cmp(&min_orient(*b)))
            .unwrap_or(start)
    }

    // Inserts vertex `iv` and returns one of the created triangles.
    // Returns None if the vertex duplicates an existing one.
    fn insert(&mut self, iv: usize, hint: usize, stamp: usize) -> Option<usize> {
        let p = self.verts[iv];
        let t0 = self.locate(&p, hint);

        let dup_tol = self.orient_tol.sqrt();
        if self.tris[t0]
            .v
            .iter()
            .any(|v| (self.verts[*v] - p).norm() < dup_tol)
        {
            return None;
        }

        // Grow the cavity of triangles whose circumcircle contains p
        let mut cavity = vec![t0];
        self.mark[t0] = stamp;
        let mut stack = vec![t0];
        while let Some(t) = stack.pop() {
            for i in 0..3 {
                if let Some(nb) = self.tris[t].nb[i] {
                    if self.mark[nb] != stamp && self.in_circle(nb, &p) {
                        self.mark[nb] = stamp;
                        cavity.push(nb);
                        stack.push(nb);
                    }
                }
            }
        }

        // Every boundary edge has to be visible from p, otherwise
        // the triangle behind it joins the cavity
        let mut boundary = vec![];
        loop {
            boundary.clear();
            let mut extra = vec![];
            for &t in &cavity {
                for i in 0..3 {
                    let nb = self.tris[t].nb[i];
                    if nb.is_some_and(|x| self.mark[x] == stamp) {
                        continue;
                    }
                    if self.edge_orient(t, i, &p) <= self.orient_tol {
                        if let Some(x) = nb {
                            self.mark[x] = stamp;
                            extra.push(x);
                            continue;
                        }
                    }
                    let v = self.tris[t].v;
                    boundary.push((v[(i + 1) % 3], v[(i + 2) % 3], nb));
                }
            }
            if extra.is_empty() {
                break;
            }
            cavity.extend(extra);
        }

        for &t in &cavity {
            self.tris[t].alive = false;
        }

        // Fan of new triangles around p
        let first_new = self.tris.len();
        let mut by_first = FxHashMap::default();
        let mut by_second = FxHashMap::default();
        for (k, (a, b, outer)) in boundary.iter().enumerate() {
            let t = first_new + k;
            let mut tri = self.new_triangle([*a, *b, iv]);
            tri.nb[2] = *outer;
            if let Some(o) = outer {
                let o = &mut self.tris[*o];
                if let Some(j) = (0..3).find(|j| o.v[*j] != *a && o.v[*j] != *b) {
                    o.nb[j] = Some(t);
                }
            }
            by_first.insert(*a, t);
            by_second.insert(*b, t);
            self.tris.push(tri);
            self.mark.push(0);
        }
        for k in 0..boundary.len() {
            let (a, b, _) = boundary[k];
            let t = first_new + k;
            self.tris[t].nb[0] = by_first.get(&b).copied();
            self.tris[t].nb[1] = by_second.get(&a).copied();
        }
        Some(first_new)
    }
}

/// Delaunay triangulation of a planar point set.
///
/// Returns counterclockwise index triples into `points`.
pub(super) fn triangulate(points: &[Pos2]) -> Result<Vec<[usize; 3]>, MeshError> {
    let n = points.len();
    if n < 3 {
        return Err(MeshError::TooFewPoints(n));
    }

    let (mut lo, mut hi) = (points[0], points[0]);
    for p in points {
        lo = lo.inf(p);
        hi = hi.sup(p);
    }
    let d = (hi.x - lo.x).max(hi.y - lo.y);
    if !(d > 0.0) || !d.is_finite() {
        return Err(MeshError::Degenerate);
    }
    let c = nalgebra::center(&lo, &hi);

    // Enclosing super-triangle
    let mut verts = points.to_vec();
    verts.push(Pos2::new(c.x - 20.0 * d, c.y - d));
    verts.push(Pos2::new(c.x + 20.0 * d, c.y - d));
    verts.push(Pos2::new(c.x, c.y + 20.0 * d));

    let mut tr = Triangulation {
        verts,
        tris: vec![],
        mark: vec![],
        orient_tol: 1e-12 * d * d,
    };
    let sup = tr.new_triangle([n, n + 1, n + 2]);
    tr.tris.push(sup);
    tr.mark.push(0);

    let mut hint = 0;
    for i in 0..n {
        if let Some(t) = tr.insert(i, hint, i + 1) {
            hint = t;
        }
    }

    let simplices = tr
        .tris
        .iter()
        .filter(|t| t.alive && t.v.iter().all(|v| *v < n))
        .map(|t| t.v)
        .collect::<Vec<_>>();

    if simplices.is_empty() {
        return Err(MeshError::Degenerate);
    }
    Ok(simplices)
}
