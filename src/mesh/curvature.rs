use crate::core::{Matrix3d, Pos, Vector3d};

/// Discrete shape operator at a single vertex.
///
/// `around` lists the simplices touching the vertex. Returns the two raw
/// diagonal values of the reflected tensor together with the list of
/// triangulated neighbours of the vertex.
#[allow(non_snake_case)]
pub(super) fn shape_operator(
    v: usize,
    points: &[Pos],
    simplices: &[[usize; 3]],
    areas: &[f64],
    around: &[usize],
    normal: &Vector3d,
) -> ([f64; 2], Vec<usize>) {
    let mut neib = around
        .iter()
        .flat_map(|s| simplices[*s])
        .filter(|i| *i != v)
        .collect::<Vec<_>>();
    neib.sort_unstable();
    neib.dedup();

    let total_area: f64 = around.iter().map(|s| areas[*s]).sum();

    /*
    Tensor accumulated over the edges v->j:
        M = sum_j w_j * k_j * T_j T_j^t
    w_j is the share of area of the two triangles sharing the edge,
    k_j = 2 n.e / |e|^2 is the normal curvature along the edge,
    T_j is the unit projection of the edge onto the tangent plane.
    */
    let proj = Matrix3d::identity() - normal * normal.transpose();
    let mut M = Matrix3d::zeros();
    for j in &neib {
        let w = around
            .iter()
            .filter(|s| simplices[**s].contains(j))
            .map(|s| areas[*s])
            .sum::<f64>()
            / (2.0 * total_area);
        let e = points[*j] - points[v];
        let k = 2.0 * normal.dot(&e) / e.norm_squared();
        if let Some(t) = (proj * e).try_normalize(f64::MIN_POSITIVE) {
            M += w * k * t * t.transpose();
        }
    }

    /*
    Householder reflection taking the normal onto the x axis:
        W = (e1 +- n) / |e1 +- n|, sign chosen to maximise the norm
        H = I - 2 W W^t
    In the reflected frame the first row and column of H^t M H vanish and
    the remaining diagonal holds the curvature values.
    */
    let e1 = Vector3d::x();
    let s = if (e1 + normal).norm() < (e1 - normal).norm() {
        -1.0
    } else {
        1.0
    };
    let W = (e1 + normal * s).normalize();
    let H = Matrix3d::identity() - 2.0 * W * W.transpose();
    let HMH = H.transpose() * M * H;

    ([-HMH[(1, 1)], -HMH[(2, 2)]], neib)
}
