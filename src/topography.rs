use crate::core::{PeriodicBox, PeriodicBoxError, Pos};
use log::debug;
use rand::Rng;
use std::{f64::consts::PI, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopographyError {
    #[error("unknown topography '{0}', expected flat, buckle or saddle")]
    UnknownShape(String),

    #[error("topography '{0}' requires parameter '{1}'")]
    MissingParameter(&'static str, &'static str),

    #[error("bin size {0} is not positive")]
    BadBinsize(f64),

    #[error("box of {0} x {1} bins holds fewer than {2} sites")]
    Overfull(usize, usize, usize),

    #[error("grid has no sites")]
    Empty,

    #[error(transparent)]
    Pbc(#[from] PeriodicBoxError),
}

/// Macroscopic shape imposed on the midplane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Topography {
    Flat,
    Buckle { height: f64 },
    Saddle { height: f64, width: f64 },
}

impl FromStr for Topography {
    type Err = TopographyError;
    /// Parses a bare tag. Shapes with parameters get zero height here,
    /// use [Topography::from_tag] to supply them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "buckle" => Ok(Self::Buckle { height: 0.0 }),
            "saddle" => Ok(Self::Saddle {
                height: 0.0,
                width: 1.0,
            }),
            _ => Err(TopographyError::UnknownShape(s.to_owned())),
        }
    }
}

impl Topography {
    pub fn from_tag(
        tag: &str,
        height: Option<f64>,
        width: Option<f64>,
    ) -> Result<Self, TopographyError> {
        use TopographyError::MissingParameter;
        Ok(match tag.parse()? {
            Self::Flat => Self::Flat,
            Self::Buckle { .. } => Self::Buckle {
                height: height.ok_or(MissingParameter("buckle", "height"))?,
            },
            Self::Saddle { .. } => Self::Saddle {
                height: height.ok_or(MissingParameter("saddle", "height"))?,
                width: width.ok_or(MissingParameter("saddle", "width"))?,
            },
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Buckle { .. } => "buckle",
            Self::Saddle { .. } => "saddle",
        }
    }

    /// Height of the midplane above the lateral point (x,y)
    pub fn height_at(&self, x: f64, y: f64, pbox: &PeriodicBox) -> f64 {
        let ext = pbox.get_box_extents();
        match *self {
            Self::Flat => 0.0,
            Self::Buckle { height } => height * (2.0 * PI * x / ext.x).sin(),
            Self::Saddle { height, width } => {
                let (cx, cy) = (0.5 * ext.x, 0.5 * ext.y);
                let (ox, oy) = (cx - 2.0, cy - 2.0);
                let bump = |x0: f64, y0: f64| {
                    (-(x - x0).powi(2) / (2.0 * width * width)).exp()
                        * (-(y - y0).powi(2) / (2.0 * width * width)).exp()
                };
                height
                    * (bump(cx, cy + oy) + bump(cx, cy - oy)
                        - bump(cx + ox, cy)
                        - bump(cx - ox, cy))
            }
        }
    }

    /// Displaces z of every point according to the shape
    pub fn apply(&self, points: &mut [Pos], pbox: &PeriodicBox) {
        if *self == Self::Flat {
            return;
        }
        for p in points.iter_mut() {
            p.z = self.height_at(p.x, p.y, pbox);
        }
    }
}

/// Flat lattice of midplane sites together with its periodic box.
#[derive(Debug, Clone)]
pub struct MidplaneGrid {
    pub points: Vec<Pos>,
    pub pbox: PeriodicBox,
}

/// Generates undeformed midplane lattices.
#[derive(Debug, Clone)]
pub struct TopographyGenerator {
    binsize: f64,
}

impl TopographyGenerator {
    pub fn new(binsize: f64) -> Result<Self, TopographyError> {
        if !(binsize > 0.0) || !binsize.is_finite() {
            return Err(TopographyError::BadBinsize(binsize));
        }
        Ok(Self { binsize })
    }

    /// Lattice filling the given box.
    ///
    /// The number of bins along each lateral axis is the box extent over
    /// the bin size, rounded. With `count` the lattice is randomly thinned
    /// to exactly that many sites.
    pub fn regular(
        &self,
        box_size: [f64; 3],
        count: Option<usize>,
        rng: &mut impl Rng,
    ) -> Result<MidplaneGrid, TopographyError> {
        let pbox = PeriodicBox::from_extents(box_size[0], box_size[1], box_size[2])?;
        let m = (box_size[0] / self.binsize).round() as usize;
        let n = (box_size[1] / self.binsize).round() as usize;
        if m * n == 0 {
            return Err(TopographyError::Empty);
        }

        let (dx, dy) = (box_size[0] / m as f64, box_size[1] / n as f64);
        let mut points = Vec::with_capacity(m * n);
        for i in 0..m {
            for j in 0..n {
                points.push(Pos::new(i as f64 * dx, j as f64 * dy, 0.0));
            }
        }

        if let Some(total) = count {
            if total > m * n {
                return Err(TopographyError::Overfull(m, n, total));
            }
            points = thin_out(points, total, rng)?;
        }
        debug!("regular {m} x {n} grid, {} sites", points.len());
        Ok(MidplaneGrid { points, pbox })
    }

    /// Smallest lattice with the given aspect ratio holding `total` sites,
    /// randomly thinned down to exactly `total`.
    pub fn random_lipids(
        &self,
        total: usize,
        aspect: f64,
        thickness: f64,
        rng: &mut impl Rng,
    ) -> Result<MidplaneGrid, TopographyError> {
        if total == 0 {
            return Err(TopographyError::Empty);
        }
        let side_y = (total as f64 / aspect).sqrt().ceil() as usize;
        let side_x = (aspect * side_y as f64).ceil() as usize;

        let mut points = Vec::with_capacity(side_x * side_y);
        for i in 0..side_x {
            for j in 0..side_y {
                points.push(Pos::new(
                    i as f64 * self.binsize,
                    j as f64 * self.binsize,
                    0.0,
                ));
            }
        }
        let points = thin_out(points, total, rng)?;

        let pbox = PeriodicBox::from_extents(
            side_x as f64 * self.binsize,
            side_y as f64 * self.binsize,
            thickness,
        )?;
        debug!("random lipid grid {side_x} x {side_y}, {total} sites");
        Ok(MidplaneGrid { points, pbox })
    }
}

// Keeps `total` randomly chosen points in their original order
fn thin_out(
    points: Vec<Pos>,
    total: usize,
    rng: &mut impl Rng,
) -> Result<Vec<Pos>, TopographyError> {
    if total == 0 {
        return Err(TopographyError::Empty);
    }
    if total >= points.len() {
        return Ok(points);
    }
    let mut keep = rand::seq::index::sample(rng, points.len(), total).into_vec();
    keep.sort_unstable();
    Ok(keep.into_iter().map(|i| points[i]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn tags() {
        assert_eq!(Topography::from_tag("flat", None, None).unwrap(), Topography::Flat);
        assert!(matches!(
            Topography::from_tag("sphere", None, None),
            Err(TopographyError::UnknownShape(_))
        ));
        assert!(matches!(
            Topography::from_tag("saddle", Some(8.0), None),
            Err(TopographyError::MissingParameter("saddle", "width"))
        ));
        assert!(matches!(
            Topography::from_tag("buckle", Some(2.0), None),
            Ok(Topography::Buckle { height }) if height == 2.0
        ));
    }

    #[test]
    fn regular_grid() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(1);
        let g = TopographyGenerator::new(1.0)?.regular([10.0, 10.0, 10.0], None, &mut rng)?;
        assert_eq!(g.points.len(), 100);
        assert!(g.points.iter().all(|p| p.x < 10.0 && p.y < 10.0 && p.z == 0.0));

        // Non-integer ratio is rounded and spacing stretched to the box
        let g = TopographyGenerator::new(1.0)?.regular([10.4, 5.0, 10.0], None, &mut rng)?;
        assert_eq!(g.points.len(), 50);
        assert!((g.points[5].x - 1.04).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn regular_grid_thinned() -> anyhow::Result<()> {
        let gen = TopographyGenerator::new(1.0)?;
        let g1 = gen.regular([10.0, 10.0, 10.0], Some(73), &mut StdRng::seed_from_u64(5))?;
        let g2 = gen.regular([10.0, 10.0, 10.0], Some(73), &mut StdRng::seed_from_u64(5))?;
        assert_eq!(g1.points.len(), 73);
        assert_eq!(g1.points, g2.points);

        let res = gen.regular([10.0, 10.0, 10.0], Some(101), &mut StdRng::seed_from_u64(5));
        assert!(matches!(res, Err(TopographyError::Overfull(10, 10, 101))));
        Ok(())
    }

    #[test]
    fn random_lipids_aspect() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(3);
        let g = TopographyGenerator::new(0.8)?.random_lipids(200, 2.0, 12.0, &mut rng)?;
        assert_eq!(g.points.len(), 200);
        let ext = g.pbox.get_box_extents();
        assert!((ext.x / ext.y - 2.0).abs() * ext.y <= 0.8 + 1e-9);
        assert_eq!(ext.z, 12.0);
        Ok(())
    }

    #[test]
    fn buckle_profile() -> anyhow::Result<()> {
        let b = PeriodicBox::from_extents(20.0, 10.0, 10.0)?;
        let t = Topography::Buckle { height: 2.0 };
        assert!((t.height_at(5.0, 3.0, &b) - 2.0).abs() < 1e-12);
        assert!((t.height_at(15.0, 3.0, &b) + 2.0).abs() < 1e-12);
        assert!(t.height_at(10.0, 3.0, &b).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn saddle_bumps() -> anyhow::Result<()> {
        let b = PeriodicBox::from_extents(35.0, 35.0, 50.0)?;
        let t = Topography::Saddle {
            height: 8.0,
            width: 10.0,
        };
        // Raised along y, lowered along x
        assert!(t.height_at(17.5, 33.0, &b) > 6.0);
        assert!(t.height_at(17.5, 2.0, &b) > 6.0);
        assert!(t.height_at(33.0, 17.5, &b) < -6.0);
        assert!(t.height_at(2.0, 17.5, &b) < -6.0);
        assert!(t.height_at(17.5, 17.5, &b).abs() < 1e-9);
        Ok(())
    }
}
