use crate::composition::{Composition, CompositionError};
use crate::core::{Pos, Structure, Vector3d, PBC_XY};
use log::info;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdhereError {
    #[error("unclear lattice type: {0}")]
    UnknownLattice(String),

    #[error("{0} x {1} lattice can't hold {2} proteins")]
    LatticeTooSmall(usize, usize, usize),

    #[error("protein structure is empty")]
    EmptyProtein,

    #[error("no '{0}' residue left to replace")]
    NothingToReplace(String),

    #[error(transparent)]
    Ledger(#[from] CompositionError),

    #[error("can't read adhesion config")]
    ConfigRead(#[source] std::io::Error),

    #[error(transparent)]
    ConfigParse(#[from] toml::de::Error),
}

/// Arrangement of protein copies over the membrane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProteinLattice {
    Square,
    Triangle,
}

impl std::str::FromStr for ProteinLattice {
    type Err = AdhereError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "square" => Ok(Self::Square),
            "triangle" => Ok(Self::Triangle),
            _ => Err(AdhereError::UnknownLattice(s.to_owned())),
        }
    }
}

fn default_protein_name() -> String {
    "Protein".into()
}

fn default_lattice() -> String {
    "square".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdhereConfig {
    /// Title of the combined structure, the bilayer title if absent
    pub system_name: Option<String>,
    /// Name of the protein block in the composition ledger
    #[serde(default = "default_protein_name")]
    pub protein_name: String,
    pub total_proteins: usize,
    #[serde(default = "default_lattice")]
    pub lattice_type: String,
    pub space_scale: f64,
    pub ncols: usize,
    pub nrows: usize,
    pub z_shift: f64,
    /// Species losing its closest residue for each adhered copy
    pub replace_species: Option<String>,
}

impl AdhereConfig {
    pub fn from_file(fname: impl AsRef<Path>) -> Result<Self, AdhereError> {
        let s = std::fs::read_to_string(fname).map_err(AdhereError::ConfigRead)?;
        Ok(toml::from_str(&s)?)
    }

    /// Focal points of the lattice in its own frame
    pub fn lattice_points(&self) -> Result<Vec<(f64, f64)>, AdhereError> {
        let (ncols, nrows, total) = (self.ncols, self.nrows, self.total_proteins);
        if total > ncols * nrows {
            return Err(AdhereError::LatticeTooSmall(ncols, nrows, total));
        }
        let mut grid = (0..ncols * nrows)
            .map(|i| (i % ncols, i / ncols))
            .collect::<Vec<_>>();

        let (horz, vert, offset) = match self.lattice_type.parse()? {
            ProteinLattice::Square => {
                grid.truncate(total);
                (self.space_scale, self.space_scale, 0.0)
            }
            ProteinLattice::Triangle => {
                // Odd rows lose their last column first
                let mut scan = 1;
                while grid.len() > total {
                    let pos = grid
                        .iter()
                        .position(|p| *p == (ncols - 1, scan))
                        .ok_or(AdhereError::LatticeTooSmall(ncols, nrows, total))?;
                    grid.remove(pos);
                    scan += 2;
                }
                (
                    self.space_scale,
                    self.space_scale * 2f64.sqrt() / 2.0,
                    self.space_scale / 2.0,
                )
            }
        };

        Ok(grid
            .into_iter()
            .map(|(i, j)| (horz * i as f64 + (j % 2) as f64 * offset, vert * j as f64))
            .collect())
    }
}

/// Places copies of a protein over a bilayer.
///
/// The lattice is centered on the lateral center of the bilayer box at
/// height `z_shift`, each copy centered on its focal point. Copies come
/// first in the output. With `replace_species` set, the residue of that
/// species closest to each copy is removed and the ledger updated.
/// Residues and atoms are renumbered.
pub fn adhere_proteins(
    bilayer: &Structure,
    protein: &Structure,
    config: &AdhereConfig,
    ledger: &mut Composition,
) -> Result<Structure, AdhereError> {
    if protein.records.is_empty() {
        return Err(AdhereError::EmptyProtein);
    }
    let points = config.lattice_points()?;
    let n = points.len().max(1) as f64;
    let mean = points
        .iter()
        .fold((0.0, 0.0), |acc, p| (acc.0 + p.0 / n, acc.1 + p.1 / n));
    let center = bilayer.pbox.lateral_center(config.z_shift);
    let prot_center = protein.centroid(0..protein.records.len());

    let mut copies = vec![];
    let mut out = Structure::new(
        config.system_name.clone().unwrap_or_else(|| bilayer.title.clone()),
        bilayer.pbox,
    );
    for (x, y) in &points {
        let focus = center + Vector3d::new(x - mean.0, y - mean.1, 0.0);
        let shift = focus - prot_center;
        copies.push(focus);
        out.records.extend(protein.records.iter().map(|r| {
            let mut r = r.clone();
            r.pos += shift;
            r
        }));
    }
    info!(
        "Adhered {} copies of '{}' in a {} lattice",
        points.len(),
        config.protein_name,
        config.lattice_type
    );

    let mut lipids = bilayer.clone();
    if let Some(sp) = &config.replace_species {
        for focus in &copies {
            remove_closest(&mut lipids, sp, focus)?;
            ledger.subtract(sp, 1)?;
        }
        info!("Removed {} '{sp}' residues under the proteins", copies.len());
    }
    out.records.append(&mut lipids.records);
    out.renumber();
    ledger.prepend(&config.protein_name, points.len());
    Ok(out)
}

fn remove_closest(st: &mut Structure, species: &str, point: &Pos) -> Result<(), AdhereError> {
    let nearest = st
        .residues()
        .into_iter()
        .filter(|r| st.records[r.start].resname == species)
        .map(|r| {
            let d = st.pbox.distance(&st.centroid(r.clone()), point, PBC_XY);
            (r, d)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(r, _)| r)
        .ok_or_else(|| AdhereError::NothingToReplace(species.to_owned()))?;
    st.records.drain(nearest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::CompositionLedger;
    use crate::core::PeriodicBox;

    fn config(lattice: &str, total: usize) -> AdhereConfig {
        AdhereConfig {
            system_name: None,
            protein_name: "Protein".into(),
            total_proteins: total,
            lattice_type: lattice.into(),
            space_scale: 10.0,
            ncols: 2,
            nrows: 2,
            z_shift: 5.0,
            replace_species: Some("DOPC".into()),
        }
    }

    #[test]
    fn square_lattice() -> anyhow::Result<()> {
        let p = config("square", 3).lattice_points()?;
        assert_eq!(p, vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        assert!(matches!(
            config("square", 5).lattice_points(),
            Err(AdhereError::LatticeTooSmall(2, 2, 5))
        ));
        Ok(())
    }

    #[test]
    fn triangle_lattice() -> anyhow::Result<()> {
        let p = config("triangle", 3).lattice_points()?;
        let v = 10.0 * 2f64.sqrt() / 2.0;
        assert_eq!(p.len(), 3);
        assert_eq!(p[2], (5.0, v));
        assert!(matches!(
            config("hexagon", 3).lattice_points(),
            Err(AdhereError::UnknownLattice(_))
        ));
        Ok(())
    }

    #[test]
    fn adhesion_replaces_lipids() -> anyhow::Result<()> {
        let b = PeriodicBox::from_extents(20.0, 20.0, 20.0)?;
        let mut bilayer = Structure::new("membrane", b);
        let mut ledger = Composition::default();
        for i in 0..4 {
            for j in 0..4 {
                let p = Pos::new(i as f64 * 5.0, j as f64 * 5.0, 1.5);
                bilayer.push_molecule("DOPC", [("PO4", p), ("C1", p - Vector3d::z())]);
            }
        }
        ledger.record("DOPC", 16);

        let mut protein = Structure::new("prot", b);
        protein.push_molecule("ALA", [("BB", Pos::new(0.0, 0.0, 0.0))]);
        protein.push_molecule("GLY", [("BB", Pos::new(1.0, 0.0, 0.0))]);

        let out = adhere_proteins(&bilayer, &protein, &config("square", 4), &mut ledger)?;
        assert_eq!(out.title, "membrane");
        // 4 copies of 2 residues, 12 lipids left
        assert_eq!(out.last_resid(), 8 + 12);
        assert_eq!(out.num_atoms(), 8 + 24);
        assert_eq!(
            ledger.iter().collect::<Vec<_>>(),
            vec![("Protein", 4), ("DOPC", 12)]
        );
        // Copies are centered on the box center
        let c = out.centroid(0..8);
        assert!((c - Pos::new(10.0, 10.0, 5.0)).norm() < 1e-9);
        // Removed lipids are the ones under the focal points
        let removed = [(5.0, 5.0), (15.0, 5.0), (5.0, 15.0), (15.0, 15.0)];
        for r in &out.records[8..] {
            assert!(!removed.contains(&(r.pos.x, r.pos.y)));
        }
        Ok(())
    }
}
