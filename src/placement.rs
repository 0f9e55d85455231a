use crate::core::{Pos, Structure, Vector3d};
use crate::io::GroHandlerError;
use crate::mesh::Mesh;
use nalgebra::Rotation3;
use rand::Rng;
use std::{f64::consts::PI, path::Path};

/// Canonical atom listing of one species, centered at its centroid.
#[derive(Debug, Clone)]
pub struct LipidPrototype {
    name: String,
    atoms: Vec<(String, Vector3d)>,
}

impl LipidPrototype {
    /// Creates a prototype from atom names and positions.
    /// Returns None if there are no atoms.
    pub fn new(name: impl Into<String>, atoms: Vec<(String, Pos)>) -> Option<Self> {
        if atoms.is_empty() {
            return None;
        }
        let center = atoms
            .iter()
            .fold(Vector3d::zeros(), |acc, (_, p)| acc + p.coords)
            / atoms.len() as f64;
        Some(Self {
            name: name.into(),
            atoms: atoms
                .into_iter()
                .map(|(n, p)| (n, p.coords - center))
                .collect(),
        })
    }

    /// Reads the prototype of species `name` from a GRO file
    pub fn from_file(name: impl Into<String>, fname: impl AsRef<Path>) -> Result<Self, GroHandlerError> {
        let st = Structure::from_file(fname)?;
        let atoms = st.records.into_iter().map(|r| (r.name, r.pos)).collect();
        Self::new(name, atoms).ok_or(GroHandlerError::MissingAtoms(1, 0))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn iter_atoms(&self) -> impl Iterator<Item = (&str, &Vector3d)> {
        self.atoms.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// One of the two monolayers of a bilayer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaflet {
    Top,
    Bottom,
}

impl Leaflet {
    /// Direction of the molecules along the mesh normal
    pub fn sign(&self) -> f64 {
        match self {
            Self::Top => 1.0,
            Self::Bottom => -1.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

/// Rotation taking +z onto `dir`.
///
/// Antiparallel directions give a half turn about x.
pub fn rotation_onto(dir: &Vector3d) -> Rotation3<f64> {
    Rotation3::rotation_between(&Vector3d::z(), dir)
        .unwrap_or_else(|| Rotation3::from_axis_angle(&Vector3d::x_axis(), PI))
}

/// Places copies of prototypes onto mesh sites.
#[derive(Debug, Clone)]
pub struct MoleculePlacer {
    offset: f64,
    random_rotation: bool,
}

impl MoleculePlacer {
    pub fn new(offset: f64, random_rotation: bool) -> Self {
        Self {
            offset,
            random_rotation,
        }
    }

    /// Appends one molecule standing on `site` along the leaflet direction
    /// of `normal`. Returns its residue number.
    pub fn place(
        &self,
        out: &mut Structure,
        proto: &LipidPrototype,
        site: &Pos,
        normal: &Vector3d,
        leaflet: Leaflet,
        rng: &mut impl Rng,
    ) -> usize {
        let dir = normal * leaflet.sign();
        let mut rot = rotation_onto(&dir);
        if self.random_rotation {
            let spin = Rotation3::from_axis_angle(&Vector3d::z_axis(), rng.gen_range(0.0..2.0 * PI));
            rot *= spin;
        }
        let center = site + dir * self.offset;
        out.push_molecule(
            proto.name(),
            proto.iter_atoms().map(|(n, v)| (n, center + rot * v)),
        )
    }

    /// Places one molecule per listed mesh vertex, in the listed order
    pub fn place_on_mesh(
        &self,
        out: &mut Structure,
        proto: &LipidPrototype,
        mesh: &Mesh,
        sites: &[usize],
        leaflet: Leaflet,
        rng: &mut impl Rng,
    ) {
        for i in sites {
            self.place(
                out,
                proto,
                &mesh.points()[*i],
                mesh.vertex_normal(*i),
                leaflet,
                rng,
            );
        }
    }
}
