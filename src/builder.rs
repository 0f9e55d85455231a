use crate::composition::{
    CompositionError, CompositionLedger, CompositionSampler, Fractions, MonolayerSpec,
};
use crate::core::{PeriodicBoxError, Structure};
use crate::io::GroHandlerError;
use crate::mesh::{GrowSize, Mesh, MeshBuilder, MeshError};
use crate::placement::{Leaflet, LipidPrototype, MoleculePlacer};
use crate::topography::{MidplaneGrid, Topography, TopographyError, TopographyGenerator};
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("can't read config file")]
    ConfigRead(#[source] std::io::Error),

    #[error(transparent)]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Topography(#[from] TopographyError),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Pbc(#[from] PeriodicBoxError),

    #[error("no prototype structure for species '{0}'")]
    MissingPrototype(String),

    #[error("can't load prototype of '{0}'")]
    Prototype(String, #[source] GroHandlerError),
}

fn default_system_name() -> String {
    "CGMD BILAYER".into()
}

fn default_shape() -> String {
    "flat".into()
}

fn default_aspect() -> f64 {
    1.0
}

fn default_growsize() -> f64 {
    0.2
}

fn default_true() -> bool {
    true
}

/// Parameters of a bilayer build, read from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BilayerConfig {
    #[serde(default = "default_system_name")]
    pub system_name: String,
    /// Directory with `<SPECIES>.gro` prototype files
    pub lipid_structures: Option<PathBuf>,
    /// flat, buckle or saddle
    #[serde(default = "default_shape")]
    pub shape: String,
    pub height: Option<f64>,
    pub width: Option<f64>,
    pub binsize: f64,
    pub monolayer_offset: f64,
    pub solvent_thickness: f64,
    #[serde(default = "default_aspect")]
    pub aspect: f64,
    /// Fixed box. Without it the box follows from the lipid count.
    pub box_size: Option<[f64; 3]>,
    pub monolayer_top: Option<usize>,
    pub composition_top: Fractions,
    pub monolayer_bottom: Option<usize>,
    pub composition_bottom: Option<Fractions>,
    #[serde(default = "default_true")]
    pub random_rotation: bool,
    pub seed: Option<u64>,
    #[serde(default = "default_growsize")]
    pub growsize: f64,
    pub growsize_nm: Option<f64>,
}

impl BilayerConfig {
    pub fn from_file(fname: impl AsRef<Path>) -> Result<Self, BuildError> {
        let s = std::fs::read_to_string(fname).map_err(BuildError::ConfigRead)?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Self, BuildError> {
        Ok(toml::from_str(s)?)
    }

    /// Random source of the build, reproducible only if a seed is set
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        }
    }

    pub fn is_asymmetric(&self) -> bool {
        self.composition_bottom.is_some()
    }

    fn growsize(&self) -> GrowSize {
        match self.growsize_nm {
            Some(d) => GrowSize::Absolute(d),
            None => GrowSize::Fraction(self.growsize),
        }
    }

    fn validate(&self) -> Result<(), BuildError> {
        match (&self.monolayer_bottom, &self.composition_bottom) {
            (Some(_), None) => Err(BuildError::Config(
                "monolayer_bottom given without composition_bottom".into(),
            )),
            (None, Some(_)) if self.monolayer_top.is_some() => Err(BuildError::Config(
                "composition_bottom given without monolayer_bottom".into(),
            )),
            _ if self.box_size.is_none() && self.monolayer_top.is_none() => Err(
                BuildError::Config("monolayer_top is required without box_size".into()),
            ),
            _ if !(self.aspect > 0.0) => Err(BuildError::Config(format!(
                "aspect {} is not positive",
                self.aspect
            ))),
            _ => Ok(()),
        }
    }
}

/// Assembled bilayer with the meshes of both monolayers.
pub struct Bilayer {
    pub structure: Structure,
    pub top: Mesh,
    pub bottom: Mesh,
}

/// Builds bilayers from a configuration and a set of prototypes.
pub struct BilayerBuilder {
    config: BilayerConfig,
    topography: Topography,
    generator: TopographyGenerator,
    prototypes: Vec<LipidPrototype>,
}

impl BilayerBuilder {
    pub fn new(config: BilayerConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let topography = Topography::from_tag(&config.shape, config.height, config.width)?;
        let generator = TopographyGenerator::new(config.binsize)?;
        Ok(Self {
            config,
            topography,
            generator,
            prototypes: vec![],
        })
    }

    pub fn config(&self) -> &BilayerConfig {
        &self.config
    }

    /// Adds a prototype, replacing the one of the same species
    pub fn with_prototype(mut self, proto: LipidPrototype) -> Self {
        self.prototypes.retain(|p| p.name() != proto.name());
        self.prototypes.push(proto);
        self
    }

    /// Species in registration order: top composition, then the species
    /// only present in the bottom one
    pub fn species(&self) -> Vec<String> {
        let mut v: Vec<String> = self.config.composition_top.species().map(String::from).collect();
        if let Some(bot) = &self.config.composition_bottom {
            for s in bot.species() {
                if !v.iter().any(|x| x == s) {
                    v.push(s.to_owned());
                }
            }
        }
        v
    }

    /// Reads missing prototypes from the `lipid_structures` directory
    pub fn load_prototypes(mut self) -> Result<Self, BuildError> {
        for sp in self.species() {
            if self.prototype(&sp).is_some() {
                continue;
            }
            let dir = self
                .config
                .lipid_structures
                .as_ref()
                .ok_or_else(|| BuildError::MissingPrototype(sp.clone()))?;
            let fname = dir.join(format!("{sp}.gro"));
            info!("Loading prototype of '{sp}' from '{}'", fname.display());
            let proto = LipidPrototype::from_file(sp.as_str(), &fname)
                .map_err(|e| BuildError::Prototype(sp.clone(), e))?;
            self.prototypes.push(proto);
        }
        Ok(self)
    }

    fn prototype(&self, species: &str) -> Option<&LipidPrototype> {
        self.prototypes.iter().find(|p| p.name() == species)
    }

    // Each monolayer gets its own grid unless the box grid is used untrimmed
    fn grids(&self, rng: &mut impl Rng) -> Result<(MidplaneGrid, Option<MidplaneGrid>), BuildError> {
        let c = &self.config;
        if let Some(box_size) = c.box_size {
            let top = self.generator.regular(box_size, c.monolayer_top, rng)?;
            let nbot = c.monolayer_bottom.or(c.monolayer_top);
            let bottom = if c.is_asymmetric() || nbot.is_some() {
                Some(self.generator.regular(box_size, nbot, rng)?)
            } else {
                None
            };
            Ok((top, bottom))
        } else {
            // Presence of the top count is checked on validation
            let ntop = c.monolayer_top.unwrap_or_default();
            let nbot = c.monolayer_bottom.unwrap_or(ntop);
            let mut top = self
                .generator
                .random_lipids(ntop, c.aspect, c.solvent_thickness, rng)?;
            let mut bot = self
                .generator
                .random_lipids(nbot, c.aspect, c.solvent_thickness, rng)?;
            let pbox = top.pbox.union(&bot.pbox);
            top.pbox = pbox;
            bot.pbox = pbox;
            Ok((top, Some(bot)))
        }
    }

    /// Assembles the bilayer and reports placed species to the ledger
    pub fn build(
        &self,
        rng: &mut impl Rng,
        ledger: &mut impl CompositionLedger,
    ) -> Result<Bilayer, BuildError> {
        let c = &self.config;
        info!(
            "Building {} bilayer, {}",
            self.topography.name(),
            if c.is_asymmetric() { "asymmetric" } else { "symmetric" }
        );

        let species = self.species();
        for sp in &species {
            if self.prototype(sp).is_none() {
                return Err(BuildError::MissingPrototype(sp.clone()));
            }
        }

        let (mut top, mut bottom) = self.grids(rng)?;
        let pbox = top.pbox;
        self.topography.apply(&mut top.points, &pbox);
        if let Some(bot) = bottom.as_mut() {
            self.topography.apply(&mut bot.points, &pbox);
        }
        let ext = pbox.get_box_extents();
        info!("Box size {:.3} x {:.3} x {:.3}", ext.x, ext.y, ext.z);

        let mesher = MeshBuilder::new(c.growsize());
        let (top_mesh, bottom_mesh) = match &bottom {
            Some(bot) => {
                let (t, b) = rayon::join(
                    || mesher.build(&top.points, &pbox),
                    || mesher.build(&bot.points, &pbox),
                );
                (t?, b?)
            }
            None => {
                let t = mesher.build(&top.points, &pbox)?;
                (t.clone(), t)
            }
        };

        let top_spec = MonolayerSpec {
            fractions: c.composition_top.clone(),
            total: top_mesh.num_vertices(),
        };
        let bottom_spec = MonolayerSpec {
            fractions: c
                .composition_bottom
                .clone()
                .unwrap_or_else(|| c.composition_top.clone()),
            total: bottom_mesh.num_vertices(),
        };
        let top_assign = CompositionSampler::sample(&top_spec, rng)?;
        let bottom_assign = CompositionSampler::sample(&bottom_spec, rng)?;
        info!(
            "Monolayer sites: {} top, {} bottom",
            top_spec.total, bottom_spec.total
        );

        let placer = MoleculePlacer::new(c.monolayer_offset, c.random_rotation);
        let mut structure = Structure::new(&c.system_name, pbox);
        let leaflets = [
            (Leaflet::Top, &top_mesh, &top_assign),
            (Leaflet::Bottom, &bottom_mesh, &bottom_assign),
        ];
        let mut placed = vec![];
        for sp in &species {
            let proto = self
                .prototype(sp)
                .ok_or_else(|| BuildError::MissingPrototype(sp.clone()))?;
            for (leaflet, mesh, assign) in leaflets {
                let sites = assign.bucket(sp);
                if sites.is_empty() {
                    continue;
                }
                placer.place_on_mesh(&mut structure, proto, mesh, &sites, leaflet, rng);
                info!("Placed {} '{sp}' in {} monolayer", sites.len(), leaflet.name());
                placed.push((sp.as_str(), sites.len()));
            }
        }
        for (sp, n) in placed {
            ledger.record(sp, n);
        }
        info!(
            "Bilayer assembled: {} residues, {} atoms",
            structure.last_resid(),
            structure.num_atoms()
        );

        Ok(Bilayer {
            structure,
            top: top_mesh,
            bottom: bottom_mesh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Composition;
    use crate::core::Pos;

    const CONFIG: &str = r#"
        shape = "flat"
        binsize = 1.0
        monolayer_offset = 1.5
        solvent_thickness = 10.0
        box_size = [8.0, 8.0, 10.0]
        seed = 3

        [composition_top]
        DOPC = 0.75
        DOPS = 0.25
    "#;

    fn lipid(name: &str) -> LipidPrototype {
        LipidPrototype::new(
            name,
            vec![
                ("HEAD".into(), Pos::new(0.0, 0.0, 1.0)),
                ("TAIL".into(), Pos::new(0.0, 0.0, -1.0)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn config_defaults() -> anyhow::Result<()> {
        let c = BilayerConfig::from_toml(CONFIG)?;
        assert_eq!(c.system_name, "CGMD BILAYER");
        assert_eq!(c.aspect, 1.0);
        assert!(c.random_rotation);
        assert!(!c.is_asymmetric());
        assert_eq!(c.growsize(), GrowSize::Fraction(0.2));
        Ok(())
    }

    #[test]
    fn config_errors() -> anyhow::Result<()> {
        let c = BilayerConfig::from_toml(&format!("shape2 = 1\n{CONFIG}"));
        assert!(matches!(c, Err(BuildError::ConfigParse(_))));

        let mut c = BilayerConfig::from_toml(CONFIG)?;
        c.shape = "tube".into();
        assert!(matches!(
            BilayerBuilder::new(c),
            Err(BuildError::Topography(TopographyError::UnknownShape(_)))
        ));

        let mut c = BilayerConfig::from_toml(CONFIG)?;
        c.monolayer_bottom = Some(10);
        assert!(matches!(BilayerBuilder::new(c), Err(BuildError::Config(_))));

        let mut c = BilayerConfig::from_toml(CONFIG)?;
        c.box_size = None;
        assert!(matches!(BilayerBuilder::new(c), Err(BuildError::Config(_))));
        Ok(())
    }

    #[test]
    fn species_grouped_output() -> anyhow::Result<()> {
        let c = BilayerConfig::from_toml(CONFIG)?;
        let mut rng = c.rng();
        let b = BilayerBuilder::new(c)?
            .with_prototype(lipid("DOPC"))
            .with_prototype(lipid("DOPS"));
        let mut ledger = Composition::default();
        let bil = b.build(&mut rng, &mut ledger)?;

        // 64 sites per leaflet, 48 DOPC and 16 DOPS each
        assert_eq!(
            ledger.iter().collect::<Vec<_>>(),
            vec![("DOPC", 96), ("DOPS", 32)]
        );
        let s = &bil.structure;
        assert_eq!(s.last_resid(), 128);
        assert_eq!(s.num_atoms(), 256);
        // DOPC block comes first in both leaflets
        assert!(s.records[..192].iter().all(|r| r.resname == "DOPC"));
        assert!(s.records[192..].iter().all(|r| r.resname == "DOPS"));
        // First 48 DOPC are in the top leaflet
        assert!(s.records[..96].iter().all(|r| r.pos.z > 0.0));
        assert!(s.records[96..192].iter().all(|r| r.pos.z < 0.0));
        Ok(())
    }

    #[derive(Default)]
    struct Calls(Vec<(String, usize)>);

    impl CompositionLedger for Calls {
        fn record(&mut self, species: &str, count: usize) -> usize {
            self.0.push((species.to_owned(), count));
            count
        }
    }

    #[test]
    fn ledger_once_per_leaflet() -> anyhow::Result<()> {
        let c = BilayerConfig::from_toml(CONFIG)?;
        let mut rng = c.rng();
        let b = BilayerBuilder::new(c)?
            .with_prototype(lipid("DOPC"))
            .with_prototype(lipid("DOPS"));
        let mut calls = Calls::default();
        b.build(&mut rng, &mut calls)?;
        let expected = [("DOPC", 48), ("DOPC", 48), ("DOPS", 16), ("DOPS", 16)];
        assert_eq!(calls.0.len(), expected.len());
        for ((s, n), (es, en)) in calls.0.iter().zip(expected) {
            assert_eq!((s.as_str(), *n), (es, en));
        }
        Ok(())
    }

    #[test]
    fn trimmed_box_leaflets_differ() -> anyhow::Result<()> {
        let mut c = BilayerConfig::from_toml(CONFIG)?;
        c.monolayer_top = Some(50);
        let mut rng = c.rng();
        let b = BilayerBuilder::new(c)?
            .with_prototype(lipid("DOPC"))
            .with_prototype(lipid("DOPS"));
        let bil = b.build(&mut rng, &mut Composition::default())?;
        assert_eq!(bil.top.num_vertices(), 50);
        assert_eq!(bil.bottom.num_vertices(), 50);
        assert_ne!(bil.top.points(), bil.bottom.points());
        Ok(())
    }

    #[test]
    fn missing_prototype() -> anyhow::Result<()> {
        let c = BilayerConfig::from_toml(CONFIG)?;
        let mut rng = c.rng();
        let b = BilayerBuilder::new(c)?.with_prototype(lipid("DOPC"));
        let res = b.build(&mut rng, &mut Composition::default());
        assert!(matches!(res, Err(BuildError::MissingPrototype(s)) if s == "DOPS"));
        assert!(matches!(b.load_prototypes(), Err(BuildError::MissingPrototype(_))));
        Ok(())
    }
}
