use crate::core::Structure;
use log::warn;
use rand::{seq::SliceRandom, Rng};
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("composition is empty")]
    Empty,

    #[error("species '{0}' has invalid fraction {1}")]
    BadFraction(String, f64),

    #[error("species '{0}' listed twice")]
    Duplicate(String),

    #[error("can't remove {1} '{0}' molecules, only {2} present")]
    Shortfall(String, usize, usize),
}

//==============================================================
// Target composition
//==============================================================

/// Species and their relative amounts in the order of declaration.
///
/// Deserializes from a map `{ SPECIES = fraction, ... }` keeping the
/// document order, which becomes the species registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fractions(Vec<(String, f64)>);

impl Fractions {
    pub fn new(entries: impl IntoIterator<Item = (impl Into<String>, f64)>) -> Self {
        Self(entries.into_iter().map(|(s, f)| (s.into(), f)).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(s, f)| (s.as_str(), *f))
    }

    pub fn species(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(s, _)| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn validate(&self) -> Result<(), CompositionError> {
        if self.0.is_empty() {
            return Err(CompositionError::Empty);
        }
        for (i, (s, f)) in self.0.iter().enumerate() {
            if !(*f > 0.0) || !f.is_finite() {
                return Err(CompositionError::BadFraction(s.clone(), *f));
            }
            if self.0[..i].iter().any(|(other, _)| other == s) {
                return Err(CompositionError::Duplicate(s.clone()));
            }
        }
        Ok(())
    }
}

struct FractionsVisitor;

impl<'de> Visitor<'de> for FractionsVisitor {
    type Value = Fractions;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a table of species names and fractions")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut v = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((k, f)) = map.next_entry::<String, f64>()? {
            v.push((k, f));
        }
        Ok(Fractions(v))
    }
}

impl<'de> Deserialize<'de> for Fractions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FractionsVisitor)
    }
}

/// Composition of one monolayer
#[derive(Debug, Clone, PartialEq)]
pub struct MonolayerSpec {
    pub fractions: Fractions,
    pub total: usize,
}

//==============================================================
// Sampling
//==============================================================

/// Random assignment of species to monolayer sites.
#[derive(Debug, Clone)]
pub struct Assignment {
    species: Vec<String>,
    // Species index for each site
    ids: Vec<usize>,
}

impl Assignment {
    pub fn num_sites(&self) -> usize {
        self.ids.len()
    }

    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn species_of(&self, site: usize) -> &str {
        &self.species[self.ids[site]]
    }

    /// Sites of the given species in increasing order
    pub fn bucket(&self, species: &str) -> Vec<usize> {
        match self.species.iter().position(|s| s == species) {
            Some(k) => (0..self.ids.len()).filter(|i| self.ids[*i] == k).collect(),
            None => vec![],
        }
    }

    /// Sites of every species, in species order
    pub fn buckets(&self) -> Vec<Vec<usize>> {
        let mut b = vec![vec![]; self.species.len()];
        for (site, id) in self.ids.iter().enumerate() {
            b[*id].push(site);
        }
        b
    }
}

pub struct CompositionSampler;

impl CompositionSampler {
    /// Integer species counts summing exactly to the monolayer total.
    ///
    /// Each count is the rounded share of the total; the rounding surplus
    /// or deficit is settled by largest remainder.
    pub fn counts(spec: &MonolayerSpec) -> Result<Vec<usize>, CompositionError> {
        spec.fractions.validate()?;
        let sum: f64 = spec.fractions.iter().map(|(_, f)| f).sum();
        if (sum - 1.0).abs() > 1e-9 {
            warn!("composition fractions sum to {sum}, renormalizing");
        }

        let n = spec.total as f64;
        let raw = spec
            .fractions
            .iter()
            .map(|(_, f)| f / sum * n)
            .collect::<Vec<_>>();
        let mut counts = raw.iter().map(|r| r.round() as i64).collect::<Vec<_>>();
        let diff = spec.total as i64 - counts.iter().sum::<i64>();

        let mut order = (0..raw.len()).collect::<Vec<_>>();
        let rem = |i: usize| raw[i] - raw[i].round();
        if diff > 0 {
            order.sort_by(|a, b| rem(*b).total_cmp(&rem(*a)));
        } else {
            order.sort_by(|a, b| rem(*a).total_cmp(&rem(*b)));
        }
        for i in order.into_iter().take(diff.unsigned_abs() as usize) {
            counts[i] += diff.signum();
        }

        Ok(counts.into_iter().map(|c| c as usize).collect())
    }

    /// Shuffled species identity for each of the `spec.total` sites
    pub fn sample(spec: &MonolayerSpec, rng: &mut impl Rng) -> Result<Assignment, CompositionError> {
        let counts = Self::counts(spec)?;
        let mut ids = Vec::with_capacity(spec.total);
        for (k, c) in counts.iter().enumerate() {
            ids.extend(std::iter::repeat(k).take(*c));
        }
        ids.shuffle(rng);
        Ok(Assignment {
            species: spec.fractions.species().map(String::from).collect(),
            ids,
        })
    }
}

//==============================================================
// Ledger of placed molecules
//==============================================================

/// Receiver of realized molecule counts.
pub trait CompositionLedger {
    /// Registers `count` molecules of `species`, returns the running total
    /// of the current block of this species
    fn record(&mut self, species: &str, count: usize) -> usize;
}

/// Ordered list of molecule blocks as they appear in the structure.
///
/// Consecutive records of the same species merge into one block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composition {
    blocks: Vec<(String, usize)>,
}

impl CompositionLedger for Composition {
    fn record(&mut self, species: &str, count: usize) -> usize {
        match self.blocks.last_mut() {
            Some((s, c)) if *s == species => {
                *c += count;
                *c
            }
            _ => {
                self.blocks.push((species.to_owned(), count));
                count
            }
        }
    }
}

impl Composition {
    /// Ledger of the residues already present in a structure
    pub fn from_structure(st: &Structure) -> Self {
        let mut c = Self::default();
        for r in st.residues() {
            c.record(&st.records[r.start].resname, 1);
        }
        c
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.blocks.iter().map(|(s, c)| (s.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total number of molecules of the species over all blocks
    pub fn count(&self, species: &str) -> usize {
        self.iter().filter(|(s, _)| *s == species).map(|(_, c)| c).sum()
    }

    /// Inserts a block in front of all others
    pub fn prepend(&mut self, species: &str, count: usize) {
        match self.blocks.first_mut() {
            Some((s, c)) if *s == species => *c += count,
            _ => self.blocks.insert(0, (species.to_owned(), count)),
        }
    }

    /// Removes molecules of the species starting from its last block.
    /// Emptied blocks are dropped.
    pub fn subtract(&mut self, species: &str, count: usize) -> Result<(), CompositionError> {
        let present = self.count(species);
        if present < count {
            return Err(CompositionError::Shortfall(
                species.to_owned(),
                count,
                present,
            ));
        }
        let mut left = count;
        for (s, c) in self.blocks.iter_mut().rev() {
            if left == 0 {
                break;
            }
            if *s == species {
                let d = left.min(*c);
                *c -= d;
                left -= d;
            }
        }
        self.blocks.retain(|(_, c)| *c > 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn spec(f: &[(&str, f64)], total: usize) -> MonolayerSpec {
        MonolayerSpec {
            fractions: Fractions::new(f.iter().copied()),
            total,
        }
    }

    #[test]
    fn equal_halves() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(42);
        let a = CompositionSampler::sample(&spec(&[("A", 0.5), ("B", 0.5)], 50), &mut rng)?;
        let b = a.buckets();
        assert!((b[0].len() as i64 - 25).abs() <= 1);
        assert_eq!(b[0].len() + b[1].len(), 50);
        assert_eq!(a.bucket("A"), b[0]);
        Ok(())
    }

    #[test]
    fn partition_is_exhaustive() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(11);
        let cases: &[(&[(&str, f64)], usize)] = &[
            (&[("A", 1.0), ("B", 1.0), ("C", 1.0)], 100),
            (&[("A", 0.7), ("B", 0.2), ("C", 0.1)], 7),
            (&[("A", 3.0), ("B", 5.0)], 1),
            (&[("A", 0.15), ("B", 0.15), ("C", 0.15), ("D", 0.55)], 33),
        ];
        for (f, total) in cases {
            let s = spec(f, *total);
            let a = CompositionSampler::sample(&s, &mut rng)?;
            let sum: f64 = f.iter().map(|(_, x)| x).sum();

            let mut seen = vec![0; *total];
            for (k, b) in a.buckets().iter().enumerate() {
                let target = (f[k].1 / sum * *total as f64).round() as i64;
                assert!((b.len() as i64 - target).abs() <= 1);
                for i in b {
                    seen[*i] += 1;
                }
            }
            assert!(seen.iter().all(|n| *n == 1));
            assert_eq!(a.num_sites(), *total);
            for (k, b) in a.buckets().iter().enumerate() {
                assert!(b.iter().all(|i| a.species_of(*i) == a.species()[k]));
            }
        }
        Ok(())
    }

    #[test]
    fn largest_remainder() -> anyhow::Result<()> {
        // Three thirds of 100 round to 33 each
        let c = CompositionSampler::counts(&spec(&[("A", 1.0), ("B", 1.0), ("C", 1.0)], 100))?;
        assert_eq!(c.iter().sum::<usize>(), 100);
        // Four halves of 2 round up to 1 each
        let c = CompositionSampler::counts(&spec(&[("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0)], 2))?;
        assert_eq!(c.iter().sum::<usize>(), 2);
        assert!(c.iter().all(|x| *x <= 1));
        Ok(())
    }

    #[test]
    fn bad_compositions() {
        assert!(matches!(
            CompositionSampler::counts(&spec(&[], 10)),
            Err(CompositionError::Empty)
        ));
        assert!(matches!(
            CompositionSampler::counts(&spec(&[("A", 1.0), ("B", -0.1)], 10)),
            Err(CompositionError::BadFraction(_, _))
        ));
        assert!(matches!(
            CompositionSampler::counts(&spec(&[("A", 1.0), ("A", 1.0)], 10)),
            Err(CompositionError::Duplicate(_))
        ));
    }

    #[test]
    fn seeded_sampling_repeats() -> anyhow::Result<()> {
        let s = spec(&[("A", 0.3), ("B", 0.7)], 40);
        let a1 = CompositionSampler::sample(&s, &mut StdRng::seed_from_u64(9))?;
        let a2 = CompositionSampler::sample(&s, &mut StdRng::seed_from_u64(9))?;
        assert_eq!(a1.buckets(), a2.buckets());
        Ok(())
    }

    #[test]
    fn fractions_keep_order() -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct Doc {
            comp: Fractions,
        }
        let doc: Doc = toml::from_str("[comp]\nPOPC = 0.6\nDOPS = 0.1\nCHOL = 0.3\n")?;
        assert_eq!(
            doc.comp.species().collect::<Vec<_>>(),
            vec!["POPC", "DOPS", "CHOL"]
        );
        Ok(())
    }

    #[test]
    fn ledger_blocks() -> anyhow::Result<()> {
        let mut c = Composition::default();
        assert_eq!(c.record("DOPC", 100), 100);
        assert_eq!(c.record("DOPC", 90), 190);
        c.record("DOPS", 10);
        c.prepend("PROT", 2);
        assert_eq!(
            c.iter().collect::<Vec<_>>(),
            vec![("PROT", 2), ("DOPC", 190), ("DOPS", 10)]
        );
        c.subtract("DOPS", 10)?;
        c.subtract("DOPC", 2)?;
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![("PROT", 2), ("DOPC", 188)]);
        assert!(c.subtract("DOPC", 1000).is_err());
        Ok(())
    }

    #[test]
    fn ledger_from_structure() -> anyhow::Result<()> {
        use crate::core::{PeriodicBox, Pos};
        let mut st = Structure::new("t", PeriodicBox::from_extents(5.0, 5.0, 5.0)?);
        for name in ["PROT", "DOPC", "DOPC", "DOPS", "DOPC"] {
            st.push_molecule(name, [("A", Pos::origin()), ("B", Pos::origin())]);
        }
        let c = Composition::from_structure(&st);
        assert_eq!(
            c.iter().collect::<Vec<_>>(),
            vec![("PROT", 1), ("DOPC", 2), ("DOPS", 1), ("DOPC", 1)]
        );
        assert_eq!(c.count("DOPC"), 3);
        Ok(())
    }
}
