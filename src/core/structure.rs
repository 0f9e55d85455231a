use super::{PeriodicBox, Pos};
use std::ops::Range;

/// One atom of an assembled system.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRecord {
    /// Residue number, 1-based and contiguous for placed molecules.
    pub resid: usize,
    /// Residue name, the species name for lipids.
    pub resname: String,
    /// Atom name.
    pub name: String,
    /// Global atom index, 1-based.
    pub index: usize,
    pub pos: Pos,
}

/// Listing of atoms with a title and a periodic box.
///
/// Records are stored in output order. Molecules are appended with
/// running residue and atom counters.
#[derive(Debug, Clone)]
pub struct Structure {
    pub title: String,
    pub records: Vec<PlacementRecord>,
    pub pbox: PeriodicBox,
}

impl Structure {
    pub fn new(title: impl Into<String>, pbox: PeriodicBox) -> Self {
        Self {
            title: title.into(),
            records: vec![],
            pbox,
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.records.len()
    }

    /// Residue number of the last record, zero if empty
    pub fn last_resid(&self) -> usize {
        self.records.last().map(|r| r.resid).unwrap_or(0)
    }

    /// Appends a molecule as a new residue and returns its residue number
    pub fn push_molecule<'a>(
        &mut self,
        resname: &str,
        atoms: impl IntoIterator<Item = (&'a str, Pos)>,
    ) -> usize {
        let resid = self.last_resid() + 1;
        for (name, pos) in atoms {
            let index = self.records.len() + 1;
            self.records.push(PlacementRecord {
                resid,
                resname: resname.to_owned(),
                name: name.to_owned(),
                index,
                pos,
            });
        }
        resid
    }

    /// Ranges of records forming residues.
    ///
    /// A residue is a contiguous run of records with the same residue
    /// number and name.
    pub fn residues(&self) -> Vec<Range<usize>> {
        let mut res = vec![];
        let mut b = 0;
        for i in 1..=self.records.len() {
            let end = i == self.records.len()
                || self.records[i].resid != self.records[b].resid
                || self.records[i].resname != self.records[b].resname;
            if end {
                res.push(b..i);
                b = i;
            }
        }
        res
    }

    /// Geometric center of a range of records
    pub fn centroid(&self, range: Range<usize>) -> Pos {
        let n = range.len().max(1) as f64;
        let sum = self.records[range]
            .iter()
            .fold(Pos::origin().coords, |acc, r| acc + r.pos.coords);
        Pos::from(sum / n)
    }

    /// Renumbers residues from 1 and atom indexes from 1 in record order
    pub fn renumber(&mut self) {
        let ranges = self.residues();
        for (k, r) in ranges.into_iter().enumerate() {
            for rec in &mut self.records[r] {
                rec.resid = k + 1;
            }
        }
        for (i, rec) in self.records.iter_mut().enumerate() {
            rec.index = i + 1;
        }
    }

    /// Concatenates structures keeping their records verbatim.
    ///
    /// The box of the first structure is used unless `pbox` is given.
    /// Returns None for an empty list without explicit box.
    pub fn combine(
        title: impl Into<String>,
        parts: &[Structure],
        pbox: Option<PeriodicBox>,
    ) -> Option<Self> {
        let pbox = pbox.or_else(|| parts.first().map(|s| s.pbox))?;
        Some(Self {
            title: title.into(),
            records: parts.iter().flat_map(|s| s.records.iter().cloned()).collect(),
            pbox,
        })
    }
}
