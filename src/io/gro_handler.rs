use crate::core::{Matrix3d, PeriodicBox, PeriodicBoxError, PlacementRecord, Pos, Structure};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    num::{ParseFloatError, ParseIntError},
    path::Path,
};
use thiserror::Error;

pub struct GroFileHandler {
    reader: Option<BufReader<File>>,
    writer: Option<BufWriter<File>>,
}

#[derive(Debug, Error)]
pub enum GroHandlerError {
    #[error("unexpected io error")]
    Io(#[from] std::io::Error),

    #[error("can't open gro file for reading")]
    OpenRead(#[source] std::io::Error),

    #[error("can't open gro file for writing")]
    OpenWrite(#[source] std::io::Error),

    #[error("handler is not opened for {0}")]
    Mode(&'static str),

    #[error(transparent)]
    ParseInt(#[from] ParseIntError),

    #[error(transparent)]
    ParseFloat(#[from] ParseFloatError),

    #[error(transparent)]
    Pbc(#[from] PeriodicBoxError),

    #[error("atom {0} has incomplete {1} entry")]
    AtomEntry(usize, String),

    #[error("gro file is empty")]
    EmptyFile,

    #[error("expected {0} atoms, file ends after {1}")]
    MissingAtoms(usize, usize),

    #[error("periodic box line is missing or incomplete")]
    NoBox,
}

/// Formats a coordinate into the 8-character field of GRO output.
///
/// The value is printed with three decimals, then a trailing run of
/// zeros is cut down to the digit before it (or to a single zero right
/// after the decimal point) and the field is padded on the right.
pub fn dotplace(x: f64) -> String {
    let mut s = format!("{x:8.3}");
    let stripped = s.trim_end_matches('0').len();
    let run = s.len() - stripped;
    if run > 0 {
        let prev = s[..stripped].chars().last();
        if prev.is_some_and(|c| c.is_ascii_digit()) {
            s.truncate(stripped);
        } else if run > 1 {
            s.truncate(stripped + 1);
        }
    }
    format!("{s:<8}")
}

fn format_record(r: &PlacementRecord) -> String {
    let ind = format!("{:>5}", r.index);
    format!(
        "{:>5}{:<5.5}{:>5.5}{}{}{}{}",
        r.resid,
        r.resname,
        r.name,
        &ind[..5],
        dotplace(r.pos.x),
        dotplace(r.pos.y),
        dotplace(r.pos.z)
    )
}

pub(crate) fn write_gro(buf: &mut impl Write, data: &Structure) -> Result<(), GroHandlerError> {
    writeln!(buf, "{}", data.title)?;
    writeln!(buf, "{}", data.num_atoms())?;
    for r in &data.records {
        writeln!(buf, "{}", format_record(r))?;
    }
    let v = data.pbox.to_gro_vectors();
    writeln!(
        buf,
        "{}",
        v.iter().map(|x| dotplace(*x)).collect::<Vec<_>>().join(" ")
    )?;
    Ok(())
}

// Coordinates are whitespace separated in well-formed files. Values
// that run together are read from the fixed columns instead.
fn parse_coords(i: usize, line: &str) -> Result<Pos, GroHandlerError> {
    let tail = line
        .get(20..)
        .ok_or_else(|| GroHandlerError::AtomEntry(i, "coordinates".into()))?;
    let split = tail
        .split_whitespace()
        .take(3)
        .map(|s| s.parse::<f64>())
        .collect::<Result<Vec<_>, _>>();
    if let Ok(v) = split {
        if v.len() == 3 {
            return Ok(Pos::new(v[0], v[1], v[2]));
        }
    }

    let field = |r: std::ops::Range<usize>, what: &str| -> Result<f64, GroHandlerError> {
        Ok(line
            .get(r)
            .ok_or_else(|| GroHandlerError::AtomEntry(i, what.into()))?
            .trim()
            .parse::<f64>()?)
    };
    Ok(Pos::new(
        field(20..28, "x")?,
        field(28..36, "y")?,
        field(36..44, "z")?,
    ))
}

pub(crate) fn read_gro(buf: impl BufRead) -> Result<Structure, GroHandlerError> {
    let mut lines = buf.lines();

    let title = lines.next().ok_or(GroHandlerError::EmptyFile)??;
    let natoms = lines
        .next()
        .ok_or(GroHandlerError::MissingAtoms(0, 0))??
        .trim()
        .parse::<usize>()?;

    let mut records = Vec::with_capacity(natoms);
    for i in 0..natoms {
        let line = lines
            .next()
            .ok_or(GroHandlerError::MissingAtoms(natoms, i))??;
        let entry = |r: std::ops::Range<usize>, what: &str| {
            line.get(r)
                .map(str::trim)
                .ok_or_else(|| GroHandlerError::AtomEntry(i, what.into()))
        };
        let resid = entry(0..5, "resid")?.parse::<usize>()?;
        let resname = entry(5..10, "resname")?.to_owned();
        let name = entry(10..15, "name")?.to_owned();
        // Overflowed index fields fall back to the running index
        let index = entry(15..20, "index")?.parse::<usize>().unwrap_or(i + 1);
        let pos = parse_coords(i, &line)?;
        records.push(PlacementRecord {
            resid,
            resname,
            name,
            index,
            pos,
        });
    }

    let line = lines.next().ok_or(GroHandlerError::NoBox)??;
    let l = line
        .split_whitespace()
        .map(|s| s.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    if l.len() < 3 {
        return Err(GroHandlerError::NoBox);
    }
    /*
    Box vectors in GRO order:
    v1(x) v2(y) v3(z) v1(y) v1(z) v2(x) v2(z) v3(x) v3(y)
    Off-diagonal entries are only accepted if they are zero.
    */
    let mut m = Matrix3d::zeros();
    m[(0, 0)] = l[0];
    m[(1, 1)] = l[1];
    m[(2, 2)] = l[2];
    if l.len() == 9 {
        m[(1, 0)] = l[3];
        m[(2, 0)] = l[4];
        m[(0, 1)] = l[5];
        m[(2, 1)] = l[6];
        m[(0, 2)] = l[7];
        m[(1, 2)] = l[8];
    }

    Ok(Structure {
        title,
        records,
        pbox: PeriodicBox::from_matrix(m)?,
    })
}

impl GroFileHandler {
    pub fn open(fname: impl AsRef<Path>) -> Result<Self, GroHandlerError> {
        Ok(Self {
            reader: BufReader::new(File::open(fname).map_err(GroHandlerError::OpenRead)?).into(),
            writer: None,
        })
    }

    pub fn create(fname: impl AsRef<Path>) -> Result<Self, GroHandlerError> {
        Ok(Self {
            writer: BufWriter::new(File::create(fname).map_err(GroHandlerError::OpenWrite)?)
                .into(),
            reader: None,
        })
    }

    pub fn write(&mut self, data: &Structure) -> Result<(), GroHandlerError> {
        let buf = self.writer.as_mut().ok_or(GroHandlerError::Mode("writing"))?;
        write_gro(buf, data)?;
        buf.flush()?;
        Ok(())
    }

    pub fn read(&mut self) -> Result<Structure, GroHandlerError> {
        let buf = self.reader.take().ok_or(GroHandlerError::Mode("reading"))?;
        read_gro(buf)
    }
}
