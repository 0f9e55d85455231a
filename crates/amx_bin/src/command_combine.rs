use anyhow::{bail, Context, Result};
use log::info;
use amx::prelude::*;

pub(crate) fn command_combine(
    files: &[String],
    outfile: &str,
    name: &str,
    box_vectors: &Option<Vec<f64>>,
) -> Result<()> {
    let mut parts = vec![];
    for f in files {
        info!("Loading '{f}'...");
        parts.push(Structure::from_file(f).with_context(|| format!("reading '{f}'"))?);
    }

    let pbox = match box_vectors.as_deref() {
        Some(&[x, y, z]) => Some(PeriodicBox::from_extents(x, y, z)?),
        Some(_) => bail!("three box vectors expected"),
        None => None,
    };

    let Some(combined) = Structure::combine(name, &parts, pbox) else {
        bail!("nothing to combine");
    };
    info!(
        "Combined {} structures, {} atoms",
        parts.len(),
        combined.num_atoms()
    );
    combined
        .save(outfile)
        .with_context(|| format!("writing '{outfile}'"))?;
    Ok(())
}
