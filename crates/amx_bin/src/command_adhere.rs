use anyhow::{Context, Result};
use log::info;
use amx::prelude::*;

pub(crate) fn command_adhere(
    bilayer: &str,
    protein: &str,
    config: &str,
    outfile: &str,
) -> Result<()> {
    let cfg = AdhereConfig::from_file(config)
        .with_context(|| format!("loading config '{config}'"))?;

    info!("Loading bilayer from '{bilayer}'...");
    let membrane =
        Structure::from_file(bilayer).with_context(|| format!("reading '{bilayer}'"))?;
    info!("Loading protein from '{protein}'...");
    let prot = Structure::from_file(protein).with_context(|| format!("reading '{protein}'"))?;

    let mut ledger = Composition::from_structure(&membrane);
    let out = adhere_proteins(&membrane, &prot, &cfg, &mut ledger)?;

    info!("Writing '{outfile}'...");
    out.save(outfile)
        .with_context(|| format!("writing '{outfile}'"))?;

    crate::print_composition(&ledger);
    Ok(())
}
