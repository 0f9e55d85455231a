use anyhow::{Context, Result};
use log::info;
use amx::prelude::*;

pub(crate) fn command_bilayer(config: &str, outfile: &str, seed: Option<u64>) -> Result<()> {
    info!("Reading bilayer config from '{config}'...");
    let mut cfg = BilayerConfig::from_file(config)
        .with_context(|| format!("loading config '{config}'"))?;
    if seed.is_some() {
        cfg.seed = seed;
    }
    let mut rng = cfg.rng();

    let builder = BilayerBuilder::new(cfg)?.load_prototypes()?;
    let mut ledger = Composition::default();
    let bilayer = builder.build(&mut rng, &mut ledger)?;

    info!("Writing '{outfile}'...");
    bilayer
        .structure
        .save(outfile)
        .with_context(|| format!("writing '{outfile}'"))?;

    crate::print_composition(&ledger);
    Ok(())
}
