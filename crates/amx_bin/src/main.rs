use anyhow::Result;
use clap::{Parser, Subcommand};

mod command_adhere;
mod command_bilayer;
mod command_combine;

use command_adhere::command_adhere;
use command_bilayer::command_bilayer;
use command_combine::command_combine;

/// AMX membrane builder
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cmd {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Builds a flat, buckled or saddle-shaped lipid bilayer
    Bilayer {
        /// Bilayer configuration in TOML format
        #[arg(short, required = true)]
        config: String,
        /// Output structure file
        #[arg(short, default_value = "bilayer.gro")]
        outfile: String,
        /// Seed of the random generator, overrides the config
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Concatenates several structures into one
    Combine {
        /// Input structure files in output order
        #[arg(short, num_args = 1.., required = true)]
        files: Vec<String>,
        /// Output structure file
        #[arg(short, default_value = "combined.gro")]
        outfile: String,
        /// Title of the combined structure
        #[arg(short, default_value = "COMBINED")]
        name: String,
        /// Box vectors, taken from the first file if absent
        #[arg(long = "box", num_args = 3)]
        box_size: Option<Vec<f64>>,
    },

    /// Adheres a lattice of protein copies to a bilayer
    Adhere {
        /// Bilayer structure
        #[arg(short, required = true)]
        bilayer: String,
        /// Protein structure
        #[arg(short, required = true)]
        protein: String,
        /// Adhesion configuration in TOML format
        #[arg(short, required = true)]
        config: String,
        /// Output structure file
        #[arg(short, default_value = "adhered.gro")]
        outfile: String,
    },
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .format_indent(Some(8))
        .filter_level(log::LevelFilter::Info)
        .init();

    let cmd = Cmd::parse();

    match &cmd.command {
        Commands::Bilayer {
            config,
            outfile,
            seed,
        } => {
            amx::greeting("bilayer");
            command_bilayer(config, outfile, *seed)?;
        }
        Commands::Combine {
            files,
            outfile,
            name,
            box_size,
        } => {
            amx::greeting("combine");
            command_combine(files, outfile, name, box_size)?;
        }
        Commands::Adhere {
            bilayer,
            protein,
            config,
            outfile,
        } => {
            amx::greeting("adhere");
            command_adhere(bilayer, protein, config, outfile)?;
        }
    }
    Ok(())
}

pub(crate) fn print_composition(comp: &amx::prelude::Composition) {
    use comfy_table::presets::UTF8_FULL;
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Molecule", "Count"]);
    for (name, count) in comp.iter() {
        table.add_row(vec![Cell::new(name), Cell::new(count)]);
    }
    println!("{table}");
}
