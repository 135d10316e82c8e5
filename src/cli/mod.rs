use crate::reaction::JournalFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "ethynyl")]
#[command(about = "Form ethynyl radicals from concurrently arriving carbon and hydrogen atoms")]
#[command(long_about = "Every atom runs as its own task. Whenever two carbon atoms and one hydrogen atom \
                       are free they combine into a radical, until no further radical can form; leftover \
                       atoms are then released. Start with 'ethynyl run <SEED>'.")]
pub struct Cli {
    /// Log every atom's arrival, recruitment and release
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a population of atoms and run it to completion
    Run {
        /// Seed for the random carbon/hydrogen assignment
        seed: u64,
        /// Number of atoms to create (defaults to simulation.default_atoms)
        #[arg(allow_negative_numbers = true, conflicts_with_all = ["carbon", "hydrogen"])]
        atoms: Option<i64>,
        /// Exact number of carbon atoms (requires --hydrogen)
        #[arg(long, requires = "hydrogen", allow_negative_numbers = true)]
        carbon: Option<i64>,
        /// Exact number of hydrogen atoms (requires --carbon)
        #[arg(long, requires = "carbon", allow_negative_numbers = true)]
        hydrogen: Option<i64>,
        /// Journal dump format (defaults to journal.format)
        #[arg(long, value_enum)]
        format: Option<JournalFormat>,
        /// Write the journal dump to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Config,
}
