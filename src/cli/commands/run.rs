use crate::cli::commands::Command;
use crate::config::EthynylConfig;
use crate::error::EthynylError;
use crate::population::Population;
use crate::reaction::{JournalFormat, Kind, ReactionJournal, Totals};
use crate::simulation::{RunReport, Simulation};
use crate::telemetry::{create_run_span, generate_correlation_id};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

pub struct RunCommand {
    pub seed: u64,
    pub atoms: Option<i64>,
    pub totals: Option<(i64, i64)>,
    pub format: Option<JournalFormat>,
    pub output: Option<PathBuf>,
    config: EthynylConfig,
}

impl RunCommand {
    pub fn new(seed: u64, config: EthynylConfig) -> Self {
        Self {
            seed,
            atoms: None,
            totals: None,
            format: None,
            output: None,
            config,
        }
    }

    pub fn with_atoms(mut self, atoms: Option<i64>) -> Self {
        self.atoms = atoms;
        self
    }

    pub fn with_totals(mut self, carbon: Option<i64>, hydrogen: Option<i64>) -> Self {
        self.totals = carbon.zip(hydrogen);
        self
    }

    pub fn with_format(mut self, format: Option<JournalFormat>) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    /// Build the population; any invalid count fails here, before a task starts.
    pub fn population(&self) -> Result<Population, EthynylError> {
        match self.totals {
            Some((carbon, hydrogen)) => Ok(Population::from_totals(
                Totals::checked(carbon, hydrogen)?,
                self.seed,
            )),
            None => Population::random(
                self.seed,
                self.atoms.unwrap_or(self.config.simulation.default_atoms),
                self.config.simulation.hydrogen_threshold,
            ),
        }
    }

    pub fn journal(&self) -> Result<ReactionJournal, EthynylError> {
        let format = self.format.unwrap_or(self.config.journal.format);
        let max_lines = self.config.journal.max_lines;
        match &self.output {
            Some(path) => ReactionJournal::to_file(path, max_lines, format),
            None => ReactionJournal::stdout(max_lines, format),
        }
    }

    pub async fn run(&self) -> Result<RunReport> {
        let population = self.population()?;
        let journal = Arc::new(self.journal()?);

        let correlation_id = generate_correlation_id();
        let span = create_run_span(&correlation_id, population.totals(), self.seed);
        let report = Simulation::run(&population, journal).instrument(span).await?;
        Ok(report)
    }
}

impl Command for RunCommand {
    async fn execute(&self) -> Result<()> {
        let report = self.run().await?;

        eprintln!();
        eprintln!("📊 RUN SUMMARY");
        eprintln!("──────────────");
        eprintln!(
            "   ⚛️  Atoms: {} carbon, {} hydrogen",
            report.totals.carbon, report.totals.hydrogen
        );
        eprintln!(
            "   🧪 Radicals: {} of {} possible",
            report.records.len(),
            report.max_reactions
        );
        eprintln!("   ✅ Reacted: {}", report.reacted());
        eprintln!(
            "   💨 Drained: {} carbon, {} hydrogen",
            report.drained_of(Kind::Carbon),
            report.drained_of(Kind::Hydrogen)
        );
        if let Some(path) = &self.output {
            eprintln!("   📄 Journal written to {}", path.display());
        }
        Ok(())
    }
}
