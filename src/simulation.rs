use crate::error::{EthynylError, Result};
use crate::population::Population;
use crate::reaction::{Kind, ReactionCoordinator, ReactionLog, ReactionRecord, Resolution, Totals, Worker};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

/// Outcome of one complete run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub totals: Totals,
    pub max_reactions: u64,
    pub records: Vec<ReactionRecord>,
    pub resolutions: BTreeMap<Worker, Resolution>,
}

impl RunReport {
    pub fn reacted(&self) -> usize {
        self.resolutions.values().filter(|r| r.is_reacted()).count()
    }

    pub fn drained(&self) -> Vec<Worker> {
        self.resolutions
            .iter()
            .filter(|(_, r)| !r.is_reacted())
            .map(|(w, _)| *w)
            .collect()
    }

    pub fn drained_of(&self, kind: Kind) -> usize {
        self.drained().iter().filter(|w| w.kind == kind).count()
    }

    /// Cross-check the report against the totals it was produced from.
    pub fn verify(&self) -> Result<()> {
        if self.records.len() as u64 != self.max_reactions {
            return Err(EthynylError::invariant(format!(
                "{} radicals formed, expected {}",
                self.records.len(),
                self.max_reactions
            )));
        }
        for (index, record) in self.records.iter().enumerate() {
            if record.sequence != index as u64 + 1 {
                return Err(EthynylError::invariant(format!(
                    "radical at position {} carries sequence {}",
                    index + 1,
                    record.sequence
                )));
            }
            for participant in record.participants() {
                let resolution = self.resolutions.get(&participant);
                if !resolution.is_some_and(Resolution::is_reacted) {
                    return Err(EthynylError::invariant(format!(
                        "{participant} is in radical {} but resolved as {resolution:?}",
                        record.sequence
                    )));
                }
            }
        }
        if self.resolutions.len() as u64 != self.totals.atoms() {
            return Err(EthynylError::invariant(format!(
                "{} of {} atoms resolved",
                self.resolutions.len(),
                self.totals.atoms()
            )));
        }
        if self.reacted() as u64 != self.max_reactions * 3 {
            return Err(EthynylError::invariant(format!(
                "{} atoms reacted in {} radicals",
                self.reacted(),
                self.max_reactions
            )));
        }
        Ok(())
    }
}

/// Controller side of a run: one task per atom, joined before returning.
pub struct Simulation {
    coordinator: Arc<ReactionCoordinator>,
}

impl Simulation {
    pub fn new(totals: Totals, journal: Arc<dyn ReactionLog>) -> Self {
        Self {
            coordinator: Arc::new(ReactionCoordinator::new(totals, journal)),
        }
    }

    pub async fn run(population: &Population, journal: Arc<dyn ReactionLog>) -> Result<RunReport> {
        Self::new(population.totals(), journal).execute(population).await
    }

    pub async fn execute(&self, population: &Population) -> Result<RunReport> {
        let totals = self.coordinator.totals();
        if population.totals() != totals {
            return Err(EthynylError::Configuration(format!(
                "population {:?} does not match the coordinator totals {:?}",
                population.totals(),
                totals
            )));
        }
        info!(
            atoms = population.len(),
            carbon = totals.carbon,
            hydrogen = totals.hydrogen,
            max_reactions = self.coordinator.max_reactions(),
            "Starting atom tasks"
        );

        let mut workers = JoinSet::new();
        for &worker in population.workers() {
            let coordinator = Arc::clone(&self.coordinator);
            workers.spawn(
                async move { (worker, coordinator.register(worker).await) }
                    .instrument(info_span!("atom", worker = %worker)),
            );
        }

        let mut controller = {
            let coordinator = Arc::clone(&self.coordinator);
            tokio::spawn(async move { coordinator.await_completion().await })
        };
        let mut controller_done = false;
        let mut resolutions = BTreeMap::new();

        loop {
            tokio::select! {
                outcome = &mut controller, if !controller_done => {
                    controller_done = true;
                    if let Err(e) = flatten(outcome, "controller") {
                        workers.abort_all();
                        return Err(e);
                    }
                }
                joined = workers.join_next() => {
                    let Some(joined) = joined else { break };
                    let (worker, resolution) = match joined {
                        Ok((worker, Ok(resolution))) => (worker, resolution),
                        Ok((worker, Err(e))) => {
                            error!(worker = %worker, error = %e, "Atom failed");
                            workers.abort_all();
                            controller.abort();
                            return Err(e);
                        }
                        Err(e) => {
                            workers.abort_all();
                            controller.abort();
                            return Err(EthynylError::WorkerAborted {
                                worker: "atom".to_string(),
                                reason: e.to_string(),
                            });
                        }
                    };
                    if resolutions.insert(worker, resolution).is_some() {
                        controller.abort();
                        return Err(EthynylError::invariant(format!("{worker} returned twice")));
                    }
                }
            }
        }

        if !controller_done {
            flatten(controller.await, "controller")?;
        }

        let report = RunReport {
            totals,
            max_reactions: self.coordinator.max_reactions(),
            records: self.coordinator.records().await,
            resolutions,
        };
        report.verify()?;
        info!(
            radicals = report.records.len(),
            reacted = report.reacted(),
            drained = report.drained().len(),
            "Run complete"
        );
        Ok(report)
    }
}

fn flatten(outcome: std::result::Result<Result<()>, tokio::task::JoinError>, task: &str) -> Result<()> {
    outcome.map_err(|e| EthynylError::WorkerAborted {
        worker: task.to_string(),
        reason: e.to_string(),
    })?
}
