use crate::error::{EthynylError, Result};
use crate::reaction::{Totals, Worker};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// The atoms of one run, in the order their tasks are started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Population {
    workers: Vec<Worker>,
    totals: Totals,
}

impl Population {
    /// Draw `atoms` atoms from a seeded generator. A draw below
    /// `hydrogen_threshold` makes a hydrogen atom, anything else carbon.
    pub fn random(seed: u64, atoms: i64, hydrogen_threshold: f64) -> Result<Self> {
        let atoms = u32::try_from(atoms).map_err(|_| {
            EthynylError::Configuration(format!("{atoms} is not a valid number of atoms"))
        })?;
        Totals::within_limit(u64::from(atoms))?;
        if !(0.0..=1.0).contains(&hydrogen_threshold) {
            return Err(EthynylError::Configuration(format!(
                "hydrogen threshold {hydrogen_threshold} must be between 0 and 1"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut totals = Totals::default();
        let mut workers = Vec::with_capacity(atoms as usize);
        for _ in 0..atoms {
            let worker = if rng.random::<f64>() < hydrogen_threshold {
                totals.hydrogen += 1;
                Worker::hydrogen(totals.hydrogen)
            } else {
                totals.carbon += 1;
                Worker::carbon(totals.carbon)
            };
            workers.push(worker);
        }

        Ok(Self { workers, totals })
    }

    /// Exact totals, with arrival order shuffled by `seed`.
    pub fn from_totals(totals: Totals, seed: u64) -> Self {
        let mut workers: Vec<Worker> = (1..=totals.carbon)
            .map(Worker::carbon)
            .chain((1..=totals.hydrogen).map(Worker::hydrogen))
            .collect();
        workers.shuffle(&mut StdRng::seed_from_u64(seed));
        Self { workers, totals }
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn max_reactions(&self) -> u64 {
        self.totals.max_reactions()
    }
}
