// Property-Based Testing for Reaction Coordination
// Checks the radical count and resolution invariants for arbitrary populations

use ethynyl::{Kind, Population, ReactionJournal, Simulation, Totals};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn run_population(population: &Population) -> Result<ethynyl::RunReport, TestCaseError> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async {
        let journal = Arc::new(ReactionJournal::discard(1000).unwrap());
        let report = tokio::time::timeout(
            Duration::from_secs(20),
            Simulation::run(population, journal),
        )
        .await
        .map_err(|_| TestCaseError::fail("run deadlocked"))?
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
        Ok(report)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_radical_count_matches_supply(carbon in 0u32..40, hydrogen in 0u32..25, seed in any::<u64>()) {
        let population = Population::from_totals(Totals::new(carbon, hydrogen), seed);
        let report = run_population(&population)?;

        let expected = u64::from(hydrogen).min(u64::from(carbon) / 2);
        prop_assert_eq!(report.records.len() as u64, expected);
        prop_assert_eq!(report.drained_of(Kind::Carbon) as u64, u64::from(carbon) - 2 * expected);
        prop_assert_eq!(report.drained_of(Kind::Hydrogen) as u64, u64::from(hydrogen) - expected);
    }

    #[test]
    fn prop_no_atom_resolved_twice(seed in any::<u64>(), atoms in 0i64..60) {
        let population = Population::random(seed, atoms, 0.55).unwrap();
        let report = run_population(&population)?;

        prop_assert_eq!(report.resolutions.len(), population.len());

        let mut reacted = HashSet::new();
        for record in &report.records {
            for participant in record.participants() {
                prop_assert!(reacted.insert(participant), "{} reacted twice", participant);
            }
        }
        for drained in report.drained() {
            prop_assert!(!reacted.contains(&drained), "{} both reacted and drained", drained);
        }
        prop_assert_eq!(reacted.len() + report.drained().len(), population.len());
    }
}
