// Reaction Coordinator - forms radicals from two carbons and one hydrogen
//
// Every worker calls `register` exactly once. The call that first sees enough
// free atoms becomes the trigger and recruits the other two participants while
// holding the exclusive section, so only one radical is ever being assembled.
// Waiting workers sit in per-kind FIFO queues; whoever arrived first is
// recruited first.

use crate::error::{EthynylError, Result};
use crate::reaction::journal::ReactionLog;
use crate::reaction::lifecycle::{LifecycleEvent, LifecycleTracker};
use crate::reaction::types::{
    CombiningGroup, Kind, ReactionRecord, Resolution, Role, Totals, Worker,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, MutexGuard, Notify};
use tracing::{debug, info};

/// What a waiting worker is told when it is woken.
#[derive(Debug)]
enum Summons {
    /// Write your id into `role`, then acknowledge.
    Fill { role: Role, ack: oneshot::Sender<()> },
    /// No reaction left for you; acknowledge and leave.
    Release { ack: oneshot::Sender<()> },
}

#[derive(Debug)]
struct Waiter {
    worker: Worker,
    summons: oneshot::Sender<Summons>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FreeCounters {
    carbon: u32,
    hydrogen: u32,
}

impl FreeCounters {
    fn get(&self, kind: Kind) -> u32 {
        match kind {
            Kind::Carbon => self.carbon,
            Kind::Hydrogen => self.hydrogen,
        }
    }

    fn slot(&mut self, kind: Kind) -> &mut u32 {
        match kind {
            Kind::Carbon => &mut self.carbon,
            Kind::Hydrogen => &mut self.hydrogen,
        }
    }

    fn add(&mut self, kind: Kind) {
        *self.slot(kind) += 1;
    }

    fn remove(&mut self, kind: Kind, count: u64) -> Result<()> {
        let slot = self.slot(kind);
        let current = *slot;
        *slot = u64::from(current)
            .checked_sub(count)
            .and_then(|left| u32::try_from(left).ok())
            .ok_or_else(|| {
                EthynylError::invariant(format!(
                    "free {kind} count would go negative ({current} - {count})"
                ))
            })?;
        Ok(())
    }

    fn can_react(&self) -> bool {
        Kind::ALL
            .iter()
            .all(|kind| u64::from(self.get(*kind)) >= kind.multiplicity())
    }
}

#[derive(Debug, Default)]
struct CoordinatorState {
    free: FreeCounters,
    waiting_carbon: VecDeque<Waiter>,
    waiting_hydrogen: VecDeque<Waiter>,
    registered: HashSet<Worker>,
    completed: u64,
    records: Vec<ReactionRecord>,
    completion_claimed: bool,
}

impl CoordinatorState {
    fn queue(&self, kind: Kind) -> &VecDeque<Waiter> {
        match kind {
            Kind::Carbon => &self.waiting_carbon,
            Kind::Hydrogen => &self.waiting_hydrogen,
        }
    }

    fn queue_mut(&mut self, kind: Kind) -> &mut VecDeque<Waiter> {
        match kind {
            Kind::Carbon => &mut self.waiting_carbon,
            Kind::Hydrogen => &mut self.waiting_hydrogen,
        }
    }

    fn finished(&self, max_reactions: u64) -> bool {
        self.completed == max_reactions
    }

    /// Outside an assembly every free atom is parked in its queue.
    fn check_queues(&self) -> Result<()> {
        for kind in Kind::ALL {
            let free = self.free.get(kind) as usize;
            let parked = self.queue(kind).len();
            if free != parked {
                return Err(EthynylError::invariant(format!(
                    "{free} free {kind} atoms but {parked} waiting"
                )));
            }
        }
        Ok(())
    }
}

/// Point-in-time view of the coordinator, for tests and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSnapshot {
    pub free_carbon: u32,
    pub free_hydrogen: u32,
    pub waiting_carbon: Vec<Worker>,
    pub waiting_hydrogen: Vec<Worker>,
    pub completed: u64,
    pub terminated: bool,
}

pub struct ReactionCoordinator {
    totals: Totals,
    max_reactions: u64,
    state: Mutex<CoordinatorState>,
    staging: std::sync::Mutex<CombiningGroup>,
    terminated: AtomicBool,
    reaction_completed: Notify,
    arrival: Notify,
    resolutions: std::sync::Mutex<HashMap<Worker, Resolution>>,
    journal: Arc<dyn ReactionLog>,
}

impl ReactionCoordinator {
    pub fn new(totals: Totals, journal: Arc<dyn ReactionLog>) -> Self {
        let max_reactions = totals.max_reactions();
        info!(
            carbon = totals.carbon,
            hydrogen = totals.hydrogen,
            max_reactions,
            "Reaction coordinator ready"
        );
        Self {
            totals,
            max_reactions,
            state: Mutex::new(CoordinatorState::default()),
            staging: std::sync::Mutex::new(CombiningGroup::new()),
            terminated: AtomicBool::new(false),
            reaction_completed: Notify::new(),
            arrival: Notify::new(),
            resolutions: std::sync::Mutex::new(HashMap::new()),
            journal,
        }
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn max_reactions(&self) -> u64 {
        self.max_reactions
    }

    /// Enter the kosmos and wait until this worker has either reacted or been
    /// drained.
    pub async fn register(&self, worker: Worker) -> Result<Resolution> {
        if worker.id == 0 || worker.id > self.totals.of(worker.kind) {
            return Err(EthynylError::Configuration(format!(
                "{worker} is outside the configured population of {} {} atoms",
                self.totals.of(worker.kind),
                worker.kind
            )));
        }

        let mut lifecycle = LifecycleTracker::new(worker);
        lifecycle.apply(LifecycleEvent::Register)?;

        let mut state = self.state.lock().await;
        if !state.registered.insert(worker) {
            return Err(EthynylError::invariant(format!("{worker} registered twice")));
        }
        state.free.add(worker.kind);
        debug!(
            worker = %worker,
            free_carbon = state.free.carbon,
            free_hydrogen = state.free.hydrogen,
            "Atom now exists"
        );

        if !self.terminated.load(Ordering::Acquire) && state.free.can_react() {
            let role = Role::taken_by_trigger(worker.kind);
            lifecycle.apply(LifecycleEvent::Trigger { role })?;
            self.assemble(&mut state, worker, role).await?;
            drop(state);

            let resolution = finish(&mut lifecycle)?;
            self.resolve(worker, resolution)?;
            return Ok(resolution);
        }

        let (summons_tx, summons_rx) = oneshot::channel();
        state.queue_mut(worker.kind).push_back(Waiter {
            worker,
            summons: summons_tx,
        });
        lifecycle.apply(LifecycleEvent::Wait)?;
        drop(state);
        self.arrival.notify_one();

        let summons = summons_rx.await.map_err(|_| {
            EthynylError::invariant(format!("{worker} was dropped from its wait queue"))
        })?;
        let terminated = self.terminated.load(Ordering::Acquire);

        match summons {
            Summons::Fill { role, ack } => {
                if terminated {
                    return Err(EthynylError::invariant(format!(
                        "{worker} recruited as {role} after the final radical"
                    )));
                }
                lifecycle.apply(LifecycleEvent::Select { role })?;
                self.stage(role, worker)?;
                let resolution = finish(&mut lifecycle)?;
                self.resolve(worker, resolution)?;
                acknowledge(ack, worker)?;
                Ok(resolution)
            }
            Summons::Release { ack } => {
                if !terminated {
                    return Err(EthynylError::invariant(format!(
                        "{worker} released while radicals can still form"
                    )));
                }
                lifecycle.apply(LifecycleEvent::Release)?;
                let resolution = finish(&mut lifecycle)?;
                self.resolve(worker, resolution)?;
                acknowledge(ack, worker)?;
                Ok(resolution)
            }
        }
    }

    /// True once every radical the totals allow has formed.
    pub async fn finished(&self) -> bool {
        self.state.lock().await.finished(self.max_reactions)
    }

    /// Block until the last radical has formed, then release every leftover
    /// atom and flush the journal. May only be called once.
    pub async fn await_completion(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.completion_claimed {
                return Err(EthynylError::invariant("await_completion called twice"));
            }
            state.completion_claimed = true;
        }

        let mut state = loop {
            let state = self.state.lock().await;
            if state.finished(self.max_reactions) {
                break state;
            }
            drop(state);
            self.reaction_completed.notified().await;
        };

        self.terminated.store(true, Ordering::Release);
        info!(
            radicals = state.completed,
            excess_carbon = self.totals.excess(Kind::Carbon),
            excess_hydrogen = self.totals.excess(Kind::Hydrogen),
            "All radicals formed, draining leftover atoms"
        );

        for kind in Kind::ALL {
            for _ in 0..self.totals.excess(kind) {
                state = self.release_next(state, kind).await?;
            }
        }
        state.check_queues()?;
        drop(state);

        self.journal.flush()?;
        Ok(())
    }

    pub async fn records(&self) -> Vec<ReactionRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        let state = self.state.lock().await;
        CoordinatorSnapshot {
            free_carbon: state.free.carbon,
            free_hydrogen: state.free.hydrogen,
            waiting_carbon: state.waiting_carbon.iter().map(|w| w.worker).collect(),
            waiting_hydrogen: state.waiting_hydrogen.iter().map(|w| w.worker).collect(),
            completed: state.completed,
            terminated: self.terminated.load(Ordering::Acquire),
        }
    }

    pub fn resolutions(&self) -> Result<HashMap<Worker, Resolution>> {
        Ok(self.resolutions_lock()?.clone())
    }

    /// Fill the remaining roles of a radical and record it. Runs entirely
    /// inside the exclusive section held by the trigger.
    async fn assemble(
        &self,
        state: &mut CoordinatorState,
        trigger: Worker,
        own_role: Role,
    ) -> Result<()> {
        if !self.staging_lock()?.is_empty() {
            return Err(EthynylError::invariant(format!(
                "{trigger} found a partially assembled radical"
            )));
        }
        self.stage(own_role, trigger)?;

        for role in Role::ASSEMBLY_ORDER {
            if role != own_role {
                self.recruit(state, role).await?;
            }
        }

        let [first_carbon, second_carbon, hydrogen] = self.staging_lock()?.take()?;
        for kind in Kind::ALL {
            state.free.remove(kind, kind.multiplicity())?;
        }
        state.completed += 1;
        if state.completed > self.max_reactions {
            return Err(EthynylError::invariant(format!(
                "radical {} exceeds the maximum of {}",
                state.completed, self.max_reactions
            )));
        }

        let record = ReactionRecord {
            sequence: state.completed,
            first_carbon,
            second_carbon,
            hydrogen,
            trigger: trigger.name(),
        };
        info!(
            sequence = record.sequence,
            first_carbon = %Worker::carbon(first_carbon),
            second_carbon = %Worker::carbon(second_carbon),
            hydrogen = %Worker::hydrogen(hydrogen),
            trigger = %record.trigger,
            "An ethynyl radical was made"
        );
        self.journal.record_reaction(&record)?;
        state.records.push(record);
        state.check_queues()?;

        self.reaction_completed.notify_one();
        Ok(())
    }

    /// Wake the longest-waiting atom of the role's kind and wait until it has
    /// written itself into the staging slot.
    async fn recruit(&self, state: &mut CoordinatorState, role: Role) -> Result<()> {
        let waiter = state.queue_mut(role.kind()).pop_front().ok_or_else(|| {
            EthynylError::invariant(format!("no waiting {} atom to fill the {role} role", role.kind()))
        })?;
        let worker = waiter.worker;
        debug!(worker = %worker, role = %role, "Recruiting atom");

        let (ack_tx, ack_rx) = oneshot::channel();
        waiter
            .summons
            .send(Summons::Fill { role, ack: ack_tx })
            .map_err(|_| EthynylError::invariant(format!("{worker} left before being recruited")))?;
        ack_rx.await.map_err(|_| {
            EthynylError::invariant(format!("{worker} never acknowledged the {role} role"))
        })
    }

    /// Release one leftover atom of `kind`, waiting for it to arrive if it has
    /// not registered yet. The guard is given up while waiting for arrivals.
    async fn release_next<'a>(
        &'a self,
        mut state: MutexGuard<'a, CoordinatorState>,
        kind: Kind,
    ) -> Result<MutexGuard<'a, CoordinatorState>> {
        let waiter = loop {
            if let Some(waiter) = state.queue_mut(kind).pop_front() {
                break waiter;
            }
            drop(state);
            self.arrival.notified().await;
            state = self.state.lock().await;
        };
        state.free.remove(kind, 1)?;

        let worker = waiter.worker;
        debug!(worker = %worker, "Draining leftover atom");
        let (ack_tx, ack_rx) = oneshot::channel();
        waiter
            .summons
            .send(Summons::Release { ack: ack_tx })
            .map_err(|_| EthynylError::invariant(format!("{worker} left before being drained")))?;
        ack_rx.await.map_err(|_| {
            EthynylError::invariant(format!("{worker} never acknowledged its release"))
        })?;
        Ok(state)
    }

    fn stage(&self, role: Role, worker: Worker) -> Result<()> {
        if role.kind() != worker.kind {
            return Err(EthynylError::invariant(format!(
                "{worker} cannot take the {role} role"
            )));
        }
        self.staging_lock()?.fill(role, worker.id)
    }

    fn resolve(&self, worker: Worker, resolution: Resolution) -> Result<()> {
        let mut resolutions = self.resolutions_lock()?;
        if let Some(previous) = resolutions.insert(worker, resolution) {
            return Err(EthynylError::invariant(format!(
                "{worker} resolved twice ({previous:?}, then {resolution:?})"
            )));
        }
        Ok(())
    }

    fn staging_lock(&self) -> Result<std::sync::MutexGuard<'_, CombiningGroup>> {
        self.staging
            .lock()
            .map_err(|_| EthynylError::invariant("staging area lock poisoned"))
    }

    fn resolutions_lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Worker, Resolution>>> {
        self.resolutions
            .lock()
            .map_err(|_| EthynylError::invariant("resolution ledger lock poisoned"))
    }
}

/// Close the worker's lifecycle and read back how it was resolved.
fn finish(lifecycle: &mut LifecycleTracker) -> Result<Resolution> {
    lifecycle.apply(LifecycleEvent::Finish)?;
    lifecycle
        .resolution()
        .ok_or_else(|| EthynylError::invariant("lifecycle finished without a resolution"))
}

fn acknowledge(ack: oneshot::Sender<()>, worker: Worker) -> Result<()> {
    ack.send(())
        .map_err(|_| EthynylError::invariant(format!("nobody is waiting for {worker} to acknowledge")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaction::journal::ReactionJournal;
    use std::time::Duration;
    use tokio::time::timeout;

    const DEADLOCK_GUARD: Duration = Duration::from_secs(10);

    fn coordinator(carbon: u32, hydrogen: u32) -> Arc<ReactionCoordinator> {
        let journal = Arc::new(ReactionJournal::discard(100).unwrap());
        Arc::new(ReactionCoordinator::new(Totals::new(carbon, hydrogen), journal))
    }

    fn spawn_worker(
        coordinator: &Arc<ReactionCoordinator>,
        worker: Worker,
    ) -> tokio::task::JoinHandle<Result<Resolution>> {
        let coordinator = Arc::clone(coordinator);
        tokio::spawn(async move { coordinator.register(worker).await })
    }

    async fn wait_for_waiting(coordinator: &ReactionCoordinator, carbon: usize, hydrogen: usize) {
        timeout(DEADLOCK_GUARD, async {
            loop {
                let snapshot = coordinator.snapshot().await;
                if snapshot.waiting_carbon.len() == carbon && snapshot.waiting_hydrogen.len() == hydrogen {
                    return;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("atoms never reached the wait queues");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifo_recruitment_with_hydrogen_trigger() {
        let kosmos = coordinator(2, 1);

        let first = spawn_worker(&kosmos, Worker::carbon(2));
        wait_for_waiting(&kosmos, 1, 0).await;
        let second = spawn_worker(&kosmos, Worker::carbon(1));
        wait_for_waiting(&kosmos, 2, 0).await;

        let trigger = kosmos.register(Worker::hydrogen(1)).await.unwrap();
        assert_eq!(trigger, Resolution::Reacted { role: Role::Hydrogen });
        assert_eq!(
            first.await.unwrap().unwrap(),
            Resolution::Reacted { role: Role::FirstCarbon }
        );
        assert_eq!(
            second.await.unwrap().unwrap(),
            Resolution::Reacted { role: Role::SecondCarbon }
        );

        let records = kosmos.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].first_carbon, 2);
        assert_eq!(records[0].second_carbon, 1);
        assert_eq!(records[0].hydrogen, 1);
        assert_eq!(records[0].trigger, "h001");

        timeout(DEADLOCK_GUARD, kosmos.await_completion())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_carbon_trigger_takes_second_slot() {
        let kosmos = coordinator(2, 1);

        let hydrogen = spawn_worker(&kosmos, Worker::hydrogen(1));
        wait_for_waiting(&kosmos, 0, 1).await;
        let carbon = spawn_worker(&kosmos, Worker::carbon(1));
        wait_for_waiting(&kosmos, 1, 1).await;

        let trigger = kosmos.register(Worker::carbon(2)).await.unwrap();
        assert_eq!(trigger, Resolution::Reacted { role: Role::SecondCarbon });
        assert_eq!(
            carbon.await.unwrap().unwrap(),
            Resolution::Reacted { role: Role::FirstCarbon }
        );
        assert!(hydrogen.await.unwrap().unwrap().is_reacted());

        let records = kosmos.records().await;
        assert_eq!(records[0].first_carbon, 1);
        assert_eq!(records[0].second_carbon, 2);
        assert_eq!(records[0].trigger, "c002");
        assert!(kosmos.finished().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_leftovers_are_drained() {
        let kosmos = coordinator(3, 2);
        let mut handles = Vec::new();
        for id in 1..=3 {
            handles.push((Worker::carbon(id), spawn_worker(&kosmos, Worker::carbon(id))));
        }
        for id in 1..=2 {
            handles.push((Worker::hydrogen(id), spawn_worker(&kosmos, Worker::hydrogen(id))));
        }

        timeout(DEADLOCK_GUARD, kosmos.await_completion())
            .await
            .unwrap()
            .unwrap();

        let mut drained = Vec::new();
        for (worker, handle) in handles {
            if handle.await.unwrap().unwrap() == Resolution::Drained {
                drained.push(worker);
            }
        }
        assert_eq!(drained.len(), 2);
        assert_eq!(drained.iter().filter(|w| w.kind == Kind::Carbon).count(), 1);
        assert_eq!(drained.iter().filter(|w| w.kind == Kind::Hydrogen).count(), 1);

        let snapshot = kosmos.snapshot().await;
        assert!(snapshot.terminated);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.free_carbon, 0);
        assert_eq!(snapshot.free_hydrogen, 0);
        assert_eq!(kosmos.resolutions().unwrap().len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_waits_for_late_arrivals() {
        let kosmos = coordinator(0, 2);
        let controller = {
            let kosmos = Arc::clone(&kosmos);
            tokio::spawn(async move { kosmos.await_completion().await })
        };

        // The controller is already draining before any atom shows up.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let first = spawn_worker(&kosmos, Worker::hydrogen(1));
        let second = spawn_worker(&kosmos, Worker::hydrogen(2));

        timeout(DEADLOCK_GUARD, controller).await.unwrap().unwrap().unwrap();
        assert_eq!(first.await.unwrap().unwrap(), Resolution::Drained);
        assert_eq!(second.await.unwrap().unwrap(), Resolution::Drained);
    }

    #[tokio::test]
    async fn test_empty_kosmos_finishes_immediately() {
        let kosmos = coordinator(0, 0);
        assert!(kosmos.finished().await);
        timeout(DEADLOCK_GUARD, kosmos.await_completion())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_await_completion_only_once() {
        let kosmos = coordinator(0, 0);
        kosmos.await_completion().await.unwrap();
        let err = kosmos.await_completion().await.unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[tokio::test]
    async fn test_unknown_worker_rejected() {
        let kosmos = coordinator(2, 1);
        let err = kosmos.register(Worker::carbon(3)).await.unwrap_err();
        assert!(matches!(err, EthynylError::Configuration(_)));
        assert!(kosmos.register(Worker::hydrogen(0)).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_double_registration_rejected() {
        let kosmos = coordinator(2, 1);
        let _parked = spawn_worker(&kosmos, Worker::carbon(1));
        wait_for_waiting(&kosmos, 1, 0).await;

        let err = kosmos.register(Worker::carbon(1)).await.unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(kosmos.snapshot().await.free_carbon, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_finished_tracks_completed_radicals() {
        let kosmos = coordinator(4, 2);
        assert!(!kosmos.finished().await);

        let mut handles = Vec::new();
        for id in 1..=2 {
            handles.push(spawn_worker(&kosmos, Worker::carbon(id)));
        }
        handles.push(spawn_worker(&kosmos, Worker::hydrogen(1)));
        for handle in handles.drain(..) {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(kosmos.snapshot().await.completed, 1);
        assert!(!kosmos.finished().await);

        for id in 3..=4 {
            handles.push(spawn_worker(&kosmos, Worker::carbon(id)));
        }
        handles.push(spawn_worker(&kosmos, Worker::hydrogen(2)));
        timeout(DEADLOCK_GUARD, kosmos.await_completion())
            .await
            .unwrap()
            .unwrap();
        assert!(kosmos.finished().await);
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_reacted());
        }
    }

    #[test]
    fn test_state_finished_predicate() {
        let mut state = CoordinatorState::default();
        assert!(state.finished(0));
        assert!(!state.finished(2));
        state.completed = 2;
        assert!(state.finished(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_trigger_rejects_stale_staging() {
        let kosmos = coordinator(2, 1);
        kosmos.stage(Role::FirstCarbon, Worker::carbon(2)).unwrap();

        let _first = spawn_worker(&kosmos, Worker::carbon(1));
        let _second = spawn_worker(&kosmos, Worker::carbon(2));
        wait_for_waiting(&kosmos, 2, 0).await;

        let err = timeout(DEADLOCK_GUARD, kosmos.register(Worker::hydrogen(1)))
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_free_counters_never_negative() {
        let mut free = FreeCounters::default();
        free.add(Kind::Carbon);
        assert!(!free.can_react());
        free.add(Kind::Carbon);
        free.add(Kind::Hydrogen);
        assert!(free.can_react());

        free.remove(Kind::Carbon, 2).unwrap();
        assert!(free.remove(Kind::Carbon, 1).unwrap_err().is_invariant_violation());
        assert_eq!(free.carbon, 0);
    }
}
