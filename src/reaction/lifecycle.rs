use crate::error::{EthynylError, Result};
use crate::reaction::types::{Resolution, Role, Worker};
use statig::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Register,
    Trigger { role: Role },
    Wait,
    Select { role: Role },
    Release,
    Finish,
}

/// Per-worker protocol state.
///
/// created -> registered -> (triggering | waiting)
/// waiting -> (selected | draining)
/// triggering | selected -> reacted, draining -> drained
///
/// Any event that does not fit the current state is counted as a rejection so
/// the coordinator can turn it into an invariant violation.
#[derive(Debug)]
pub struct WorkerLifecycle {
    pub worker: Worker,
    role: Option<Role>,
    resolution: Option<Resolution>,
    rejections: u32,
}

impl WorkerLifecycle {
    pub fn new(worker: Worker) -> Self {
        Self {
            worker,
            role: None,
            resolution: None,
            rejections: 0,
        }
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    fn reject(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        self.rejections += 1;
        tracing::warn!(worker = %self.worker, event = ?event, "Illegal lifecycle transition");
        Handled
    }
}

#[state_machine(initial = "State::created()")]
impl WorkerLifecycle {
    #[state]
    fn created(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Register => Transition(State::registered()),
            _ => self.reject(event),
        }
    }

    #[state]
    fn registered(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Trigger { role } => {
                self.role = Some(*role);
                tracing::debug!(worker = %self.worker, role = %role, "Worker triggers a reaction");
                Transition(State::triggering())
            }
            LifecycleEvent::Wait => Transition(State::waiting()),
            _ => self.reject(event),
        }
    }

    #[state]
    fn triggering(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Finish => self.react(),
            _ => self.reject(event),
        }
    }

    #[state]
    fn waiting(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Select { role } => {
                self.role = Some(*role);
                Transition(State::selected())
            }
            LifecycleEvent::Release => Transition(State::draining()),
            _ => self.reject(event),
        }
    }

    #[state]
    fn selected(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Finish => self.react(),
            _ => self.reject(event),
        }
    }

    #[state]
    fn draining(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Finish => {
                self.resolution = Some(Resolution::Drained);
                tracing::debug!(worker = %self.worker, "Worker drained without reacting");
                Transition(State::drained())
            }
            _ => self.reject(event),
        }
    }

    #[state]
    fn reacted(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        self.reject(event)
    }

    #[state]
    fn drained(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        self.reject(event)
    }
}

impl WorkerLifecycle {
    fn react(&mut self) -> Outcome<State> {
        match self.role {
            Some(role) => {
                self.resolution = Some(Resolution::Reacted { role });
                Transition(State::reacted())
            }
            None => self.reject(&LifecycleEvent::Finish),
        }
    }
}

/// Drives a [`WorkerLifecycle`] and reports illegal transitions as errors.
pub struct LifecycleTracker {
    machine: StateMachine<WorkerLifecycle>,
}

impl LifecycleTracker {
    pub fn new(worker: Worker) -> Self {
        Self {
            machine: WorkerLifecycle::new(worker).state_machine(),
        }
    }

    pub fn apply(&mut self, event: LifecycleEvent) -> Result<()> {
        let before = self.machine.inner().rejections();
        self.machine.handle(&event);
        let lifecycle = self.machine.inner();
        if lifecycle.rejections() > before {
            return Err(EthynylError::invariant(format!(
                "{} cannot handle {:?} in its current state",
                lifecycle.worker, event
            )));
        }
        Ok(())
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.machine.inner().resolution()
    }
}
