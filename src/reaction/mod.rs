// Reaction Module - radical assembly from carbon and hydrogen atoms
//
// Types, the per-worker lifecycle, the coordinator that runs the handshake,
// and the journal that records what formed.

pub mod coordinator;
pub mod journal;
pub mod lifecycle;
pub mod types;

pub use coordinator::{CoordinatorSnapshot, ReactionCoordinator};
pub use journal::{JournalFormat, ReactionJournal, ReactionLog};
pub use lifecycle::{LifecycleEvent, LifecycleTracker, WorkerLifecycle};
pub use types::{CombiningGroup, Kind, ReactionRecord, Resolution, Role, Totals, Worker};
