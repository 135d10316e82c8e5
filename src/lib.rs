// ethynyl Library - radical formation from concurrently arriving atoms
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod error;
pub mod population;
pub mod reaction;
pub mod simulation;
pub mod telemetry;

// Re-export key types for easy access
pub use crate::config::{config, init_config, EthynylConfig};
pub use error::{EthynylError, Result};
pub use population::Population;
pub use reaction::{
    CombiningGroup, CoordinatorSnapshot, JournalFormat, Kind, ReactionCoordinator, ReactionJournal,
    ReactionLog, ReactionRecord, Resolution, Role, Totals, Worker,
};
pub use simulation::{RunReport, Simulation};
pub use telemetry::{create_run_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
