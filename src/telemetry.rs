use crate::config::ObservabilityConfig;
use crate::reaction::Totals;
use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize structured logging.
///
/// RUST_LOG wins when set; otherwise the configured level applies, raised to
/// debug for this crate when `verbose` is on.
pub fn init_telemetry(observability: &ObservabilityConfig, verbose: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::try_new(format!("{},ethynyl=debug", observability.log_level))?,
        Err(_) => EnvFilter::try_new(&observability.log_level)?,
    };

    let json_layer = observability.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!observability.json_logs).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    tracing::debug!("ethynyl telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking everything logged by one run
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create the span every atom and controller span nests under
pub fn create_run_span(correlation_id: &str, totals: Totals, seed: u64) -> tracing::Span {
    tracing::info_span!(
        "reaction_run",
        correlation.id = correlation_id,
        seed = seed,
        carbon = totals.carbon,
        hydrogen = totals.hydrogen,
        max_reactions = totals.max_reactions(),
    )
}

/// Shutdown telemetry gracefully
pub fn shutdown_telemetry() {
    // For structured logging, no explicit shutdown needed
    tracing::debug!("ethynyl telemetry shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        let first = generate_correlation_id();
        let second = generate_correlation_id();
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
