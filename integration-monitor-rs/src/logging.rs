//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber for the monitor binary.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::MonitorError;

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize logging with an `EnvFilter` from `RUST_LOG` (default `info`),
/// as JSON lines or human-readable text. Calling it again is a no-op.
pub fn init_logging(json_format: bool) -> Result<(), MonitorError> {
    if LOGGING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| MonitorError::Config(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_noop() {
        // A subscriber may already be installed by another test; either way
        // the second call must not fail.
        let _ = init_logging(false);
        assert!(init_logging(true).is_ok());
    }
}
