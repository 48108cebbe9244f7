use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global JSON subscriber on stderr.
///
/// `RUST_LOG` takes precedence. Without it, `quiet` selects `warn` and
/// otherwise `info`. Calling this more than once is harmless: the second
/// install fails and is ignored.
pub fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_current_span(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_is_noop() {
        init_logging(true);
        init_logging(false);
        tracing::info!(event = "core.logging.test_completed");
    }
}
