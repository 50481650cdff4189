use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with optional quiet mode.
///
/// When `quiet` is true, only error-level events are emitted.
/// When `quiet` is false, info-level and above events are emitted (default).
/// `RUST_LOG` directives are honoured on top of the default.
pub fn init_logging(quiet: bool) {
    let directive = if quiet {
        "treehouse=error"
    } else {
        "treehouse=info"
    };

    let filter = match directive.parse() {
        Ok(d) => EnvFilter::from_default_env().add_directive(d),
        Err(_) => EnvFilter::from_default_env(),
    };

    // try_init: integration tests may install a subscriber more than once
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(filter)
        .try_init();
}
