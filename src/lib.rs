pub mod agent_core;
pub mod config;
pub mod health;
pub mod inference;
pub mod mcp_client;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod timeout;

/// Initialize the tracing subscriber. Structured logs go to stderr so report
/// output on stdout stays machine-readable.
///
/// `RUST_LOG` overrides the default filter. `metrics=info` keeps the metrics
/// drain visible without opening the floodgates for dependencies.
pub fn init_tracing(log_json: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fleetwatch=info,metrics=info,warn"));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    if log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    // Startup banner, so a log capture identifies the process at a glance.
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "=== fleetwatch starting ==="
    );
}
