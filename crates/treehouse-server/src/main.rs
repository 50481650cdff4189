use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use treehouse_core::{TreehouseConfig, init_logging};
use treehouse_server::run_server;

mod app;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = app::build_cli().get_matches();

    // Extract quiet flag before initializing logging
    init_logging(matches.get_flag("quiet"));

    let explicit = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
    let mut config = TreehouseConfig::load_hierarchy(explicit)?;
    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }
    if let Some(bind) = matches.get_one::<String>("bind") {
        config.server.bind = bind.clone();
    }
    config.validate()?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    if let Err(e) = run_server(&config, shutdown).await {
        error!(event = "server.run.failed", error = %e);
        return Err(e.into());
    }
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            error!(event = "server.signal.install_failed", error = %e);
            None
        }
    };

    let received = tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = async {
            match terminate.as_mut() {
                Some(s) => { s.recv().await; }
                None => std::future::pending::<()>().await,
            }
        } => "SIGTERM",
    };

    info!(event = "server.signal.received", signal = received);
    shutdown.cancel();
}
