mod cluster;
mod config;
mod metrics;
mod node;
mod replication;
mod report;

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;

use node::PgConnector;
use report::{StatusReporter, WriteTrigger};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Built-in search path first, then files named on the command line
    let mut paths: Vec<String> = config::DEFAULT_CONFIG_PATHS
        .iter()
        .map(|p| p.to_string())
        .collect();
    paths.extend(std::env::args().skip(1));
    let settings = config::load_settings(&paths)?;

    info!(
        node = %settings.node_name,
        logfile = %settings.cluster_logger_logfile.display(),
        min_interval = settings.cluster_logger_min_interval,
        max_interval = settings.cluster_logger_max_interval,
        "Cluster logger configured"
    );

    let connector = Arc::new(PgConnector::new().with_application_name("pg-cluster-logger"));
    let mut reporter = StatusReporter::new(&settings, connector)?;

    let shutdown = CancellationToken::new();
    let trigger = Arc::new(WriteTrigger::new());
    spawn_signal_handlers(shutdown.clone(), trigger.clone())?;

    let interval = settings.min_interval();
    while !shutdown.is_cancelled() {
        let force = trigger.take();
        match reporter.run_cycle(force).await {
            Ok(written) => debug!(written = written, forced = force, "Cycle complete"),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => error!(error = %e, "Cycle failed"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = trigger.requested() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Cluster logger stopped");
    Ok(())
}

/// Termination cancels the loop; SIGUSR1 requests a forced write
fn spawn_signal_handlers(
    shutdown: CancellationToken,
    trigger: Arc<WriteTrigger>,
) -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut force = signal(SignalKind::user_defined1())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = terminate.recv() => {
                    info!("SIGTERM received, stopping after current cycle");
                    shutdown.cancel();
                    break;
                }
                _ = interrupt.recv() => {
                    info!("SIGINT received, stopping after current cycle");
                    shutdown.cancel();
                    break;
                }
                _ = force.recv() => {
                    info!("SIGUSR1 received, forcing status write");
                    trigger.request();
                }
            }
        }
    });
    Ok(())
}
