//! airwire-broker entry point.
//!
//! Bootstrap glue: parse the command line, initialize logging, bring the
//! Wi-Fi provider up, bind the command endpoint, emit the readiness marker,
//! and hand control to the event loop. Fatal startup failures exit with
//! status 1 after releasing whatever was already acquired.

use std::io::Write;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use airwire_broker::config::{self, Cli, TransportMode};
use airwire_broker::transport::{local_socket_path, Endpoint};
use airwire_broker::wifi::{NmcliProvider, WifiProvider};
use airwire_broker::Broker;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage problems exit 1; an explicit help request exits 0.
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    // All narration goes to stderr; the data channel carries only frames.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if unsafe { libc::geteuid() } != 0 {
        warn!("not running as root; the platform may deny wi-fi control");
    }

    info!("initializing wi-fi interface");
    let mut provider = NmcliProvider::new();
    if let Err(e) = provider.init(cli.interface.as_deref()).await {
        error!(error = %e, "wi-fi initialization failed");
        return ExitCode::from(1);
    }

    let endpoint = match bind_endpoint(cli.transport()).await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!(error = %e, "failed to bind command endpoint");
            provider.cleanup().await;
            return ExitCode::from(1);
        }
    };

    // Readiness marker for the supervising parent: a raw line, not routed
    // through the log formatter.
    {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(b"READY\n");
        let _ = stderr.flush();
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(shutdown.clone());

    let mut broker = Broker::new(endpoint, provider, config::discovery_matcher(), shutdown);
    let result = broker.run().await;

    // Socket first, then the provider.
    broker.shutdown().await;

    match result {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "broker failed");
            ExitCode::from(1)
        }
    }
}

async fn bind_endpoint(mode: TransportMode) -> std::io::Result<Endpoint> {
    match mode {
        TransportMode::Local => Endpoint::bind_local(local_socket_path(config::DEFAULT_CMD_PORT)),
        TransportMode::Udp => Endpoint::bind_udp(config::DEFAULT_CMD_PORT).await,
    }
}

/// SIGINT/SIGTERM set the shared shutdown flag; in-flight handlers finish,
/// the loop observes the flag at its next iteration.
fn spawn_signal_listener(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGINT");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                return;
            }
        };

        tokio::select! {
            _ = interrupt.recv() => info!("SIGINT received, shutting down"),
            _ = terminate.recv() => info!("SIGTERM received, shutting down"),
        }
        shutdown.store(true, Ordering::SeqCst);
    });
}
