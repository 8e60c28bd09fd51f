//! `certd-service` entry point.
//!
//! ## Modes
//!
//! - **Service mode** (default): load configuration, bind the socket, serve
//!   until Ctrl-C or, when `service.idle_timeout_secs > 0`, until the
//!   service has been idle that long with no open connections.
//! - **`--ping`**: connect to the running service, send a hello handshake,
//!   verify the response, then exit.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use certd_core::config::{AppConfig, ConfigLoader};
use certd_service::manager::CertificateManager;
use clap::Parser;

/// Poll interval for the idle timer.
const IDLE_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Parser)]
#[command(name = "certd-service", version, about = "Certificate issuance and verification service")]
struct Args {
    /// Check that a service is answering on the socket, then exit.
    #[arg(long)]
    ping: bool,

    /// Configuration file (defaults to ./certd.toml, then the XDG config dir).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the socket path from configuration.
    #[arg(long)]
    socket: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => ConfigLoader::new().with_file(path).load(),
        None => ConfigLoader::load_default(),
    };
    config.context("Failed to load configuration")
}

/// Send a hello handshake and verify the response.
fn ping(path: &Path) -> anyhow::Result<()> {
    let mut stream = std::os::unix::net::UnixStream::connect(path)
        .with_context(|| format!("ping: cannot connect to {}", path.display()))?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    let hello = serde_json::json!({
        "id": 0,
        "method": "hello",
        "params": {
            "protocol_version": certd_service::PROTOCOL_VERSION,
            "client_version": concat!("certd-service-ping/", env!("CARGO_PKG_VERSION")),
        }
    });
    let mut bytes = serde_json::to_vec(&hello)?;
    bytes.push(b'\n');
    stream.write_all(&bytes)?;
    stream.flush()?;

    let mut reader = std::io::BufReader::new(&stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    let resp: serde_json::Value =
        serde_json::from_str(line.trim()).context("ping: invalid response JSON")?;
    if resp.get("result").is_some() {
        eprintln!("ping: service is alive");
        Ok(())
    } else {
        let msg = resp
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error");
        anyhow::bail!("ping: hello failed: {msg}")
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let socket_path = args
        .socket
        .clone()
        .unwrap_or_else(|| certd_service::socket_path(&config));

    if args.ping {
        return ping(&socket_path);
    }

    run_service(config, socket_path)
}

#[tokio::main]
async fn run_service(config: AppConfig, socket_path: PathBuf) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("certd-service v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Issuer {:?}, verification latency {}ms, seed={}",
        config.issuer.organization,
        config.verification.latency_ms,
        config.registry.seed
    );

    let manager = Arc::new(CertificateManager::from_config(&config));
    tracing::info!(
        "Registry loaded with {} certificate(s)",
        manager.certificate_count().await
    );

    let listener = certd_service::ipc::bind(&socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;

    // Shutdown coordination via watch channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let shutdown_tx_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Signal received, shutting down");
        let _ = shutdown_tx_signal.send(true);
    });

    let idle_timeout_secs = config.service.idle_timeout_secs;
    if idle_timeout_secs > 0 {
        let mgr_idle = Arc::clone(&manager);
        tokio::spawn(async move {
            let poll_interval = Duration::from_secs(IDLE_POLL_INTERVAL_SECS.min(idle_timeout_secs));
            let idle_timeout = Duration::from_secs(idle_timeout_secs);
            loop {
                tokio::time::sleep(poll_interval).await;

                let connections = mgr_idle.connection_count();
                let elapsed = mgr_idle.last_activity_elapsed().await;

                if connections == 0 && elapsed >= idle_timeout {
                    tracing::info!("Idle timeout ({idle_timeout_secs}s): no connections. Exiting.");
                    let _ = shutdown_tx.send(true);
                    break;
                }
            }
        });
    }

    certd_service::ipc::serve(manager, listener, shutdown_rx).await?;

    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::debug!("Could not remove socket {}: {e}", socket_path.display());
    }
    tracing::info!("certd-service exiting cleanly");
    Ok(())
}
