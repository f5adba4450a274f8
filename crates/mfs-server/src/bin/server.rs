//! mfs gateway server
//!
//! Serves a local bucket over HTTP with policy-based authorization

use anyhow::Context as _;
use clap::Parser;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use mfs::Config;
use mfs_server::Server;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "mfs-server")]
#[command(about = "Policy-guarded object storage over HTTP")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short = 'c', long, default_value = "mfs.toml")]
    config: PathBuf,

    /// Bind address (overrides [server].host)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port number (overrides [server].port)
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Bucket directory (overrides [bucket].path)
    #[arg(short = 'd', long)]
    data_dir: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_dir) = &args.data_dir {
        config.bucket.path = data_dir.clone();
    }
    Ok(config)
}

/// Re-read policies from the configuration file on SIGHUP
#[cfg(unix)]
fn spawn_policy_reload(server: Arc<Server>, path: PathBuf) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading policies from {}", path.display());
            match Config::load(&path).and_then(|config| config.access_manager()) {
                Ok(manager) => server.replace_access_manager(manager),
                Err(e) => warn!("Keeping current policies: {}", e),
            }
        }
    });
    Ok(())
}

/// Bind the listener; `host` may be an IP literal or a resolvable name
async fn bind(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding {}:{}", host, port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting mfs server");
    info!("Configuration: {:?}", args.config);

    let config = load_config(&args)?;
    let server = Arc::new(Server::from_config(&config)?);
    info!(
        "{} policies, debug requests {}, public metrics {}",
        server.access_manager().len(),
        if server.options().debug_requests { "on" } else { "off" },
        if server.options().public_metrics { "on" } else { "off" },
    );

    #[cfg(unix)]
    spawn_policy_reload(server.clone(), args.config.clone())?;

    let listener = bind(&config.server.host, config.server.port).await?;
    let local_addr = listener.local_addr()?;
    let http_server = ConnBuilder::new(TokioExecutor::new());

    info!("Listening on http://{}", local_addr);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((socket, remote)) => {
                        let server = server.clone();
                        let http_server = http_server.clone();
                        tokio::spawn(async move {
                            let service = hyper::service::service_fn(move |request| {
                                mfs_server::http::handle(server.clone(), request, Some(remote))
                            });
                            if let Err(e) = http_server.serve_connection(TokioIo::new(socket), service).await {
                                warn!("Connection error from {}: {}", remote, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    info!("Server stopped");
    Ok(())
}
