use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dockbridge_common::config::CertPaths;
use dockbridge_server::bootstrap::{ensure_certificates, BootstrapConfig};
use dockbridge_server::{script, RelayServer};

#[derive(Parser)]
#[command(name = "dockbridge")]
#[command(about = "Expose the local Docker daemon socket over mutual TLS")]
struct Args {
    /// Hostname used as the certificate CN and SAN DNS entry
    #[arg(long, default_value = "localhost")]
    hostname: String,

    /// IP address for the server certificate SAN (defaults to 127.0.0.1,
    /// or to the hostname when it is itself a dotted quad)
    #[arg(long)]
    ip_address: Option<String>,

    /// TCP address to listen on
    #[arg(long, default_value = "0.0.0.0:2376")]
    listen_addr: String,

    /// Directory holding the credential files (must already exist)
    #[arg(long, default_value = "certs")]
    certs_dir: PathBuf,

    /// Override the CA certificate path
    #[arg(long)]
    ca_path: Option<PathBuf>,

    /// Override the CA key path
    #[arg(long)]
    ca_key_path: Option<PathBuf>,

    /// Override the server certificate path
    #[arg(long)]
    server_cert_path: Option<PathBuf>,

    /// Override the server key path
    #[arg(long)]
    server_key_path: Option<PathBuf>,

    /// Override the client certificate path
    #[arg(long)]
    client_cert_path: Option<PathBuf>,

    /// Override the client key path
    #[arg(long)]
    client_key_path: Option<PathBuf>,

    /// Path of the local Docker daemon socket
    #[cfg(unix)]
    #[arg(long, default_value = dockbridge_common::dialer::DEFAULT_DOCKER_SOCKET)]
    socket_path: PathBuf,

    /// Name of the local Docker daemon pipe
    #[cfg(windows)]
    #[arg(long, default_value = dockbridge_common::dialer::DEFAULT_DOCKER_PIPE)]
    pipe_name: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn cert_paths(&self) -> CertPaths {
        let mut paths = CertPaths::in_dir(&self.certs_dir);
        if let Some(p) = &self.ca_path {
            paths.ca_cert = p.clone();
        }
        if let Some(p) = &self.ca_key_path {
            paths.ca_key = p.clone();
        }
        if let Some(p) = &self.server_cert_path {
            paths.server_cert = p.clone();
        }
        if let Some(p) = &self.server_key_path {
            paths.server_key = p.clone();
        }
        if let Some(p) = &self.client_cert_path {
            paths.client_cert = p.clone();
        }
        if let Some(p) = &self.client_key_path {
            paths.client_key = p.clone();
        }
        paths
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let paths = args.cert_paths();

    let mut bootstrap = BootstrapConfig::new(args.hostname.clone(), paths.clone());
    bootstrap.ip_address = args.ip_address.clone();
    ensure_certificates(&bootstrap).context("generating certificates")?;

    let instructions = script::client_setup_instructions(&args.hostname, &paths)
        .context("rendering client setup instructions")?;
    println!("{instructions}");

    #[cfg(unix)]
    let dialer = Arc::new(dockbridge_common::dialer::UnixSocketDialer::new(
        args.socket_path.clone(),
    ));
    #[cfg(windows)]
    let dialer = Arc::new(dockbridge_common::dialer::NamedPipeDialer::new(
        args.pipe_name.clone(),
    ));

    let server = RelayServer::new(&paths, dialer).context("loading server credentials")?;
    server
        .serve(&args.listen_addr)
        .await
        .context("running relay server")?;
    Ok(())
}
