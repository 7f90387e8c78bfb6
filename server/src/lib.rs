//! Dockbridge relay server.
//!
//! Terminates mutual TLS on a TCP listener and relays raw bytes between
//! each authenticated client connection and a freshly dialed connection to
//! the local container daemon endpoint. The carried protocol is never
//! inspected or modified.

use std::convert::Infallible;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::{fs, fmt};

use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use rustls_pemfile::{certs, private_key};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use dockbridge_common::config::CertPaths;
use dockbridge_common::dialer::LocalEndpointDialer;
use dockbridge_common::relay::relay;

pub mod bootstrap;
pub mod script;

/// Fatal errors raised while setting up the listener. None of these are
/// retried; the process is expected to exit.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read {role} from {path}")]
    ReadCredential {
        role: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {role} in {path}")]
    ParseCredential {
        role: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no private key found in {0}")]
    MissingPrivateKey(PathBuf),

    #[error("no valid CA certificates found in {0}")]
    EmptyCaPool(PathBuf),

    #[error("failed to build client certificate verifier")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error("failed to build TLS server configuration")]
    Tls(#[from] rustls::Error),

    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// A mutual-TLS-terminating relay in front of the local daemon endpoint.
///
/// Every accepted connection must present a client certificate signed by
/// the single configured CA; the handshake layer rejects anything else
/// before a byte reaches the relay.
#[derive(Clone)]
pub struct RelayServer {
    acceptor: TlsAcceptor,
    dialer: Arc<dyn LocalEndpointDialer>,
}

impl fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayServer")
            .field("endpoint", &self.dialer.endpoint())
            .finish_non_exhaustive()
    }
}

impl RelayServer {
    /// Loads the server keypair and CA trust anchor and builds the TLS
    /// acceptor. Fails fatally on any unreadable or unparseable credential.
    pub fn new(
        paths: &CertPaths,
        dialer: Arc<dyn LocalEndpointDialer>,
    ) -> Result<Self, StartupError> {
        // Install default crypto provider for rustls if not already installed
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        tracing::info!("loading server credentials:");
        tracing::info!("  - server cert: {:?}", paths.server_cert);
        tracing::info!("  - server key: {:?}", paths.server_key);
        tracing::info!("  - CA cert: {:?}", paths.ca_cert);

        let cert_pem = read_credential("server certificate", &paths.server_cert)?;
        let key_pem = read_credential("server private key", &paths.server_key)?;
        let ca_pem = read_credential("CA certificate", &paths.ca_cert)?;

        let cert_chain = certs(&mut BufReader::new(&*cert_pem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| StartupError::ParseCredential {
                role: "server certificate",
                path: paths.server_cert.clone(),
                source,
            })?;

        let private_key = private_key(&mut BufReader::new(&*key_pem))
            .map_err(|source| StartupError::ParseCredential {
                role: "server private key",
                path: paths.server_key.clone(),
                source,
            })?
            .ok_or_else(|| StartupError::MissingPrivateKey(paths.server_key.clone()))?;

        // Trust pool containing exactly the bootstrap CA.
        let mut root_store = RootCertStore::empty();
        let ca_certs = certs(&mut BufReader::new(&*ca_pem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| StartupError::ParseCredential {
                role: "CA certificate",
                path: paths.ca_cert.clone(),
                source,
            })?;
        root_store.add_parsable_certificates(ca_certs);

        if root_store.is_empty() {
            return Err(StartupError::EmptyCaPool(paths.ca_cert.clone()));
        }

        let client_verifier = WebPkiClientVerifier::builder(Arc::new(root_store)).build()?;

        let config = ServerConfig::builder()
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(cert_chain, private_key)?;

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
            dialer,
        })
    }

    /// Binds the TCP listener and serves connections indefinitely. Only a
    /// failed bind returns; everything after that is per-connection and
    /// non-fatal.
    pub async fn serve(&self, listen_addr: &str) -> Result<Infallible, StartupError> {
        let listener =
            TcpListener::bind(listen_addr)
                .await
                .map_err(|source| StartupError::Bind {
                    addr: listen_addr.to_string(),
                    source,
                })?;
        self.serve_on(listener).await
    }

    /// Serves connections from an already-bound listener. Used directly by
    /// tests that bind on an ephemeral port.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<Infallible, StartupError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("relay server listening on {addr}, forwarding to {}", self.dialer.endpoint());
        }

        loop {
            // One bad connection must never bring down the listener.
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!("accept failed: {e}");
                    continue;
                }
            };

            let acceptor = self.acceptor.clone();
            let dialer = Arc::clone(&self.dialer);
            tokio::spawn(async move {
                handle_connection(acceptor, dialer, stream, peer).await;
            });
        }
    }
}

fn read_credential(role: &'static str, path: &std::path::Path) -> Result<Vec<u8>, StartupError> {
    fs::read(path).map_err(|source| StartupError::ReadCredential {
        role,
        path: path.to_path_buf(),
        source,
    })
}

/// Lifecycle of one accepted connection:
/// accepted -> TLS handshake -> dial local endpoint -> relay -> closed.
/// Every failure here is per-connection; the stream is dropped and the task
/// ends, closing both sides together.
async fn handle_connection(
    acceptor: TlsAcceptor,
    dialer: Arc<dyn LocalEndpointDialer>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(%peer, "TLS handshake failed: {e}");
            return;
        }
    };
    tracing::debug!(%peer, "client certificate verified");

    let local_conn = match dialer.dial().await {
        Ok(conn) => conn,
        Err(e) => {
            // No retry: the daemon endpoint is either there or it is not.
            tracing::error!(
                %peer,
                endpoint = %dialer.endpoint(),
                "dialing local endpoint failed: {e}"
            );
            return;
        }
    };
    tracing::debug!(%peer, endpoint = %dialer.endpoint(), "relaying");

    match relay(tls_stream, local_conn).await {
        Ok(bytes) => tracing::debug!(%peer, bytes, "relay finished"),
        Err(e) => tracing::debug!(%peer, "relay ended with error: {e}"),
    }
    tracing::info!(%peer, "connection closed");
}
