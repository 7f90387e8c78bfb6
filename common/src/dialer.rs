use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A live byte stream to the local daemon endpoint.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

/// Boxed connection handed from a dialer to the relay.
pub type BoxedConnection = Box<dyn Connection>;

/// Capability for opening a fresh connection to the local daemon endpoint.
///
/// The relay server is written against this trait only; the concrete
/// implementation (Unix domain socket or Windows named pipe) is chosen at
/// composition time.
#[async_trait]
pub trait LocalEndpointDialer: Send + Sync {
    /// Opens a new connection to the local endpoint.
    async fn dial(&self) -> io::Result<BoxedConnection>;

    /// Human-readable endpoint description, for logging.
    fn endpoint(&self) -> String;
}

/// The conventional Docker daemon control socket on Unix.
#[cfg(unix)]
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// The conventional Docker daemon named pipe on Windows.
#[cfg(windows)]
pub const DEFAULT_DOCKER_PIPE: &str = r"\\.\pipe\docker_engine";

/// Dials a Unix domain socket path.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixSocketDialer {
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl UnixSocketDialer {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
impl Default for UnixSocketDialer {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_SOCKET)
    }
}

#[cfg(unix)]
#[async_trait]
impl LocalEndpointDialer for UnixSocketDialer {
    async fn dial(&self) -> io::Result<BoxedConnection> {
        let stream = tokio::net::UnixStream::connect(&self.path).await?;
        Ok(Box::new(stream))
    }

    fn endpoint(&self) -> String {
        self.path.display().to_string()
    }
}

/// Dials a Windows named pipe.
#[cfg(windows)]
#[derive(Debug, Clone)]
pub struct NamedPipeDialer {
    name: String,
}

#[cfg(windows)]
impl NamedPipeDialer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg(windows)]
impl Default for NamedPipeDialer {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_PIPE)
    }
}

#[cfg(windows)]
#[async_trait]
impl LocalEndpointDialer for NamedPipeDialer {
    async fn dial(&self) -> io::Result<BoxedConnection> {
        let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(&self.name)?;
        Ok(Box::new(pipe))
    }

    fn endpoint(&self) -> String {
        self.name.clone()
    }
}
