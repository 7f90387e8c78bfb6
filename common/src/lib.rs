//! Dockbridge Common Library
//!
//! Shared plumbing used by the dockbridge relay server:
//!
//! - Credential file layout for the bootstrap-generated TLS artifacts
//! - The local daemon endpoint dialer capability (Unix domain sockets,
//!   Windows named pipes)
//! - The protocol-agnostic full-duplex byte relay

/// Credential file layout
pub mod config;

/// Local daemon endpoint dialing
pub mod dialer;

/// Full-duplex byte relay primitive
pub mod relay;

// Re-export commonly used types for convenience
pub use config::CertPaths;
pub use dialer::{BoxedConnection, LocalEndpointDialer};
pub use relay::relay;
