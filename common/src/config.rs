use std::path::{Path, PathBuf};

/// The default directory for generated credentials, relative to the
/// working directory.
pub const DEFAULT_CERTS_DIR: &str = "certs";

/// On-disk layout of the six credential artifacts shared between the
/// bootstrap step and the relay server.
///
/// The file names follow the conventional Docker TLS layout, so the client
/// pair can be dropped into `~/.docker/<host>` unchanged: `cert.pem` and
/// `key.pem` are the *client* credential.
#[derive(Debug, Clone)]
pub struct CertPaths {
    /// CA certificate (`ca.pem`), the single trust anchor for client
    /// verification.
    pub ca_cert: PathBuf,
    /// CA private key (`ca-key.pem`), used only while signing.
    pub ca_key: PathBuf,
    /// Server certificate (`server-cert.pem`).
    pub server_cert: PathBuf,
    /// Server private key (`server-key.pem`).
    pub server_key: PathBuf,
    /// Client certificate (`cert.pem`), handed to remote clients out of
    /// band.
    pub client_cert: PathBuf,
    /// Client private key (`key.pem`).
    pub client_key: PathBuf,
}

impl CertPaths {
    /// Creates the conventional layout rooted at `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let base = dir.as_ref();
        Self {
            ca_cert: base.join("ca.pem"),
            ca_key: base.join("ca-key.pem"),
            server_cert: base.join("server-cert.pem"),
            server_key: base.join("server-key.pem"),
            client_cert: base.join("cert.pem"),
            client_key: base.join("key.pem"),
        }
    }

    /// All six artifact paths, CA pair first.
    pub fn all(&self) -> [&Path; 6] {
        [
            &self.ca_cert,
            &self.ca_key,
            &self.server_cert,
            &self.server_key,
            &self.client_cert,
            &self.client_key,
        ]
    }
}

impl Default for CertPaths {
    fn default() -> Self {
        Self::in_dir(DEFAULT_CERTS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_uses_conventional_docker_names() {
        let paths = CertPaths::in_dir("/tmp/certs");
        assert_eq!(paths.ca_cert, PathBuf::from("/tmp/certs/ca.pem"));
        assert_eq!(paths.client_cert, PathBuf::from("/tmp/certs/cert.pem"));
        assert_eq!(paths.client_key, PathBuf::from("/tmp/certs/key.pem"));
        assert_eq!(
            paths.server_cert,
            PathBuf::from("/tmp/certs/server-cert.pem")
        );
    }

    #[test]
    fn all_lists_ca_pair_first() {
        let paths = CertPaths::default();
        let all = paths.all();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], paths.ca_cert.as_path());
        assert_eq!(all[1], paths.ca_key.as_path());
    }
}
