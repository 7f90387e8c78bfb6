//! Certificate bootstrap.
//!
//! Ensures the CA, server, and client keypairs exist on disk, creating any
//! missing ones through an external signing tool (`openssl` by default).
//! Every artifact is skip-if-present, so re-running the bootstrap is safe
//! and never regenerates a credential.

use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::fs;

use thiserror::Error;

use dockbridge_common::config::CertPaths;

/// Everything the bootstrap needs, threaded explicitly; there is no ambient
/// or process-global configuration.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Subject CN and SAN DNS name for the CA and server certificates.
    pub hostname: String,
    /// Explicit SAN IP override. When unset, the hostname is reused if it
    /// is itself a dotted quad, otherwise `127.0.0.1`.
    pub ip_address: Option<String>,
    /// Target locations of the six credential artifacts.
    pub paths: CertPaths,
    /// The external signing program.
    pub signing_program: PathBuf,
    /// Certificate validity in days.
    pub validity_days: u32,
    /// RSA key size in bits.
    pub key_bits: u32,
}

impl BootstrapConfig {
    pub fn new(hostname: impl Into<String>, paths: CertPaths) -> Self {
        Self {
            hostname: hostname.into(),
            ip_address: None,
            paths,
            signing_program: PathBuf::from("openssl"),
            validity_days: 365,
            key_bits: 4096,
        }
    }
}

/// Fatal bootstrap errors. Nothing here is retried.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("refusing to run without certs directory {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to launch signing tool {program}")]
    SpawnSigner {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The signing tool exited non-zero; its combined stdout/stderr is
    /// carried verbatim so the operator can diagnose subject or extension
    /// misconfiguration.
    #[error("{step} failed ({status}):\n{output}")]
    Signer {
        step: &'static str,
        status: ExitStatus,
        output: String,
    },

    #[error("failed to write {path}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A leftover CSR or extension file could not be deleted. Surfacing the
    /// leak is preferred over ignoring it.
    #[error("failed to remove temporary file {path}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to set permissions on {path}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Ensures all six credential artifacts exist, generating any missing ones.
///
/// Generation order is CA, then server, then client; each step is skipped
/// when its certificate file already exists. Note the skip check is
/// per-artifact: a leaf certificate left on disk after the CA files were
/// deleted is kept as-is, not re-derived from the regenerated CA.
pub fn ensure_certificates(config: &BootstrapConfig) -> Result<(), BootstrapError> {
    check_target_directories(&config.paths)?;

    if !config.paths.ca_cert.exists() {
        generate_ca(config)?;
    }
    if !config.paths.server_cert.exists() {
        generate_server_credential(config)?;
    }
    if !config.paths.client_cert.exists() {
        generate_client_credential(config)?;
    }

    // World-readable/writable so the artifacts survive copy/paste workflows.
    allow_all(&config.paths.all())
}

/// The bootstrap never creates directories implicitly; a missing target
/// directory is a precondition failure reported before anything is written.
fn check_target_directories(paths: &CertPaths) -> Result<(), BootstrapError> {
    for path in paths.all() {
        let dir = parent_dir(path);
        if !dir.is_dir() {
            return Err(BootstrapError::MissingDirectory(dir.to_path_buf()));
        }
    }
    Ok(())
}

fn generate_ca(config: &BootstrapConfig) -> Result<(), BootstrapError> {
    tracing::info!(
        "generating CA certificate {:?} {:?}",
        config.paths.ca_cert,
        config.paths.ca_key
    );

    let mut cmd = Command::new(&config.signing_program);
    cmd.arg("req")
        .arg("-new")
        .arg("-x509")
        .arg("-days")
        .arg(config.validity_days.to_string())
        .arg("-sha256")
        .arg("-newkey")
        .arg(format!("rsa:{}", config.key_bits))
        .arg("-nodes")
        .arg("-subj")
        .arg(format!("/C=ZZ/ST=ZZ/L=ZZ/O=ZZ/CN={}", config.hostname))
        .arg("-out")
        .arg(&config.paths.ca_cert)
        .arg("-keyout")
        .arg(&config.paths.ca_key);
    run_signer("generating CA certificate", &config.signing_program, &mut cmd)
}

fn generate_server_credential(config: &BootstrapConfig) -> Result<(), BootstrapError> {
    tracing::info!(
        "generating server certificate {:?} {:?}",
        config.paths.server_cert,
        config.paths.server_key
    );

    let dir = parent_dir(&config.paths.server_cert);
    let csr_path = dir.join("server.csr");
    let ext_path = dir.join("extfile.cnf");

    let mut cmd = Command::new(&config.signing_program);
    cmd.arg("req")
        .arg("-new")
        .arg("-newkey")
        .arg(format!("rsa:{}", config.key_bits))
        .arg("-nodes")
        .arg("-subj")
        .arg(format!("/CN={}", config.hostname))
        .arg("-out")
        .arg(&csr_path)
        .arg("-keyout")
        .arg(&config.paths.server_key);
    run_signer("generating server key", &config.signing_program, &mut cmd)?;

    let ext = format!(
        "subjectAltName = DNS:{},IP:{}\nextendedKeyUsage = serverAuth\n",
        config.hostname,
        san_ip_address(config)
    );
    fs::write(&ext_path, ext).map_err(|source| BootstrapError::WriteFile {
        path: ext_path.clone(),
        source,
    })?;

    let mut cmd = Command::new(&config.signing_program);
    cmd.arg("x509")
        .arg("-req")
        .arg("-days")
        .arg(config.validity_days.to_string())
        .arg("-sha256")
        .arg("-extfile")
        .arg(&ext_path)
        .arg("-in")
        .arg(&csr_path)
        .arg("-CA")
        .arg(&config.paths.ca_cert)
        .arg("-CAkey")
        .arg(&config.paths.ca_key)
        .arg("-CAcreateserial")
        .arg("-out")
        .arg(&config.paths.server_cert);
    run_signer("signing server certificate", &config.signing_program, &mut cmd)?;

    remove_all(&[&csr_path, &ext_path])
}

fn generate_client_credential(config: &BootstrapConfig) -> Result<(), BootstrapError> {
    tracing::info!(
        "generating client certificate {:?} {:?}",
        config.paths.client_cert,
        config.paths.client_key
    );

    let dir = parent_dir(&config.paths.client_cert);
    let csr_path = dir.join("client.csr");
    let ext_path = dir.join("extfile-client.cnf");

    let mut cmd = Command::new(&config.signing_program);
    cmd.arg("req")
        .arg("-subj")
        .arg("/CN=client")
        .arg("-new")
        .arg("-newkey")
        .arg(format!("rsa:{}", config.key_bits))
        .arg("-nodes")
        .arg("-out")
        .arg(&csr_path)
        .arg("-keyout")
        .arg(&config.paths.client_key);
    run_signer("generating client key", &config.signing_program, &mut cmd)?;

    fs::write(&ext_path, "extendedKeyUsage = clientAuth\n").map_err(|source| {
        BootstrapError::WriteFile {
            path: ext_path.clone(),
            source,
        }
    })?;

    let mut cmd = Command::new(&config.signing_program);
    cmd.arg("x509")
        .arg("-req")
        .arg("-days")
        .arg(config.validity_days.to_string())
        .arg("-sha256")
        .arg("-extfile")
        .arg(&ext_path)
        .arg("-in")
        .arg(&csr_path)
        .arg("-CA")
        .arg(&config.paths.ca_cert)
        .arg("-CAkey")
        .arg(&config.paths.ca_key)
        .arg("-CAcreateserial")
        .arg("-out")
        .arg(&config.paths.client_cert);
    run_signer("signing client certificate", &config.signing_program, &mut cmd)?;

    remove_all(&[&csr_path, &ext_path])
}

/// The SAN IP for the server certificate: an explicit override wins, a
/// dotted-quad hostname is reused, anything else falls back to loopback.
fn san_ip_address(config: &BootstrapConfig) -> String {
    if let Some(ip) = &config.ip_address {
        return ip.clone();
    }
    if config.hostname.parse::<Ipv4Addr>().is_ok() {
        config.hostname.clone()
    } else {
        "127.0.0.1".to_string()
    }
}

fn run_signer(
    step: &'static str,
    program: &Path,
    cmd: &mut Command,
) -> Result<(), BootstrapError> {
    let output = cmd.output().map_err(|source| BootstrapError::SpawnSigner {
        program: program.to_path_buf(),
        source,
    })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(BootstrapError::Signer {
            step,
            status: output.status,
            output: combined,
        });
    }

    if !combined.trim().is_empty() {
        tracing::debug!("{step}: {}", combined.trim());
    }
    Ok(())
}

fn remove_all(paths: &[&Path]) -> Result<(), BootstrapError> {
    for path in paths {
        fs::remove_file(path).map_err(|source| BootstrapError::RemoveFile {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn allow_all(paths: &[&Path]) -> Result<(), BootstrapError> {
    use std::os::unix::fs::PermissionsExt;

    for path in paths {
        fs::set_permissions(path, fs::Permissions::from_mode(0o666)).map_err(|source| {
            BootstrapError::Permissions {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn allow_all(_paths: &[&Path]) -> Result<(), BootstrapError> {
    // Windows has no world-writable mode bits to set here.
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
