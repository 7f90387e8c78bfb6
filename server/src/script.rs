//! Client-side setup script generation.
//!
//! Remote clients need the client certificate, key, and CA certificate to
//! pass mutual TLS. This module renders a shell script embedding those
//! three PEM files plus a `env.sh` pointing the Docker CLI at the relay,
//! wrapped in copy/paste instructions with a SHA-256 checksum so the
//! operator can verify the clipboard made it across intact.

use std::fs;
use std::io;

use sha2::{Digest, Sha256};

use dockbridge_common::config::CertPaths;

/// Renders the setup script for `hostname` with the instruction banner.
/// Reads the client certificate, client key, and CA certificate from disk,
/// so the bootstrap must have run first.
pub fn client_setup_instructions(hostname: &str, paths: &CertPaths) -> io::Result<String> {
    let cert_data = fs::read_to_string(&paths.client_cert)?;
    let key_data = fs::read_to_string(&paths.client_key)?;
    let ca_data = fs::read_to_string(&paths.ca_cert)?;

    let script = render_script(hostname, &cert_data, &key_data, &ca_data);
    let checksum = hex::encode(Sha256::digest(script.as_bytes()));

    Ok(format!(
        r#"
##### COPY BELOW (including newlines) #####
{script}##### COPY ABOVE (including newlines) #####

##### INSTRUCTIONS #####
Copy to the clipboard all text and newlines between 'COPY ABOVE' and 'COPY BELOW'

Run on MacOS with:
pbpaste | shasum -a 256  # should match {checksum}
pbpaste | bash

or Linux:
xclip -o -selection clipboard | shasum -a 256
xclip -o -selection clipboard | bash

Expected SHA256: {checksum}
##### END INSTRUCTIONS #####
"#
    ))
}

fn render_script(hostname: &str, cert_data: &str, key_data: &str, ca_data: &str) -> String {
    format!(
        r#"set -o errexit

mkdir -p ~/.docker/{hostname}

cat > ~/.docker/{hostname}/cert.pem <<EOF
{cert_data}
EOF

cat > ~/.docker/{hostname}/key.pem <<EOF
{key_data}
EOF

cat > ~/.docker/{hostname}/ca.pem <<EOF
{ca_data}
EOF

cat > ~/.docker/{hostname}/env.sh <<EOF
export DOCKER_HOST=tcp://{hostname}:2376
export DOCKER_CERT_PATH=~/.docker/{hostname}
export DOCKER_TLS_VERIFY=1
EOF

echo "Load with: 'source ~/.docker/{hostname}/env.sh'"
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_paths() -> (tempfile::TempDir, CertPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = CertPaths::in_dir(dir.path());
        fs::write(&paths.client_cert, "CLIENT-CERT-PEM").unwrap();
        fs::write(&paths.client_key, "CLIENT-KEY-PEM").unwrap();
        fs::write(&paths.ca_cert, "CA-CERT-PEM").unwrap();
        (dir, paths)
    }

    #[test]
    fn script_embeds_credentials_and_docker_env() {
        let (_dir, paths) = fixture_paths();
        let out = client_setup_instructions("build-host", &paths).unwrap();

        assert!(out.contains("CLIENT-CERT-PEM"));
        assert!(out.contains("CLIENT-KEY-PEM"));
        assert!(out.contains("CA-CERT-PEM"));
        assert!(out.contains("mkdir -p ~/.docker/build-host"));
        assert!(out.contains("export DOCKER_HOST=tcp://build-host:2376"));
        assert!(out.contains("export DOCKER_TLS_VERIFY=1"));
    }

    #[test]
    fn checksum_matches_the_embedded_script() {
        let (_dir, paths) = fixture_paths();
        let out = client_setup_instructions("localhost", &paths).unwrap();

        let begin = out.find("#####\n").unwrap() + "#####\n".len();
        let end = out.find("##### COPY ABOVE").unwrap();
        let script = &out[begin..end];

        let checksum = hex::encode(Sha256::digest(script.as_bytes()));
        assert!(out.contains(&format!("Expected SHA256: {checksum}")));
    }

    #[test]
    fn missing_client_credentials_surface_as_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CertPaths::in_dir(dir.path());
        let err = client_setup_instructions("localhost", &paths).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
