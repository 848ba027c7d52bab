//! Layout of the mTLS credential material under a test-run directory.
//!
//! The certificates are generated by the surrounding test harness into
//! `<tmp-dir>/certs/`; this module only knows where to find them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Well-known credential paths below `<base>/certs/`.
#[derive(Debug, Clone)]
pub struct MtlsPaths {
    pub certs_dir: PathBuf,
    pub ca_cert: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub issuer_hash: PathBuf,
}

impl MtlsPaths {
    pub fn new(base: &Path) -> Self {
        let certs_dir = base.join("certs");
        Self {
            ca_cert: certs_dir.join("root-ca.crt"),
            client_cert: certs_dir.join("client.crt"),
            client_key: certs_dir.join("client.key"),
            issuer_hash: certs_dir.join("issuer_hash.txt"),
            certs_dir,
        }
    }

    /// Checks that the client identity and the CA certificate are all
    /// present, naming the first missing file.
    pub fn check_material(&self) -> io::Result<()> {
        for path in [&self.client_cert, &self.client_key, &self.ca_cert] {
            if !path.is_file() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("credential file not found: {}", path.display()),
                ));
            }
        }
        Ok(())
    }

    /// First line of the issuer hash file, as written by the cert generator.
    pub fn issuer_hash(&self) -> io::Result<String> {
        let contents = fs::read_to_string(&self.issuer_hash)?;
        Ok(contents.lines().next().unwrap_or_default().trim().to_string())
    }
}
