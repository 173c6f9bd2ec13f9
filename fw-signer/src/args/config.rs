//! Signing config file, TOML.
//!
//! ```toml
//! secret = "/keys/signer.pem"
//! aes_key = "/keys/aes.bin"
//! device_id = "0x69"
//! ```

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// SEC1 PEM file with the secp256k1 signing key.
    pub secret: Option<PathBuf>,
    /// Package encryption key, raw or hex.
    pub aes_key: Option<PathBuf>,
    /// Device the packages are built for, decimal or `0x` hex.
    pub device_id: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config = std::fs::read_to_string(path).map_err(|e| Error::Read(path.to_owned(), e))?;
        toml::from_str(&config).map_err(|e| Error::Parse(path.to_owned(), e))
    }
}

#[derive(Debug)]
pub enum Error {
    Read(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Read(path, e) => write!(f, "failed to read signing config {}: {e}", path.display()),
            Error::Parse(path, e) => write!(
                f,
                "signing config {} is invalid (expected secret, aes_key and device_id): {e}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for Error {}
