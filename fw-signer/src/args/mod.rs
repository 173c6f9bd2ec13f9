use {
    clap::Parser,
    sec1::der::Decode,
    std::path::{Path, PathBuf},
};

mod cli;
mod config;

pub use config::Error as ConfigError;

/// Program arguments loaded from the CLI and config file.
#[derive(Debug, Clone)]
pub enum Args {
    /// Sign, encrypt and package a firmware file.
    Sign {
        pubkey: Option<secp256k1::PublicKey>,
        secret: secp256k1::SecretKey,
        aes_key: [u8; 16],
        input: PathBuf,
        output: PathBuf,
        version: u32,
        device_id: u32,
    },
    /// Decrypt a package and check its signature.
    Verify {
        pubkey: secp256k1::PublicKey,
        aes_key: [u8; 16],
        device_id: Option<u32>,
        input: PathBuf,
    },
    /// Dump the header contents to stdout.
    Dump {
        aes_key: Option<[u8; 16]>,
        input: PathBuf,
    },
    /// Print the public key of a secret key.
    Pubkey { secret: secp256k1::SecretKey },
}

pub fn args<I, T>(args: I) -> Result<Args, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Args::try_parse_from(args).map_err(Error::Cli)?;
    match cli.command {
        cli::Command::Sign {
            pubkey,
            secret,
            aes_key,
            config,
            input,
            output,
            firmware_version,
            device_id,
        } => {
            let config = config.map(|c| config::Config::load(&c)).transpose()?;
            let config = Reconciled::new(config.as_ref())?;

            // Error if anything is specified both on the CLI and in the config file.
            let secret = match (secret, config.secret) {
                (None, None) => return Err(Error::SecretMissing),
                (None, Some(secret_path)) => secret_path,
                (Some(secret), None) => secret,
                (Some(_), Some(_)) => return Err(Error::SecretInConfigAndCli),
            };
            let aes_key = match (aes_key, config.aes_key) {
                (None, None) => return Err(Error::AesKeyMissing),
                (None, Some(path)) => path,
                (Some(path), None) => path,
                (Some(_), Some(_)) => return Err(Error::AesKeyInConfigAndCli),
            };
            let device_id = match (device_id, config.device_id) {
                (None, None) => consts::DEVICE_ID as u32,
                (None, Some(id)) => parse_device_id(&id)?,
                (Some(id), None) => parse_device_id(&id)?,
                (Some(_), Some(_)) => return Err(Error::DeviceIdInConfigAndCli),
            };

            let pubkey = pubkey.map(|p| parse_pubkey(&p)).transpose()?;
            Ok(Args::Sign {
                pubkey,
                secret: read_secret(&secret)?,
                aes_key: read_aes_key(&aes_key)?,
                input,
                output,
                version: firmware_version,
                device_id,
            })
        }
        cli::Command::Verify {
            pubkey,
            aes_key,
            config,
            device_id,
            input,
        } => {
            let config = config.map(|c| config::Config::load(&c)).transpose()?;
            let config = Reconciled::new(config.as_ref())?;

            let aes_key = match (aes_key, config.aes_key) {
                (None, None) => return Err(Error::AesKeyMissing),
                (None, Some(path)) => path,
                (Some(path), None) => path,
                (Some(_), Some(_)) => return Err(Error::AesKeyInConfigAndCli),
            };
            let device_id = match (device_id, config.device_id) {
                (None, None) => None,
                (None, Some(id)) => Some(parse_device_id(&id)?),
                (Some(id), None) => Some(parse_device_id(&id)?),
                (Some(_), Some(_)) => return Err(Error::DeviceIdInConfigAndCli),
            };
            let pubkey = match pubkey {
                Some(pubkey) => parse_pubkey(&pubkey)?,
                None => secp256k1::PublicKey::from_slice(&consts::SIGNER_PUBKEY).map_err(Error::InvalidPubkey)?,
            };
            Ok(Args::Verify {
                pubkey,
                aes_key: read_aes_key(&aes_key)?,
                device_id,
                input,
            })
        }
        cli::Command::Dump { aes_key, input } => Ok(Args::Dump {
            aes_key: aes_key.map(|path| read_aes_key(&path)).transpose()?,
            input,
        }),
        cli::Command::Pubkey { secret } => Ok(Args::Pubkey {
            secret: read_secret(&secret)?,
        }),
    }
}

/// Values taken from the config file, validated.
#[derive(Default)]
struct Reconciled {
    secret: Option<PathBuf>,
    aes_key: Option<PathBuf>,
    device_id: Option<String>,
}

impl Reconciled {
    fn new(config: Option<&config::Config>) -> Result<Self, Error> {
        let Some(config) = config else {
            return Ok(Self::default());
        };
        for path in [&config.secret, &config.aes_key].into_iter().flatten() {
            if !path.is_absolute() {
                return Err(Error::KeyPathNotAbsoluteInConfig(path.clone()));
            }
        }
        Ok(Self {
            secret: config.secret.clone(),
            aes_key: config.aes_key.clone(),
            device_id: config.device_id.clone(),
        })
    }
}

fn parse_device_id(id: &str) -> Result<u32, Error> {
    let parsed = match id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => id.parse(),
    };
    parsed.map_err(|_| Error::InvalidDeviceId(id.to_owned()))
}

fn parse_pubkey(pubkey: &str) -> Result<secp256k1::PublicKey, Error> {
    secp256k1::PublicKey::from_slice(&hex::decode(pubkey).map_err(|_| Error::InvalidPubkeyHex)?)
        .map_err(Error::InvalidPubkey)
}

fn read_secret(path: &Path) -> Result<secp256k1::SecretKey, Error> {
    let pem = std::fs::read(path).map_err(Error::ReadPemFile)?;
    let key = pem::parse(pem)?;
    if key.tag() != "EC PRIVATE KEY" {
        return Err(Error::InvalidPemTag(key.tag().to_string()));
    }
    let secret = sec1::EcPrivateKey::from_der(key.contents())
        .map_err(Error::ParseDerContent)?
        .private_key;
    secp256k1::SecretKey::from_slice(secret).map_err(Error::InvalidSecretKey)
}

/// The key file holds either the 16 raw key bytes or their hex encoding.
fn read_aes_key(path: &Path) -> Result<[u8; 16], Error> {
    let contents = std::fs::read(path).map_err(Error::ReadAesKeyFile)?;
    if let Ok(key) = <[u8; 16]>::try_from(contents.as_slice()) {
        return Ok(key);
    }
    let text = String::from_utf8_lossy(&contents);
    hex::decode(text.trim())
        .ok()
        .and_then(|bytes| <[u8; 16]>::try_from(bytes.as_slice()).ok())
        .ok_or(Error::InvalidAesKey(contents.len()))
}

#[derive(Debug)]
pub enum Error {
    AesKeyInConfigAndCli,
    AesKeyMissing,
    Cli(clap::Error),
    Config(ConfigError),
    DeviceIdInConfigAndCli,
    InvalidAesKey(usize),
    InvalidDeviceId(String),
    InvalidPemTag(String),
    InvalidPubkey(secp256k1::Error),
    InvalidPubkeyHex,
    InvalidSecretKey(secp256k1::Error),
    KeyPathNotAbsoluteInConfig(PathBuf),
    ParseDerContent(sec1::der::Error),
    ParsePemFile(pem::PemError),
    ReadAesKeyFile(std::io::Error),
    ReadPemFile(std::io::Error),
    SecretInConfigAndCli,
    SecretMissing,
}

impl From<pem::PemError> for Error {
    fn from(e: pem::PemError) -> Self {
        Error::ParsePemFile(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AesKeyInConfigAndCli => write!(f, "AES key specified in both config and cli"),
            Error::AesKeyMissing => write!(f, "user did not specify an AES key"),
            Error::Cli(e) => write!(f, "{}", e.render().ansi()),
            Error::Config(e) => write!(f, "config error: {e}"),
            Error::DeviceIdInConfigAndCli => write!(f, "device id specified in both config and cli"),
            Error::InvalidAesKey(len) => {
                write!(f, "AES key file holds {len} bytes, expected 16 raw bytes or 32 hex digits")
            }
            Error::InvalidDeviceId(id) => write!(f, r#"user specified invalid device id: "{id}""#),
            Error::InvalidPemTag(tag) => {
                write!(f, r#"invalid PEM tag: "{tag}", expected "EC PRIVATE KEY""#)
            }
            Error::InvalidPubkey(e) => write!(f, "user specified invalid public key: {e}"),
            Error::InvalidPubkeyHex => write!(f, "user specified invalid public key hex"),
            Error::InvalidSecretKey(e) => write!(f, "user specified invalid secret key: {e}"),
            Error::KeyPathNotAbsoluteInConfig(path) => {
                write!(
                    f,
                    r#"config error: key path is not absolute: "{}""#,
                    path.to_str().unwrap_or("<invalid path>")
                )
            }
            Error::ParseDerContent(e) => {
                write!(f, "failed to parse DER content inside PEM file: {e}")
            }
            Error::ParsePemFile(e) => write!(f, "invalid PEM file: {e}"),
            Error::ReadAesKeyFile(e) => write!(f, "failed to read AES key file: {e}"),
            Error::ReadPemFile(e) => write!(f, "failed to read PEM file: {e}"),
            Error::SecretInConfigAndCli => write!(f, "secret specified in both config and cli"),
            Error::SecretMissing => write!(f, "user did not specify a secret key"),
        }
    }
}

impl std::error::Error for Error {}
