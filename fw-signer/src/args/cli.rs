//! Command line arguments.

use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Sign, encrypt and package a firmware file for the update protocol.
    Sign {
        /// The public key in hex, verified against the secret key to avoid
        /// accidental signing.
        #[clap(long)]
        pubkey: Option<String>,
        /// Path to PEM-encoded secret key.
        #[clap(long)]
        secret: Option<PathBuf>,
        /// Path to the AES-128 key, 16 raw bytes or 32 hex digits.
        #[clap(long)]
        aes_key: Option<PathBuf>,
        /// Path to config file.
        #[clap(long, short)]
        config: Option<PathBuf>,
        /// The firmware binary, starting with the header placeholder.
        #[clap(short, long)]
        input: PathBuf,
        /// Path to write the update package.
        #[clap(short, long)]
        output: PathBuf,
        /// Version number to write in the header.
        #[clap(long)]
        firmware_version: u32,
        /// Device the firmware is built for, decimal or 0x-prefixed hex.
        #[clap(long)]
        device_id: Option<String>,
    },
    /// Decrypt an update package and check its signature.
    Verify {
        /// Compressed public key in hex. Defaults to the key the bootloader
        /// is built with.
        #[clap(long)]
        pubkey: Option<String>,
        /// Path to the AES-128 key, 16 raw bytes or 32 hex digits.
        #[clap(long)]
        aes_key: Option<PathBuf>,
        /// Path to config file.
        #[clap(long, short)]
        config: Option<PathBuf>,
        /// Also require this device id in the header.
        #[clap(long)]
        device_id: Option<String>,
        /// The update package.
        #[clap(short, long)]
        input: PathBuf,
    },
    /// Dump the header contents to stdout.
    Dump {
        /// Decrypt the input as an update package with this AES-128 key.
        /// Without it, the input is read as a stored image.
        #[clap(long)]
        aes_key: Option<PathBuf>,
        /// The package or image file.
        #[clap(short, long)]
        input: PathBuf,
    },
    /// Print the compressed public key of a secret key, in hex.
    Pubkey {
        /// Path to PEM-encoded secret key.
        #[clap(long)]
        secret: PathBuf,
    },
}
