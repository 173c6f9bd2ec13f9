use {
    bootloader_core::FirmwareHeader,
    colored::Colorize,
    package::Image,
    std::{ffi::OsString, io::Write},
};

mod args;
mod package;

#[cfg(test)]
mod tests;

fn main() -> std::process::ExitCode {
    main_args(std::env::args_os(), &mut std::io::stdout(), &mut std::io::stderr()).into()
}

fn main_args<I, T>(args: I, stdout: impl Write, mut stderr: impl Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match run(args, stdout) {
        Ok(()) => ExitCode(0),
        Err(Error::Args(e @ args::Error::Cli(_))) => {
            // Clap already does the "error: {}" formatting.
            let _ = writeln!(stderr, "{e}");
            ExitCode(1)
        }
        Err(e) => {
            let _ = writeln!(stderr, "{} {e}", "error:".bold().red());
            ExitCode(1)
        }
    }
}

fn run<I, T>(args: I, mut stdout: impl Write) -> Result<(), Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match args::args(args)? {
        args::Args::Sign {
            pubkey: expected_pubkey,
            secret,
            aes_key,
            input,
            output,
            version,
            device_id,
        } => {
            // Check that user is not accidentally signing with the wrong key.
            let pubkey = secret.public_key(&secp256k1::Secp256k1::new());
            if let Some(expected_pubkey) = expected_pubkey {
                if pubkey != expected_pubkey {
                    return Err(Error::KeyMismatch);
                }
            }

            let input_buf = std::fs::read(&input).map_err(Error::ReadInputFile)?;
            // The application is linked behind a placeholder for the header.
            if input_buf.len() <= FirmwareHeader::SIZE {
                return Err(Error::InputTooShort(input_buf.len()));
            }
            let firmware = &input_buf[FirmwareHeader::SIZE..];

            let image = Image::sign(firmware, version, device_id, &secret, rand::random())?;
            let package = image.seal(&aes_key);
            std::fs::write(&output, &package).map_err(Error::WriteOutputFile)?;

            // Sanity check that what was written opens and verifies.
            let written = std::fs::read(&output).map_err(Error::ReadOutputFile)?;
            let opened = Image::open(&written, &aes_key).map_err(Error::CheckOutputFile)?;
            opened.verify(&pubkey).map_err(Error::CheckOutputFile)?;

            writeln!(
                &mut stdout,
                "{} {} of firmware, package is {} bytes",
                "signed".bold(),
                humansize::format_size(firmware.len(), humansize::BINARY),
                package.len(),
            )
            .map_err(Error::Stdout)?;
        }
        args::Args::Verify {
            pubkey,
            aes_key,
            device_id,
            input,
        } => {
            let package = std::fs::read(&input).map_err(Error::ReadInputFile)?;
            let image = Image::open(&package, &aes_key)?;
            print_header(&mut stdout, &image)?;
            if let Some(device_id) = device_id {
                if image.header.device_id != device_id {
                    return Err(Error::DeviceMismatch {
                        header: image.header.device_id,
                        expected: device_id,
                    });
                }
            }
            image.verify(&pubkey)?;
            writeln!(&mut stdout, "{}", "signature valid".bold().green()).map_err(Error::Stdout)?;
        }
        args::Args::Dump { aes_key, input } => {
            let input_buf = std::fs::read(&input).map_err(Error::ReadInputFile)?;
            let image = match aes_key {
                Some(aes_key) => Image::open(&input_buf, &aes_key)?,
                None => Image::parse(&input_buf)?,
            };
            print_header(&mut stdout, &image)?;
        }
        args::Args::Pubkey { secret } => {
            let pubkey = secret.public_key(&secp256k1::Secp256k1::new());
            writeln!(&mut stdout, "{}", hex::encode(pubkey.serialize())).map_err(Error::Stdout)?;
        }
    }
    Ok(())
}

fn print_header(mut stdout: impl Write, image: &Image) -> Result<(), Error> {
    let header = &image.header;
    let rows = [
        ("version", header.version.to_string()),
        ("device id", format!("{:#04x}", header.device_id)),
        (
            "size",
            format!(
                "{} ({})",
                humansize::format_size(header.length, humansize::BINARY),
                header.length
            ),
        ),
        ("iv", hex::encode(header.iv)),
        ("sha256", hex::encode(image.digest())),
        ("signature", hex::encode(&header.signature[..32])),
        ("", hex::encode(&header.signature[32..])),
    ];
    for (label, value) in rows {
        writeln!(&mut stdout, "{:10} {value}", label.bold()).map_err(Error::Stdout)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExitCode(u8);

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        code.0.into()
    }
}

#[derive(Debug)]
enum Error {
    Args(args::Error),
    CheckOutputFile(package::Error),
    DeviceMismatch { header: u32, expected: u32 },
    InputTooShort(usize),
    KeyMismatch,
    Package(package::Error),
    ReadInputFile(std::io::Error),
    ReadOutputFile(std::io::Error),
    Stdout(std::io::Error),
    WriteOutputFile(std::io::Error),
}

impl From<args::Error> for Error {
    fn from(e: args::Error) -> Self {
        Error::Args(e)
    }
}

impl From<package::Error> for Error {
    fn from(e: package::Error) -> Self {
        Error::Package(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Args(e) => write!(f, "{e}"),
            Error::CheckOutputFile(e) => write!(
                f,
                "output file does not verify after writing: {e}; is another process using it?"
            ),
            Error::DeviceMismatch { header, expected } => {
                write!(f, "image is built for device {header:#04x}, expected {expected:#04x}")
            }
            Error::InputTooShort(len) => write!(
                f,
                "input of {len} bytes holds no firmware behind the {} byte header placeholder",
                FirmwareHeader::SIZE
            ),
            Error::KeyMismatch => write!(f, "public key does not match secret key"),
            Error::Package(e) => write!(f, "{e}"),
            Error::ReadInputFile(e) => write!(f, "failed to read input file: {e}"),
            Error::ReadOutputFile(e) => write!(f, "failed to read output file: {e}"),
            Error::Stdout(e) => write!(f, "failed to write to stdout: {e}"),
            Error::WriteOutputFile(e) => write!(f, "failed to write to output file: {e}"),
        }
    }
}

impl std::error::Error for Error {}
