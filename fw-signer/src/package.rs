//! The update package: `IV || AES-128-CBC(header without IV || firmware)`,
//! PKCS#7 padded. The device writes the IV and the decrypted stream to the
//! application region unchanged, so the IV completes the stored header.

use {
    aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit},
    bootloader_core::FirmwareHeader,
    sha2::Digest,
};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const BLOCK_SIZE: usize = 16;

/// Header fields behind the IV, the part that travels encrypted.
const SEALED_HEADER_SIZE: usize = FirmwareHeader::SIZE - FirmwareHeader::IV_SIZE;

/// A header and the firmware it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub header: FirmwareHeader,
    pub firmware: Vec<u8>,
}

impl Image {
    /// Sign `firmware` for `device_id`.
    pub fn sign(
        firmware: &[u8],
        version: u32,
        device_id: u32,
        secret: &secp256k1::SecretKey,
        iv: [u8; 16],
    ) -> Result<Self, Error> {
        let length = u32::try_from(firmware.len()).map_err(|_| Error::FirmwareTooLarge(firmware.len()))?;
        let digest: [u8; 32] = sha2::Sha256::digest(firmware).into();
        let signature = secp256k1::Secp256k1::new()
            .sign_ecdsa(&secp256k1::Message::from_digest(digest), secret)
            .serialize_compact();
        Ok(Self {
            header: FirmwareHeader {
                iv,
                version,
                device_id,
                length,
                signature,
            },
            firmware: firmware.to_vec(),
        })
    }

    /// Encrypt into an update package under the IV in the header.
    pub fn seal(&self, aes_key: &[u8; 16]) -> Vec<u8> {
        let header = self.header.to_bytes();
        let mut plain = Vec::with_capacity(SEALED_HEADER_SIZE + self.firmware.len());
        plain.extend_from_slice(&header[FirmwareHeader::IV_SIZE..]);
        plain.extend_from_slice(&self.firmware);

        let cipher = Aes128CbcEnc::new(aes_key.into(), &self.header.iv.into());
        let mut package = self.header.iv.to_vec();
        package.extend(cipher.encrypt_padded_vec_mut::<Pkcs7>(&plain));
        package
    }

    /// Decrypt an update package.
    pub fn open(package: &[u8], aes_key: &[u8; 16]) -> Result<Self, Error> {
        if package.len() < 2 * BLOCK_SIZE || package.len() % BLOCK_SIZE != 0 {
            return Err(Error::NotAPackage(package.len()));
        }
        let (iv, ciphertext) = package.split_at(FirmwareHeader::IV_SIZE);
        let mut iv_block = [0; 16];
        iv_block.copy_from_slice(iv);

        let plain = Aes128CbcDec::new(aes_key.into(), &iv_block.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::Decrypt)?;
        if plain.len() < SEALED_HEADER_SIZE {
            return Err(Error::Truncated);
        }

        let mut stored = iv.to_vec();
        stored.extend_from_slice(&plain);
        let image = Self::parse(&stored)?;
        if image.firmware.len() != plain.len() - SEALED_HEADER_SIZE {
            return Err(Error::LengthMismatch {
                header: image.header.length,
                actual: plain.len() - SEALED_HEADER_SIZE,
            });
        }
        Ok(image)
    }

    /// Read an image as stored in the application region. Anything past the
    /// length in the header is ignored.
    pub fn parse(stored: &[u8]) -> Result<Self, Error> {
        let raw: &[u8; FirmwareHeader::SIZE] = stored
            .get(..FirmwareHeader::SIZE)
            .and_then(|raw| raw.try_into().ok())
            .ok_or(Error::Truncated)?;
        let header = FirmwareHeader::parse(raw);
        let firmware = stored
            .get(FirmwareHeader::SIZE..FirmwareHeader::SIZE + header.length as usize)
            .ok_or(Error::Truncated)?;
        Ok(Self {
            header,
            firmware: firmware.to_vec(),
        })
    }

    pub fn digest(&self) -> [u8; 32] {
        sha2::Sha256::digest(&self.firmware).into()
    }

    /// Check the header signature the way the bootloader does.
    pub fn verify(&self, pubkey: &secp256k1::PublicKey) -> Result<(), Error> {
        let signature =
            secp256k1::ecdsa::Signature::from_compact(&self.header.signature).map_err(|_| Error::InvalidSignature)?;
        secp256k1::Secp256k1::verification_only()
            .verify_ecdsa(&secp256k1::Message::from_digest(self.digest()), &signature, pubkey)
            .map_err(|_| Error::InvalidSignature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Decrypt,
    FirmwareTooLarge(usize),
    InvalidSignature,
    LengthMismatch { header: u32, actual: usize },
    NotAPackage(usize),
    Truncated,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Decrypt => write!(f, "decryption failed, wrong AES key?"),
            Error::FirmwareTooLarge(len) => write!(f, "firmware of {len} bytes does not fit the header"),
            Error::InvalidSignature => write!(f, "signature invalid"),
            Error::LengthMismatch { header, actual } => {
                write!(f, "header announces {header} bytes of firmware, package holds {actual}")
            }
            Error::NotAPackage(len) => {
                write!(f, "{len} bytes is not an IV followed by whole cipher blocks")
            }
            Error::Truncated => write!(f, "image is shorter than its header says"),
        }
    }
}

impl std::error::Error for Error {}
