//! Payload encryption negotiated through the `X-Eamuse-Info` header.
//!
//! The header carries an opaque descriptor of the form `1-XXXXXXXX-YYYY`
//! (format version, 32-bit hex, 16-bit hex). The descriptor is salt for a
//! per-packet key; the same descriptor decrypts the request and encrypts the
//! response.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Secret used when the deployment does not configure one.
pub const DEFAULT_SECRET: &[u8] = b"eamuse-xrpc-default-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("malformed encryption descriptor '{0}'")]
    MalformedDescriptor(String),
    #[error("unsupported encryption descriptor version '{0}'")]
    UnsupportedVersion(String),
    #[error("key derivation failed")]
    KeyDerivation,
}

/// Parsed `X-Eamuse-Info` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionInfo {
    pub high: u32,
    pub low: u16,
}

impl EncryptionInfo {
    /// The descriptor as salt bytes.
    pub fn salt(&self) -> [u8; 6] {
        let mut salt = [0u8; 6];
        salt[..4].copy_from_slice(&self.high.to_be_bytes());
        salt[4..].copy_from_slice(&self.low.to_be_bytes());
        salt
    }
}

impl FromStr for EncryptionInfo {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CryptoError::MalformedDescriptor(s.to_string());
        let mut parts = s.trim().split('-');
        let (Some(version), Some(high), Some(low), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        if version != "1" {
            return Err(CryptoError::UnsupportedVersion(version.to_string()));
        }
        if high.len() != 8 || low.len() != 4 {
            return Err(malformed());
        }

        Ok(Self {
            high: u32::from_str_radix(high, 16).map_err(|_| malformed())?,
            low: u16::from_str_radix(low, 16).map_err(|_| malformed())?,
        })
    }
}

impl fmt::Display for EncryptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1-{:08x}-{:04x}", self.high, self.low)
    }
}

/// A symmetric payload transform keyed by the descriptor.
///
/// Applying it twice with the same descriptor must restore the input.
pub trait PayloadCipher: Send + Sync {
    fn apply(&self, info: &EncryptionInfo, data: &mut [u8]) -> Result<(), CryptoError>;
}

/// SHA-256 counter-mode keystream with an HKDF-derived per-packet key.
#[derive(Clone)]
pub struct KeystreamCipher {
    secret: Vec<u8>,
}

impl KeystreamCipher {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn packet_key(&self, info: &EncryptionInfo) -> Result<[u8; 32], CryptoError> {
        let salt = info.salt();
        let hk = Hkdf::<Sha256>::new(Some(&salt), &self.secret);
        let mut key = [0u8; 32];
        hk.expand(b"eamuse payload", &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;
        Ok(key)
    }
}

impl Default for KeystreamCipher {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET)
    }
}

impl fmt::Debug for KeystreamCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystreamCipher").finish_non_exhaustive()
    }
}

impl PayloadCipher for KeystreamCipher {
    fn apply(&self, info: &EncryptionInfo, data: &mut [u8]) -> Result<(), CryptoError> {
        let key = self.packet_key(info)?;
        for (counter, chunk) in data.chunks_mut(32).enumerate() {
            let block = Sha256::new()
                .chain_update(key)
                .chain_update((counter as u64).to_be_bytes())
                .finalize();
            for (byte, pad) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= pad;
            }
        }
        Ok(())
    }
}
