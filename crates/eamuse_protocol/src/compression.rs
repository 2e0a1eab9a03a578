//! Payload compression schemes selected by the `X-Compress` header token.

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use std::io::{Read, Write};
use thiserror::Error;

/// Token meaning "payload is not compressed".
pub const NO_COMPRESSION: &str = "none";

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("unsupported compression scheme '{0}'")]
    Unsupported(String),
    #[error("compression failed: {0}")]
    Compress(std::io::Error),
    #[error("decompression failed: {0}")]
    Decompress(std::io::Error),
}

/// A named, reversible payload transform.
pub trait CompressionScheme: Send + Sync {
    /// Header token this scheme answers to (lowercase).
    fn token(&self) -> &'static str;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;
}

/// Identity scheme for uncompressed payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct Uncompressed;

impl CompressionScheme for Uncompressed {
    fn token(&self) -> &'static str {
        NO_COMPRESSION
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(data.to_vec())
    }
}

/// Raw DEFLATE streams.
#[derive(Debug, Clone, Copy)]
pub struct Deflate {
    level: Compression,
}

impl Default for Deflate {
    fn default() -> Self {
        Self {
            level: Compression::fast(),
        }
    }
}

impl CompressionScheme for Deflate {
    fn token(&self) -> &'static str {
        "deflate"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut encoder = DeflateEncoder::new(Vec::new(), self.level);
        encoder.write_all(data).map_err(CompressionError::Compress)?;
        encoder.finish().map_err(CompressionError::Compress)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut decoder = DeflateDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(CompressionError::Decompress)?;
        Ok(decompressed)
    }
}

/// The set of schemes a protocol instance accepts.
pub struct CompressionRegistry {
    schemes: Vec<Box<dyn CompressionScheme>>,
}

impl CompressionRegistry {
    pub fn empty() -> Self {
        Self {
            schemes: Vec::new(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl CompressionScheme + 'static) -> Self {
        self.schemes.retain(|s| s.token() != scheme.token());
        self.schemes.push(Box::new(scheme));
        self
    }

    /// Looks up the scheme for a header token. `None` means no header was
    /// sent, which selects the identity scheme.
    pub fn get(&self, token: Option<&str>) -> Result<&dyn CompressionScheme, CompressionError> {
        let token = token.map(str::trim).unwrap_or(NO_COMPRESSION);
        self.schemes
            .iter()
            .find(|s| s.token().eq_ignore_ascii_case(token))
            .map(|s| s.as_ref())
            .ok_or_else(|| CompressionError::Unsupported(token.to_string()))
    }

    pub fn tokens(&self) -> Vec<&'static str> {
        self.schemes.iter().map(|s| s.token()).collect()
    }
}

impl Default for CompressionRegistry {
    fn default() -> Self {
        Self::empty()
            .with_scheme(Uncompressed)
            .with_scheme(Deflate::default())
    }
}
