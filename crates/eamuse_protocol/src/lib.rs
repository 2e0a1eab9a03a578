//! # e-Amuse protocol codec
//!
//! Converts between the bytes a cabinet POSTs and the in-memory [`Node`]
//! tree the dispatch layer works with.
//!
//! ## Pipeline
//!
//! Decoding runs `decrypt -> decompress -> parse`, encoding the reverse. The
//! compression scheme is chosen by the `X-Compress` header token and the
//! cipher is keyed by the `X-Eamuse-Info` descriptor; an absent header means
//! plaintext for that stage.
//!
//! Decoding never fails loudly. Anything that cannot be turned into a tree
//! (bad framing, unknown compression, bad descriptor, spam probes) yields
//! `None`, and the transport layer answers with a client error.
//!
//! ## Example
//!
//! ```rust
//! use eamuse_protocol::{EamuseProtocol, Node};
//!
//! let proto = EamuseProtocol::default();
//! let mut call = Node::void("call");
//! call.set_attribute("model", "ABC:J:A:A:2020010100");
//! let bytes = proto.encode(None, None, &call).unwrap();
//! assert_eq!(proto.decode(None, None, &bytes), Some(call));
//! ```

pub mod compression;
pub mod crypto;
pub mod node;
pub mod wire;

pub use compression::{CompressionError, CompressionRegistry, CompressionScheme, Deflate, Uncompressed};
pub use crypto::{CryptoError, EncryptionInfo, KeystreamCipher, PayloadCipher};
pub use node::{Node, Value};
pub use wire::WireError;

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Root tag names of probes from bots that mistake this endpoint for a
/// SOAP or XML-RPC service.
pub const SPAM_ENVELOPES: [&str; 3] = ["soapenv:Envelope", "soap:Envelope", "methodCall"];

/// Errors from the encode path.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Compression(#[from] CompressionError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Codec facade combining the wire format, compression and encryption.
#[derive(Clone)]
pub struct EamuseProtocol {
    compression: Arc<CompressionRegistry>,
    cipher: Arc<dyn PayloadCipher>,
}

impl EamuseProtocol {
    pub fn new(compression: CompressionRegistry, cipher: impl PayloadCipher + 'static) -> Self {
        Self {
            compression: Arc::new(compression),
            cipher: Arc::new(cipher),
        }
    }

    /// Decodes a request body, returning `None` when nothing usable came in.
    pub fn decode(
        &self,
        compression: Option<&str>,
        encryption: Option<&str>,
        data: &[u8],
    ) -> Option<Node> {
        match self.try_decode(compression, encryption, data) {
            Ok(tree) => Some(tree),
            Err(reason) => {
                debug!("Dropping undecodable packet ({} bytes): {}", data.len(), reason);
                None
            }
        }
    }

    fn try_decode(
        &self,
        compression: Option<&str>,
        encryption: Option<&str>,
        data: &[u8],
    ) -> Result<Node, DecodeFailure> {
        if let Some(root) = sniff_xml_root(data) {
            return Err(if SPAM_ENVELOPES.contains(&root) {
                DecodeFailure::Spam(root.to_string())
            } else {
                DecodeFailure::Text
            });
        }

        let mut payload = data.to_vec();
        if let Some(descriptor) = encryption {
            let info: EncryptionInfo = descriptor.parse()?;
            self.cipher.apply(&info, &mut payload)?;
        }

        let scheme = self.compression.get(compression)?;
        let raw = scheme.decompress(&payload)?;
        let tree = wire::from_bytes(&raw)?;

        if SPAM_ENVELOPES.contains(&tree.name()) {
            return Err(DecodeFailure::Spam(tree.name().to_string()));
        }
        Ok(tree)
    }

    /// Encodes a response tree with the given compression and encryption.
    pub fn encode(
        &self,
        compression: Option<&str>,
        encryption: Option<&str>,
        tree: &Node,
    ) -> Result<Vec<u8>, ProtocolError> {
        let raw = wire::to_bytes(tree)?;
        let mut payload = self.compression.get(compression)?.compress(&raw)?;
        if let Some(descriptor) = encryption {
            let info: EncryptionInfo = descriptor.parse()?;
            self.cipher.apply(&info, &mut payload)?;
        }
        Ok(payload)
    }
}

impl Default for EamuseProtocol {
    fn default() -> Self {
        Self::new(CompressionRegistry::default(), KeystreamCipher::default())
    }
}

impl std::fmt::Debug for EamuseProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EamuseProtocol")
            .field("compression", &self.compression.tokens())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
enum DecodeFailure {
    #[error("spam probe with root <{0}>")]
    Spam(String),
    #[error("textual payload")]
    Text,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Compression(#[from] CompressionError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Name of the first element of an XML-looking payload, if it is one.
fn sniff_xml_root(data: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(data.get(..data.len().min(512))?).ok()?;
    let mut rest = text.trim_start();
    if !rest.starts_with('<') {
        return None;
    }

    // Skip the prolog and comments.
    while let Some(after) = rest.strip_prefix("<?").or_else(|| rest.strip_prefix("<!")) {
        let end = after.find('>')?;
        rest = after[end + 1..].trim_start();
    }

    let body = rest.strip_prefix('<')?;
    let end = body
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(body.len());
    Some(&body[..end])
}
