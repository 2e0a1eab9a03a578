//! Error types for the request pipeline.

use eamuse_data::DataError;
use eamuse_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The persistence layer failed outside any game handler.
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// A response tree could not be encoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
