//! Error types for the DNS responders.
//!
//! This module defines the error types used throughout the crate.

use std::net::SocketAddr;
use thiserror::Error;

/// Represents errors that can occur in the DNS responders.
#[derive(Error, Debug)]
pub enum DnsError {
    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A datagram could not be decoded.
    #[error("Invalid DNS packet: {0}")]
    Decode(#[from] DecodeError),

    /// A well-formed message that is not acceptable in context.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IP address parsing errors.
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// The upstream server did not answer in time.
    #[error("Upstream {0} timed out")]
    Timeout(SocketAddr),
}

/// Wire-format failures raised while decoding a DNS message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message truncated")]
    Truncated,

    #[error("label length {len} at offset {offset} overruns the message")]
    LabelOverrun { offset: usize, len: usize },

    #[error("name exceeds 255 octets")]
    NameTooLong,

    #[error("name has more than 127 labels")]
    TooManyLabels,

    /// Compression is not accepted in the question of an inbound query.
    #[error("compression pointer in question name")]
    CompressionPointer,

    #[error("bad compression pointer to offset {0}")]
    BadPointer(usize),

    #[error("reserved label type 0x{0:02x}")]
    ReservedLabelType(u8),

    #[error("message carries no question")]
    NoQuestion,
}
