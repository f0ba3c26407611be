//! Error types for the scanner driver

use std::time::Duration;

use crate::{
    interface::SessionState,
    registers::{FormatCode, ModuleVariant},
};

/// Result type alias for scanner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the register protocol engine and the scanner session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// the serial device could not be opened or an I/O operation failed
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// no valid response frame arrived in time (after all retries)
    #[error("no valid response from the scanner within {0:?}")]
    Timeout(Duration),

    /// the last response frame failed checksum validation (after all retries)
    #[error("checksums don't match, expected {expected:04X} received {received:04X}")]
    Checksum { expected: u16, received: u16 },

    /// the last response frame had a wrong header or shape (after all retries)
    #[error("malformed response frame: {0}")]
    Malformed(String),

    /// the scanner explicitly rejected a register operation
    #[error("barcode scanner rejected the operation on register {address:04X}, rc: {status:02X}")]
    Nak { address: u16, status: u8 },

    /// the operation is not allowed in the current session state
    #[error("{operation} is not allowed while the session is {actual:?}")]
    InvalidState {
        operation: &'static str,
        actual: SessionState,
    },

    /// the register is not documented for the selected module
    #[error("register {address:04X} is not documented for {variant}")]
    UndocumentedRegister { address: u16, variant: ModuleVariant },

    /// the register can be read, but not written
    #[error("register {0:04X} is read-only")]
    ReadOnlyRegister(u16),

    /// command payload exceeds what a single frame can carry
    #[error("payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge { size: usize, max: usize },

    /// the selected module has no register for this barcode format
    #[error("format {code} is not supported by {variant}")]
    UnsupportedFormat {
        code: FormatCode,
        variant: ModuleVariant,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// errors a repeated write-read cycle might recover from
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Checksum { .. } | Self::Malformed(_)
        )
    }

    /// errors after which the transport can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
