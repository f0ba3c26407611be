//! Command and response frames of the register protocol
//!
//! ```text
//! command:  7E 00 | type | len | addr_hi addr_lo | payload[len] | crc_hi crc_lo
//! response: 02 00 | status | len | data[len] | crc_hi crc_lo
//! ```
//!
//! The checksum covers everything between the two header bytes and the checksum itself.
//! A response length byte of 0 stands for 256 bytes of data.

use tracing::trace;

use crate::{
    IGNORED_CHECKSUM, NAK,
    crc::Checksum,
    error::{Error, Result},
    registers::Register,
};

pub const COMMAND_HEADER: [u8; 2] = [0x7E, 0x00];
pub const RESPONSE_HEADER: [u8; 2] = [0x02, 0x00];

/// kind of command sent to the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    /// commit the current register values to flash
    Save,
}

impl Operation {
    pub fn type_code(self) -> u8 {
        match self {
            Operation::Read => 0x07,
            Operation::Write => 0x08,
            Operation::Save => 0x09,
        }
    }

    pub fn from_type_code(code: u8) -> Option<Self> {
        match code {
            0x07 => Some(Operation::Read),
            0x08 => Some(Operation::Write),
            0x09 => Some(Operation::Save),
            _ => None,
        }
    }
}

/// status byte of a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ack,
    Nak,
    Other(u8),
}

impl From<u8> for ResponseStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ResponseStatus::Ack,
            NAK => ResponseStatus::Nak,
            other => ResponseStatus::Other(other),
        }
    }
}

impl From<ResponseStatus> for u8 {
    fn from(value: ResponseStatus) -> Self {
        match value {
            ResponseStatus::Ack => 0x00,
            ResponseStatus::Nak => NAK,
            ResponseStatus::Other(other) => other,
        }
    }
}

/// why a byte sequence could not be turned into a frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// more bytes are needed, the frame may still be completed
    #[error("incomplete frame, got {available} of {needed} bytes")]
    Incomplete { needed: usize, available: usize },

    #[error("invalid header {0:02X?}")]
    BadHeader([u8; 2]),

    #[error("unknown command type {0:02X}")]
    UnknownOperation(u8),

    #[error("checksums don't match, expected {expected:04X} received {received:04X}")]
    ChecksumMismatch { expected: u16, received: u16 },
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        match value {
            DecodeError::ChecksumMismatch { expected, received } => {
                Error::Checksum { expected, received }
            }
            other => Error::Malformed(other.to_string()),
        }
    }
}

/// one outbound instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub operation: Operation,
    pub address: Register,
    pub payload: Vec<u8>,
}

/// one parsed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub status: ResponseStatus,
    pub payload: Vec<u8>,
    pub checksum: u16,
}

/// encodes and decodes frames with the constants of one module variant
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    checksum: Checksum,
    max_payload: usize,
    min_response_len: usize,
    accept_unchecked: bool,
}

impl FrameCodec {
    pub fn new(checksum: Checksum, max_payload: usize, min_response_len: usize) -> Self {
        FrameCodec {
            checksum,
            max_payload,
            min_response_len,
            accept_unchecked: false,
        }
    }

    pub fn min_response_len(&self) -> usize {
        self.min_response_len
    }

    /// accept replies carrying the "checksum not calculated" marker without verification
    pub fn accept_unchecked(mut self, accept: bool) -> Self {
        self.accept_unchecked = accept;
        self
    }

    /// build a command packet
    ///
    /// # Arguments
    ///
    /// * `address` - the register to operate on
    /// * `operation` - read, write or save
    /// * `payload` - the data to write, or the number of bytes to read for a read
    pub fn encode(
        &self,
        address: Register,
        operation: Operation,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        if payload.len() > self.max_payload {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }
        let mut buffer: Vec<u8> = Vec::with_capacity(payload.len() + 8);
        buffer.extend_from_slice(&COMMAND_HEADER);
        buffer.push(operation.type_code());
        // bounded by max_payload above
        buffer.push(payload.len() as u8);
        buffer.extend_from_slice(&address.0.to_be_bytes());
        buffer.extend_from_slice(payload);
        let checksum = self.checksum.calculate(&buffer[2..]);
        buffer.extend_from_slice(&checksum.to_be_bytes());
        Ok(buffer)
    }

    /// parse a command packet, as the scanner would
    pub fn decode_command(&self, raw: &[u8]) -> std::result::Result<CommandFrame, DecodeError> {
        // header + type + length + address + checksum
        let min_len = 8;
        if raw.len() < min_len {
            return Err(DecodeError::Incomplete {
                needed: min_len,
                available: raw.len(),
            });
        }
        if raw[..2] != COMMAND_HEADER {
            return Err(DecodeError::BadHeader([raw[0], raw[1]]));
        }
        let total_len = min_len + raw[3] as usize;
        if raw.len() < total_len {
            return Err(DecodeError::Incomplete {
                needed: total_len,
                available: raw.len(),
            });
        }
        self.check(&raw[2..total_len - 2], &raw[total_len - 2..total_len])?;
        let operation =
            Operation::from_type_code(raw[2]).ok_or(DecodeError::UnknownOperation(raw[2]))?;
        Ok(CommandFrame {
            operation,
            address: Register(u16::from_be_bytes([raw[4], raw[5]])),
            payload: raw[6..total_len - 2].to_vec(),
        })
    }

    /// parse a reply packet
    ///
    /// only the first frame of `raw` is decoded, trailing bytes are ignored
    pub fn decode(&self, raw: &[u8]) -> std::result::Result<ResponseFrame, DecodeError> {
        if raw.len() >= 2 && raw[..2] != RESPONSE_HEADER {
            return Err(DecodeError::BadHeader([raw[0], raw[1]]));
        }
        if raw.len() < self.min_response_len {
            return Err(DecodeError::Incomplete {
                needed: self.min_response_len,
                available: raw.len(),
            });
        }
        let mut data_length = raw[3] as usize;
        // special case, the barcode scanner returns a length of 0 when 256 bytes have been returned
        if data_length == 0 {
            data_length = 256;
        }
        let total_len = self.min_response_len + data_length;
        if raw.len() < total_len {
            return Err(DecodeError::Incomplete {
                needed: total_len,
                available: raw.len(),
            });
        }
        let checksum = self.check(&raw[2..total_len - 2], &raw[total_len - 2..total_len])?;
        trace!("decoded response frame of {} bytes", total_len);
        Ok(ResponseFrame {
            status: ResponseStatus::from(raw[2]),
            payload: raw[4..4 + data_length].to_vec(),
            checksum,
        })
    }

    /// build a reply packet, as the scanner would
    pub fn encode_response(&self, status: ResponseStatus, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument(String::from(
                "a response carries at least one byte of data",
            )));
        }
        if payload.len() > 256 {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: 256,
            });
        }
        let mut buffer: Vec<u8> = Vec::with_capacity(payload.len() + self.min_response_len);
        buffer.extend_from_slice(&RESPONSE_HEADER);
        buffer.push(status.into());
        // 256 wraps to 0
        buffer.push(payload.len() as u8);
        buffer.extend_from_slice(payload);
        let checksum = self.checksum.calculate(&buffer[2..]);
        buffer.extend_from_slice(&checksum.to_be_bytes());
        Ok(buffer)
    }

    fn check(&self, body: &[u8], checksum: &[u8]) -> std::result::Result<u16, DecodeError> {
        let received = u16::from_be_bytes([checksum[0], checksum[1]]);
        if self.accept_unchecked && received == IGNORED_CHECKSUM {
            return Ok(received);
        }
        self.checksum
            .verify(body, received)
            .map_err(|expected| DecodeError::ChecksumMismatch { expected, received })?;
        Ok(received)
    }
}
