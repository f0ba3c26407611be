//! Register transactions: one command, one validated reply

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::{
    error::{Error, Result},
    frame::{DecodeError, FrameCodec, Operation, ResponseFrame, ResponseStatus},
    registers::Register,
    transport::Transport,
};

/// issues register commands and waits for their replies
///
/// Exactly one command is in flight at a time. Input left over from an earlier, timed out
/// command is discarded before every write, so a late reply is never taken for the answer to
/// a newer command.
pub struct RegisterEngine<T: Transport> {
    transport: T,
    codec: FrameCodec,
    retries: u32,
}

impl<T: Transport> RegisterEngine<T> {
    pub fn new(transport: T, codec: FrameCodec, retries: u32) -> Self {
        RegisterEngine {
            transport,
            codec,
            retries,
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// send a command and return the validated reply
    ///
    /// # Arguments
    ///
    /// * `address` - the register to operate on
    /// * `operation` - read, write or save
    /// * `payload` - data to write, or the number of bytes to read
    /// * `timeout` - how long to wait for the reply to each attempt
    ///
    /// Timeouts and corrupted replies are retried by re-sending the whole command, up to the
    /// configured retry count. A rejection by the scanner is returned immediately.
    pub fn transact(
        &mut self,
        address: Register,
        operation: Operation,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<ResponseFrame> {
        let command = self.codec.encode(address, operation, payload)?;
        let expected_len = expected_reply_len(operation, payload);
        let mut attempt: u32 = 0;
        loop {
            match self.attempt(&command, address, expected_len, timeout) {
                Ok(frame) => return Ok(frame),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "register {} {:?} failed ({}), retry {} of {}",
                        address, operation, err, attempt, self.retries
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// one write-read cycle
    fn attempt(
        &mut self,
        command: &[u8],
        address: Register,
        expected_len: usize,
        timeout: Duration,
    ) -> Result<ResponseFrame> {
        self.transport.discard_input()?;
        self.transport.write(command)?;
        let deadline = Instant::now() + timeout;
        // never read past the end of the reply, scan data may follow right behind it
        let mut wanted = self.codec.min_response_len();
        let mut buffer: Vec<u8> = Vec::with_capacity(expected_len + wanted);
        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!(
                    "timeout waiting for reply, {} bytes received: {:02X?}",
                    buffer.len(),
                    buffer
                );
                return Err(Error::Timeout(timeout));
            }
            let chunk = self.transport.read(wanted - buffer.len(), deadline - now)?;
            if chunk.is_empty() {
                continue;
            }
            buffer.extend_from_slice(&chunk);
            match self.codec.decode(&buffer) {
                Ok(frame) => {
                    debug!("READ FROM SERIAL {} bytes: {:02X?}", buffer.len(), buffer);
                    return classify(frame, address, expected_len);
                }
                Err(DecodeError::Incomplete { needed, available }) => {
                    trace!("waiting for more data, {} of {} bytes", available, needed);
                    wanted = needed;
                }
                Err(err) => {
                    debug!("invalid reply {:02X?}: {}", buffer, err);
                    return Err(err.into());
                }
            }
        }
    }
}

/// number of data bytes the reply to a command must carry
fn expected_reply_len(operation: Operation, payload: &[u8]) -> usize {
    match operation {
        Operation::Read => match payload.first() {
            // the barcode scanner expects a length of 0 when 256 bytes should be returned
            Some(0) => 256,
            Some(&count) => count as usize,
            None => 1,
        },
        Operation::Write | Operation::Save => 1,
    }
}

fn classify(frame: ResponseFrame, address: Register, expected_len: usize) -> Result<ResponseFrame> {
    if frame.status != ResponseStatus::Ack {
        return Err(Error::Nak {
            address: address.0,
            status: frame.status.into(),
        });
    }
    if frame.payload.len() != expected_len {
        return Err(Error::Malformed(format!(
            "incorrect number of bytes read from device, expected {} received {}",
            expected_len,
            frame.payload.len()
        )));
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Behaviour, SimulatedScanner};

    const TIMEOUT: Duration = Duration::from_millis(20);

    fn engine(device: SimulatedScanner, retries: u32) -> RegisterEngine<SimulatedScanner> {
        let codec = device.codec();
        RegisterEngine::new(device, codec, retries)
    }

    #[test]
    fn test_write_and_read_back() -> anyhow::Result<()> {
        let mut engine = engine(SimulatedScanner::new(), 2);
        let reply = engine.transact(Register(0x003F), Operation::Write, &[0x01], TIMEOUT)?;
        assert_eq!(reply.payload, vec![0x00]);
        let reply = engine.transact(Register(0x003F), Operation::Read, &[0x01], TIMEOUT)?;
        assert_eq!(reply.payload, vec![0x01]);
        assert_eq!(engine.transport_mut().writes().len(), 2);
        Ok(())
    }

    #[test]
    fn test_timeout_after_retries_plus_one_writes() {
        let mut device = SimulatedScanner::new();
        device.set_behaviour(Behaviour::Silent);
        let mut engine = engine(device, 2);
        let result = engine.transact(Register::MODE, Operation::Read, &[0x01], TIMEOUT);
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(engine.transport_mut().writes().len(), 3);
    }

    #[test]
    fn test_checksum_error_after_retries() {
        let mut device = SimulatedScanner::new();
        device.set_behaviour(Behaviour::CorruptChecksum(usize::MAX));
        let mut engine = engine(device, 1);
        let result = engine.transact(Register::MODE, Operation::Read, &[0x01], TIMEOUT);
        assert!(matches!(result, Err(Error::Checksum { .. })));
        assert_eq!(engine.transport_mut().writes().len(), 2);
    }

    #[test]
    fn test_recovers_from_corrupted_reply() -> anyhow::Result<()> {
        let mut device = SimulatedScanner::new();
        device.set_behaviour(Behaviour::CorruptChecksum(1));
        let mut engine = engine(device, 2);
        engine.transact(Register::MODE, Operation::Write, &[0x81], TIMEOUT)?;
        // one corrupted reply, one good one
        assert_eq!(engine.transport_mut().writes().len(), 2);
        assert_eq!(engine.transport_mut().register(Register::MODE), Some(0x81));
        Ok(())
    }

    #[test]
    fn test_reply_split_across_reads() -> anyhow::Result<()> {
        let mut device = SimulatedScanner::new();
        device.set_behaviour(Behaviour::Trickle);
        let mut engine = engine(device, 0);
        let reply = engine.transact(Register::SW_YEAR, Operation::Read, &[0x03], TIMEOUT)?;
        assert_eq!(reply.payload.len(), 3);
        Ok(())
    }

    #[test]
    fn test_nak_is_not_retried() {
        let mut device = SimulatedScanner::new();
        device.set_behaviour(Behaviour::Reject);
        let mut engine = engine(device, 2);
        let result = engine.transact(Register::MODE, Operation::Write, &[0x00], TIMEOUT);
        assert!(matches!(
            result,
            Err(Error::Nak {
                address: 0x0000,
                status: 0x15
            })
        ));
        assert_eq!(engine.transport_mut().writes().len(), 1);
    }

    #[test]
    fn test_stale_reply_is_discarded() -> anyhow::Result<()> {
        let mut device = SimulatedScanner::new();
        // a late reply to an earlier command is still sitting in the input buffer
        device.push_unsolicited(&[0x02, 0x00, 0x00, 0x01, 0x07, 0x00, 0x00]);
        let mut engine = engine(device, 0);
        let reply = engine.transact(Register::MODE, Operation::Read, &[0x01], TIMEOUT)?;
        // the factory default mode, not the 0x07 of the stale reply
        assert_eq!(reply.payload, vec![0b0101_0100]);
        Ok(())
    }

    #[test]
    fn test_wrong_reply_length_is_malformed() {
        let mut device = SimulatedScanner::new();
        device.set_behaviour(Behaviour::ShortReply);
        let mut engine = engine(device, 0);
        let result = engine.transact(Register::SW_YEAR, Operation::Read, &[0x03], TIMEOUT);
        assert!(matches!(result, Err(Error::Malformed(_))));
    }
}
