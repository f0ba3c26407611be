//! A scanner simulated in memory, answering register commands like a GM65

use std::{
    collections::{HashMap, VecDeque},
    io,
    time::Duration,
};

use crate::{
    error::{Error, Result},
    frame::{FrameCodec, Operation, ResponseStatus},
    registers::{ModuleVariant, Register},
    transport::Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Normal,
    /// swallow commands without replying
    Silent,
    /// corrupt the checksum of the next n replies
    CorruptChecksum(usize),
    /// hand out replies one byte per read
    Trickle,
    /// reject every command with NAK
    Reject,
    /// reply to reads with one byte less than requested
    ShortReply,
    /// the cable was pulled, every I/O call fails
    Unplugged,
}

pub struct SimulatedScanner {
    codec: FrameCodec,
    behaviour: Behaviour,
    registers: HashMap<u16, u8>,
    flash: Option<HashMap<u16, u8>>,
    writes: Vec<Vec<u8>>,
    input: VecDeque<u8>,
    scans: VecDeque<Vec<u8>>,
    closed: bool,
}

fn factory_registers() -> HashMap<u16, u8> {
    HashMap::from([
        (0x0000, 0b0101_0100),
        (0x0006, 0x32),
        (0x002C, 0b0000_0100),
        (0x003F, 0x01),
        (0x0054, 0x01),
        (0x0060, 0b0000_0001),
        (0x00E1, 0x6E),
        (0x00E2, 0x78),
        (0x00E3, 23),
        (0x00E4, 5),
        (0x00E5, 12),
    ])
}

impl SimulatedScanner {
    pub fn new() -> Self {
        let profile = ModuleVariant::Gm65.profile();
        SimulatedScanner {
            codec: FrameCodec::new(profile.checksum, profile.max_payload, profile.min_response_len),
            behaviour: Behaviour::Normal,
            registers: factory_registers(),
            flash: None,
            writes: Vec::new(),
            input: VecDeque::new(),
            scans: VecDeque::new(),
            closed: false,
        }
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    pub fn set_behaviour(&mut self, behaviour: Behaviour) {
        self.behaviour = behaviour;
    }

    /// every write the host performed, in order
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn register(&self, address: Register) -> Option<u8> {
        self.registers.get(&address.0).copied()
    }

    pub fn set_register(&mut self, address: Register, value: u8) {
        self.registers.insert(address.0, value);
    }

    /// register values committed to flash, if a save happened
    pub fn flash(&self) -> Option<&HashMap<u16, u8>> {
        self.flash.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// bytes sent after the next scan trigger has been acknowledged
    pub fn queue_scan(&mut self, data: &[u8]) {
        self.scans.push_back(data.to_vec());
    }

    /// bytes already waiting in the input buffer
    pub fn push_unsolicited(&mut self, data: &[u8]) {
        self.input.extend(data);
    }

    fn check_connected(&self) -> Result<()> {
        if self.behaviour == Behaviour::Unplugged {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            )));
        }
        Ok(())
    }

    fn reply(&mut self, status: ResponseStatus, payload: &[u8]) -> Result<()> {
        let mut frame = self.codec.encode_response(status, payload)?;
        if let Behaviour::CorruptChecksum(remaining) = self.behaviour {
            if remaining > 0 {
                let last = frame.len() - 1;
                frame[last] ^= 0xFF;
                self.behaviour = Behaviour::CorruptChecksum(remaining - 1);
            }
        }
        self.input.extend(frame);
        Ok(())
    }
}

impl Transport for SimulatedScanner {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.check_connected()?;
        self.writes.push(data.to_vec());
        if self.behaviour == Behaviour::Silent {
            return Ok(());
        }
        let command = self.codec.decode_command(data)?;
        if self.behaviour == Behaviour::Reject {
            return self.reply(ResponseStatus::Nak, &[0x00]);
        }
        match command.operation {
            Operation::Read => {
                let count = match command.payload.first() {
                    Some(0) | None => 256,
                    Some(&count) => count as usize,
                };
                let mut data: Vec<u8> = (0..count)
                    .map(|offset| {
                        let address = command.address.0.wrapping_add(offset as u16);
                        self.registers.get(&address).copied().unwrap_or(0x00)
                    })
                    .collect();
                if self.behaviour == Behaviour::ShortReply && data.len() > 1 {
                    data.pop();
                }
                self.reply(ResponseStatus::Ack, &data)
            }
            Operation::Write => {
                for (offset, value) in command.payload.iter().enumerate() {
                    let address = command.address.0.wrapping_add(offset as u16);
                    self.registers.insert(address, *value);
                }
                if command.address == Register::FACTORY_RESET && command.payload == [0x50] {
                    self.registers = factory_registers();
                }
                if command.address == Register::SCAN_AREA_AND_BARCODES {
                    // the firmware switches every format register along with the global setting
                    let allowed = command.payload.first().map(|value| value & 0b0000_0110);
                    for (_, slot) in ModuleVariant::Gm65.profile().formats {
                        let value = self.registers.entry(slot.register.0).or_insert(0x00);
                        match allowed {
                            Some(0b0000_0000) => *value &= !slot.mask(),
                            Some(0b0000_0010) => *value |= slot.mask(),
                            _ => {}
                        }
                    }
                }
                self.reply(ResponseStatus::Ack, &[0x00])?;
                if command.address == Register::TRIGGER && command.payload == [0x01] {
                    if let Some(scan) = self.scans.pop_front() {
                        self.input.extend(scan);
                    }
                }
                Ok(())
            }
            Operation::Save => {
                self.flash = Some(self.registers.clone());
                self.reply(ResponseStatus::Ack, &[0x00])
            }
        }
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.check_connected()?;
        if self.input.is_empty() {
            std::thread::sleep(timeout.min(Duration::from_millis(1)));
            return Ok(Vec::new());
        }
        let count = match self.behaviour {
            Behaviour::Trickle => 1,
            _ => max_bytes.min(self.input.len()),
        };
        Ok(self.input.drain(..count).collect())
    }

    fn discard_input(&mut self) -> Result<()> {
        self.check_connected()?;
        self.input.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
