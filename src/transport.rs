//! Byte-stream transport to the scanner
//!
//! The protocol engine only needs timed reads and blocking writes of raw bytes. The serial
//! implementation lives here; tests drive the engine through a simulated device instead.

use std::time::Duration;

use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

/// byte-stream connection to a scanner
pub trait Transport {
    /// write all bytes, blocking until they have been handed to the device
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// read up to `max_bytes`, waiting at most `timeout` for the first byte
    ///
    /// returns an empty buffer if nothing arrived in time
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// throw away everything received but not read yet
    fn discard_input(&mut self) -> Result<()>;

    /// release the connection, further reads and writes fail
    fn close(&mut self) -> Result<()>;
}

/// serial (UART or USB CDC) connection to a scanner
pub struct SerialTransport {
    port: Option<SerialPort>,
    name: String,
}

impl SerialTransport {
    /// open the serial port with 8 data bits, no parity, 1 stop bit and no flow control
    ///
    /// # Arguments
    ///
    /// * `serial_port_name` the device name of the serial port to open
    /// * `baud_rate` the baud rate configured on the scanner, 9600 is the factory default
    pub fn open(serial_port_name: &str, baud_rate: u32) -> Result<Self> {
        info!("opening {} at {} baud", serial_port_name, baud_rate);
        let port = SerialPort::open(serial_port_name, |mut settings: Settings| {
            settings.set_raw();
            settings.set_baud_rate(baud_rate)?;
            settings.set_char_size(CharSize::Bits8);
            settings.set_stop_bits(StopBits::One);
            settings.set_parity(Parity::None);
            settings.set_flow_control(FlowControl::None);
            Ok(settings)
        })?;
        port.discard_buffers()?;
        Ok(SerialTransport {
            port: Some(port),
            name: serial_port_name.to_string(),
        })
    }

    fn port(&mut self) -> Result<&mut SerialPort> {
        self.port.as_mut().ok_or_else(|| {
            Error::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("serial port {} is closed", self.name),
            ))
        })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        debug!("WRITE TO SERIAL {} bytes: {:02X?}", data.len(), data);
        self.port()?.write_all(data)?;
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        let port = self.port()?;
        // a zero timeout would mean "block forever" for some drivers
        port.set_read_timeout(timeout.max(Duration::from_millis(1)))?;
        let mut buffer: Vec<u8> = vec![0x00; max_bytes];
        match port.read(&mut buffer) {
            Ok(read_bytes) => {
                buffer.truncate(read_bytes);
                trace!("READ FROM SERIAL {} bytes: {:02X?}", read_bytes, buffer);
                Ok(buffer)
            }
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        self.port()?.discard_input_buffer()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(port) = self.port.take() {
            debug!("closing {}", self.name);
            // pending output is irrelevant once the session is gone
            port.discard_buffers()?;
        }
        Ok(())
    }
}
