use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use chrono::NaiveDate;
use tracing::{debug, info, trace, warn};

use crate::{
    Barcodes, IlluminationMode, OperationMode, ScanArea, ScanResult, TargetLightMode,
    config::{CR, ScannerConfig},
    engine::RegisterEngine,
    error::{Error, Result},
    frame::{FrameCodec, Operation},
    mode_byte,
    registers::{FormatCode, FormatSlot, ModuleProfile, ModuleVariant, Register},
    transport::{SerialTransport, Transport},
};

// return original data, CR as end of line, with read fail message,
// without prefix, without code ID, without suffix, with end character
const SERIAL_OUTPUT_BASELINE: u8 = 0b0001_0001;
const ALLOWED_BARCODES_MASK: u8 = 0b0000_0110;
const SCAN_AREA_CENTER: u8 = 0b0000_1000;
const FACTORY_RESET_MAGIC: u8 = 0x50;

/// lifecycle of a scanner session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// the transport is closed
    Disconnected,
    /// the transport is open, but the baseline registers have not been written
    Connected,
    /// `configure()` succeeded, all operations are available
    Configured,
}

/// a session with one barcode scanner
///
/// The session exclusively owns its transport. Operations block until the scanner replied
/// (or the timeout expired), one at a time.
pub struct BarcodeScanner<T: Transport = SerialTransport> {
    engine: RegisterEngine<T>,
    profile: &'static ModuleProfile,
    config: ScannerConfig,
    state: SessionState,
    /// last known register values, the device stays the source of truth
    cache: HashMap<Register, u8>,
}

impl BarcodeScanner<SerialTransport> {
    /// open the serial port with the factory default options (GM65, 9600,8,N,1)
    ///
    /// # Arguments
    ///
    /// * `serial_port_name` the device name of the serial port to open
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gm65_barcodescanner::interface::BarcodeScanner;
    ///
    /// fn main() -> Result<(), gm65_barcodescanner::Error> {
    ///     let mut scanner = BarcodeScanner::new("/dev/serial0")?;
    ///     scanner.configure()?;
    ///     Ok(())
    /// }
    /// ```
    ///
    /// # Notes
    ///
    /// The device is expected to be in UART mode.
    pub fn new(serial_port_name: &str) -> Result<Self> {
        Self::open(serial_port_name, ScannerConfig::default())
    }

    /// open the serial port with the given options
    pub fn open(serial_port_name: &str, config: ScannerConfig) -> Result<Self> {
        let config = config.validated()?;
        let transport = SerialTransport::open(serial_port_name, config.baud)?;
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> BarcodeScanner<T> {
    /// start a session over an already open transport
    pub fn with_transport(transport: T, config: ScannerConfig) -> Result<Self> {
        let config = config.validated()?;
        let profile = config.variant.profile();
        let codec = FrameCodec::new(profile.checksum, profile.max_payload, profile.min_response_len)
            .accept_unchecked(config.accept_unchecked_replies);
        debug!("session with {} created", profile.name);
        Ok(BarcodeScanner {
            engine: RegisterEngine::new(transport, codec, config.retries),
            profile,
            config,
            state: SessionState::Connected,
            cache: HashMap::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn variant(&self) -> ModuleVariant {
        self.config.variant
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// direct access to the transport, bypassing the session
    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.transport_mut()
    }

    /// last value read from or written to a register in this session
    pub fn cached_register(&self, address: Register) -> Option<u8> {
        self.cache.get(&address).copied()
    }

    /// write the baseline registers all other operations depend on
    ///
    /// Sets the light/buzzer/operation mode from the session options, plain serial output
    /// terminated by CR, and the read fail message where the module supports it. Safe to call
    /// repeatedly.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gm65_barcodescanner::{config::ScannerConfig, interface::BarcodeScanner, registers::ModuleVariant};
    ///
    /// fn main() -> Result<(), gm65_barcodescanner::Error> {
    ///     let config = ScannerConfig::default().with_variant(ModuleVariant::Gm812);
    ///     let mut scanner = BarcodeScanner::open("/dev/ttyUSB0", config)?;
    ///     scanner.configure()?;
    ///     Ok(())
    /// }
    /// ```
    pub fn configure(&mut self) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Err(Error::InvalidState {
                operation: "configure",
                actual: self.state,
            });
        }
        info!("configuring {}", self.profile.name);
        let mode = self.config.mode_register_value();
        self.write(Register::MODE, &[mode])?;
        self.write(Register::SERIAL_OUTPUT, &[SERIAL_OUTPUT_BASELINE])?;
        if self.profile.read_fail_message_registers {
            let message = self.config.read_fail_message.clone();
            // bounded by the config validation
            self.write(Register::READ_FAIL_LENGTH, &[message.len() as u8])?;
            self.write(Register::READ_FAIL_MESSAGE, &message)?;
        } else {
            warn!(
                "{} has no read fail message registers, it must be set to {:02X?} with setting codes",
                self.profile.name, self.config.read_fail_message
            );
        }
        self.state = SessionState::Configured;
        Ok(())
    }

    /// save all register values to flash
    ///
    /// # Notes
    ///
    /// Writing the flash is slow and wears it out, no other operation ever calls this.
    pub fn save_config(&mut self) -> Result<()> {
        self.require_configured("save_config")?;
        info!("saving configuration to flash on {}", self.profile.name);
        self.transact(Register(0x0000), Operation::Save, &[0x00])?;
        Ok(())
    }

    /// set the barcode scanner to factory defaults
    ///
    /// # Note
    ///
    /// The session drops back to `Connected`, call `configure()` again afterwards. Make sure the
    /// module is still in `UART` mode (enable it via the corresponding barcode otherwise).
    pub fn factory_reset(&mut self) -> Result<()> {
        self.require_configured("factory_reset")?;
        info!("restoring factory defaults on {}", self.profile.name);
        self.write(Register::FACTORY_RESET, &[FACTORY_RESET_MAGIC])?;
        self.cache.clear();
        self.state = SessionState::Connected;
        Ok(())
    }

    /// close the transport, the session can't be used afterwards
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }
        info!("closing session with {}", self.profile.name);
        self.state = SessionState::Disconnected;
        self.cache.clear();
        self.engine.transport_mut().close()
    }

    /// read `len` consecutive registers starting at `address`
    pub fn read_register(&mut self, address: Register, len: usize) -> Result<Vec<u8>> {
        self.require_configured("read_register")?;
        self.read(address, len)
    }

    /// write `data` into consecutive registers starting at `address`
    ///
    /// the change is lost on power loss unless `save_config()` is called
    pub fn write_register(&mut self, address: Register, data: &[u8]) -> Result<()> {
        self.require_configured("write_register")?;
        self.write(address, data)
    }

    /// enable decoding of one barcode format
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gm65_barcodescanner::{interface::BarcodeScanner, registers::FormatCode};
    ///
    /// fn main() -> Result<(), gm65_barcodescanner::Error> {
    ///     let mut scanner = BarcodeScanner::new("/dev/serial0")?;
    ///     scanner.configure()?;
    ///     scanner.disable_all_formats()?;
    ///     scanner.enable_format(FormatCode::Qr)?;
    ///     Ok(())
    /// }
    /// ```
    pub fn enable_format(&mut self, code: FormatCode) -> Result<()> {
        self.require_configured("enable_format")?;
        info!("enabling format {} on {}", code, self.profile.name);
        let slot = self.format_slot(code)?;
        self.modify(slot.register, |value| value | slot.mask())
    }

    /// disable decoding of one barcode format
    pub fn disable_format(&mut self, code: FormatCode) -> Result<()> {
        self.require_configured("disable_format")?;
        info!("disabling format {} on {}", code, self.profile.name);
        let slot = self.format_slot(code)?;
        self.modify(slot.register, |value| value & !slot.mask())
    }

    /// true if decoding of the barcode format is enabled on the device
    pub fn is_format_enabled(&mut self, code: FormatCode) -> Result<bool> {
        self.require_configured("is_format_enabled")?;
        let slot = self.format_slot(code)?;
        Ok(self.read_byte(slot.register)? & slot.mask() != 0)
    }

    /// disable decoding of all barcode formats
    pub fn disable_all_formats(&mut self) -> Result<()> {
        self.require_configured("disable_all_formats")?;
        info!("disabling all formats on {}", self.profile.name);
        self.apply_allowed_barcodes(Barcodes::DisableAll)
    }

    /// enable decoding of all barcode formats the module supports
    pub fn enable_all_formats(&mut self) -> Result<()> {
        self.require_configured("enable_all_formats")?;
        info!("enabling all formats on {}", self.profile.name);
        self.apply_allowed_barcodes(Barcodes::EnableAll)
    }

    /// enable the module's default set of barcode formats
    pub fn enable_default_formats(&mut self) -> Result<()> {
        self.require_configured("enable_default_formats")?;
        info!("enabling default formats on {}", self.profile.name);
        self.apply_allowed_barcodes(Barcodes::Default)
    }

    /// set the global switch for the barcodes allowed
    ///
    /// # Arguments
    ///
    /// * `allowed_barcodes` specifies which barcode types are recognized based on the barcode scanner model
    ///
    /// # Notes
    ///
    /// The scan area shares the register and is kept. The firmware switches the enable bit of
    /// every format register along with this setting.
    pub fn set_allowed_barcodes(&mut self, allowed_barcodes: Barcodes) -> Result<()> {
        self.require_configured("set_allowed_barcodes")?;
        info!(
            "setting allowed barcodes on {} to {:?}",
            self.profile.name, allowed_barcodes
        );
        self.apply_allowed_barcodes(allowed_barcodes)
    }

    /// specify the minimum and/or maximum number of characters expected in a valid barcode,
    /// all others will be ignored
    pub fn set_format_length_limits(
        &mut self,
        code: FormatCode,
        min_length: Option<u8>,
        max_length: Option<u8>,
    ) -> Result<()> {
        self.require_configured("set_format_length_limits")?;
        let slot = self.format_slot(code)?;
        let Some((min_register, max_register)) = slot.length_limits else {
            return Err(Error::InvalidArgument(format!(
                "format {} has no length limits",
                code
            )));
        };
        if let (Some(min_length), Some(max_length)) = (min_length, max_length) {
            if min_length > max_length {
                return Err(Error::InvalidArgument(format!(
                    "minimum length {} exceeds maximum length {}",
                    min_length, max_length
                )));
            }
        }
        if let Some(min_length) = min_length {
            self.write(min_register, &[min_length])?;
        }
        if let Some(max_length) = max_length {
            self.write(max_register, &[max_length])?;
        }
        Ok(())
    }

    /// trigger a scan and wait for the result
    ///
    /// will return as soon as a result has been read, or fail with `Error::Timeout` when
    /// `timeout` has been reached first
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    ///
    /// use gm65_barcodescanner::{ScanResult, interface::BarcodeScanner};
    ///
    /// fn main() -> Result<(), gm65_barcodescanner::Error> {
    ///     let mut scanner = BarcodeScanner::new("/dev/serial0")?;
    ///     scanner.configure()?;
    ///     println!("Please scan your badge for identification.");
    ///     match scanner.scan(Duration::from_secs(10))? {
    ///         ScanResult::Decoded(data) => println!("data scanned: {}", String::from_utf8_lossy(&data)),
    ///         ScanResult::NoRead(_) => println!("Please try again. Make sure the barcode on your badge is at the center of the green scanning light."),
    ///     }
    ///     Ok(())
    /// }
    /// ```
    ///
    /// # Notes
    ///
    /// A failed decode on the device is a regular result (`ScanResult::NoRead`), not an error.
    pub fn scan(&mut self, timeout: Duration) -> Result<ScanResult> {
        self.require_configured("scan")?;
        if timeout.is_zero() {
            return Err(Error::InvalidArgument(String::from(
                "this crate does not support indefinite waiting",
            )));
        }
        if self.config.operation_mode == OperationMode::Command {
            debug!("triggering a scan on {}", self.profile.name);
            self.write(Register::TRIGGER, &[0x01])?;
        }
        let data = match self.read_scan_result(timeout) {
            Ok(data) => data,
            Err(err) => {
                if err.is_fatal() {
                    self.disconnect_after(&err);
                }
                return Err(err);
            }
        };
        if self.is_read_fail_message(&data) {
            debug!("scanner could not decode a barcode");
            return Ok(ScanResult::NoRead(data));
        }
        // only the final CR is the end character, earlier ones are payload
        let payload = match data.split_last() {
            Some((&CR, payload)) => payload.to_vec(),
            _ => data,
        };
        debug!("{} bytes of barcode data were read", payload.len());
        Ok(ScanResult::Decoded(payload))
    }

    /// start scanning for barcodes without waiting for a result
    pub fn start_scan(&mut self) -> Result<()> {
        self.require_configured("start_scan")?;
        self.write(Register::TRIGGER, &[0x01])
    }

    /// stop scanning for barcodes
    ///
    /// # Notes
    ///
    /// When a barcode has been scanned, the scanner automatically stops scanning in manual and command mode.
    pub fn stop_scan(&mut self) -> Result<()> {
        self.require_configured("stop_scan")?;
        self.write(Register::TRIGGER, &[0x00])
    }

    /// set the mode of operation and light/buzzer parameters
    ///
    /// # Arguments
    ///
    /// * `enable_led_indication_on_successful_scan` if true the LED on the circuit board will light up shortly after a successful scan
    /// * `enable_buzzer` if true a successful scan will be confirmed with a short tone
    /// * `target_light_mode` specifies how the target light is used
    /// * `illumination_mode` specifies how the white LED light will operate
    /// * `operation_mode` defines the scanning mode, `scan()` only triggers in command mode
    pub fn set_mode(
        &mut self,
        enable_led_indication_on_successful_scan: bool,
        enable_buzzer: bool,
        target_light_mode: TargetLightMode,
        illumination_mode: IlluminationMode,
        operation_mode: OperationMode,
    ) -> Result<()> {
        self.require_configured("set_mode")?;
        let mode = mode_byte(
            enable_led_indication_on_successful_scan,
            enable_buzzer,
            target_light_mode,
            illumination_mode,
            operation_mode,
        );
        self.write(Register::MODE, &[mode])?;
        self.config.led_indication = enable_led_indication_on_successful_scan;
        self.config.buzzer = enable_buzzer;
        self.config.target_light = target_light_mode;
        self.config.illumination = illumination_mode;
        self.config.operation_mode = operation_mode;
        Ok(())
    }

    /// set the area of the camera view where barcodes are detected
    pub fn set_scan_area(&mut self, scan_area: ScanArea) -> Result<()> {
        self.require_configured("set_scan_area")?;
        self.modify(Register::SCAN_AREA_AND_BARCODES, |value| match scan_area {
            ScanArea::All => value & !SCAN_AREA_CENTER,
            ScanArea::Center => value | SCAN_AREA_CENTER,
        })
    }

    /// set the maximum time for a manual or command scan before the scanner goes inactive again
    ///
    /// # Arguments
    ///
    /// * `scan_duration` the duration to activate scanning for, allowed range is 1ms to 25.5s
    ///
    /// # Note
    ///
    /// By default the barcode scanner is set to 5s of scanning duration. The host side timeout
    /// passed to `scan()` should be longer.
    pub fn set_scan_duration(&mut self, scan_duration: Duration) -> Result<()> {
        self.require_configured("set_scan_duration")?;
        if scan_duration > Duration::from_millis(25500) {
            return Err(Error::InvalidArgument(String::from(
                "duration is too big, maximum value is 25500 ms (25.5s)",
            )));
        }
        if scan_duration.is_zero() {
            return Err(Error::InvalidArgument(String::from(
                "this crate does not support indefinite scanning",
            )));
        }
        // at least one unit, at most 255 after the check above
        let units = scan_duration.as_millis().div_ceil(100) as u8;
        self.write(Register::SCAN_DURATION, &[units])
    }

    /// disable setting changes via barcode scanning (seems like a really good idea for production use)
    pub fn disable_setting_scanning(&mut self) -> Result<()> {
        self.require_configured("disable_setting_scanning")?;
        self.modify(Register::SETTING_CODE, |value| (value & 0xfe) | 0x02)
    }

    /// enable setting changes via barcode scanning
    pub fn enable_setting_scanning(&mut self) -> Result<()> {
        self.require_configured("enable_setting_scanning")?;
        self.modify(Register::SETTING_CODE, |value| value & 0xfc)
    }

    /// return the hardware version of the attached barcode scanner
    pub fn hardware_version(&mut self) -> Result<String> {
        self.require_configured("hardware_version")?;
        let version = self.read_byte(Register::HW_VERSION)?;
        Ok(version_string(version))
    }

    /// return the software version of the attached barcode scanner
    pub fn software_version(&mut self) -> Result<String> {
        self.require_configured("software_version")?;
        let version = self.read_byte(Register::SW_VERSION)?;
        Ok(version_string(version))
    }

    /// return the software build date of the attached barcode scanner
    pub fn software_date(&mut self) -> Result<NaiveDate> {
        self.require_configured("software_date")?;
        // only the years past year 2000 are returned
        let year: i32 = self.read_byte(Register::SW_YEAR)? as i32 + 2000;
        let month: u32 = self.read_byte(Register::SW_MONTH)? as u32;
        let day: u32 = self.read_byte(Register::SW_DAY)? as u32;
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            Error::Malformed(format!(
                "unable to construct date from year {} month {} day {}",
                year, month, day
            ))
        })
    }

    fn require_configured(&self, operation: &'static str) -> Result<()> {
        if self.state != SessionState::Configured {
            return Err(Error::InvalidState {
                operation,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn format_slot(&self, code: FormatCode) -> Result<FormatSlot> {
        self.profile
            .format_slot(code)
            .copied()
            .ok_or(Error::UnsupportedFormat {
                code,
                variant: self.config.variant,
            })
    }

    fn apply_allowed_barcodes(&mut self, allowed_barcodes: Barcodes) -> Result<()> {
        let bits = match allowed_barcodes {
            Barcodes::EnableAll => 0x02,
            Barcodes::DisableAll => 0x00,
            Barcodes::Default => 0x04,
        };
        self.modify(Register::SCAN_AREA_AND_BARCODES, |value| {
            (value & !ALLOWED_BARCODES_MASK) | bits
        })
    }

    /// read-modify-write of a single register
    ///
    /// a failed write leaves the register as read, nothing is rolled back
    fn modify(&mut self, address: Register, update: impl FnOnce(u8) -> u8) -> Result<()> {
        let current = self.read_byte(address)?;
        let updated = update(current);
        trace!("register {}: {:02X} -> {:02X}", address, current, updated);
        self.write(address, &[updated])
    }

    fn read_byte(&mut self, address: Register) -> Result<u8> {
        let data = self.read(address, 1)?;
        data.first().copied().ok_or_else(|| {
            Error::Malformed(String::from("no data was read from the device"))
        })
    }

    fn read(&mut self, address: Register, len: usize) -> Result<Vec<u8>> {
        if len == 0 || len > 256 {
            return Err(Error::InvalidArgument(format!(
                "can read 1 to 256 registers at once, not {}",
                len
            )));
        }
        if !self.profile.is_readable(address, len) {
            return Err(Error::UndocumentedRegister {
                address: address.0,
                variant: self.config.variant,
            });
        }
        // the barcode scanner expects a length of 0 when 256 bytes should be returned
        let count = if len == 256 { 0 } else { len as u8 };
        let reply = self.transact(address, Operation::Read, &[count])?;
        self.remember(address, &reply);
        Ok(reply)
    }

    fn write(&mut self, address: Register, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidArgument(String::from("nothing to write")));
        }
        match self.profile.is_writable(address, data.len()) {
            None => {
                return Err(Error::UndocumentedRegister {
                    address: address.0,
                    variant: self.config.variant,
                });
            }
            Some(false) => return Err(Error::ReadOnlyRegister(address.0)),
            Some(true) => {}
        }
        self.transact(address, Operation::Write, data)?;
        self.remember(address, data);
        Ok(())
    }

    fn remember(&mut self, address: Register, data: &[u8]) {
        for (offset, value) in data.iter().enumerate() {
            let register = Register(address.0.wrapping_add(offset as u16));
            self.cache.insert(register, *value);
        }
    }

    /// one register transaction, returns the reply data
    fn transact(
        &mut self,
        address: Register,
        operation: Operation,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        match self
            .engine
            .transact(address, operation, payload, self.config.timeout)
        {
            Ok(frame) => Ok(frame.payload),
            Err(err) => {
                if err.is_fatal() {
                    self.disconnect_after(&err);
                }
                Err(err)
            }
        }
    }

    /// the read fail message, with or without the end character appended by the scanner
    fn is_read_fail_message(&self, data: &[u8]) -> bool {
        let message = self.config.read_fail_message.as_slice();
        data == message || data.strip_suffix(&[CR]) == Some(message)
    }

    /// collect one scan result
    ///
    /// The result is complete once it ends with CR (or is the read fail message) and the line
    /// stayed quiet for the end of data gap. A CR followed by more data is part of the payload.
    fn read_scan_result(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let gap = self.config.end_of_data_gap;
        let deadline = Instant::now() + timeout;
        let mut last_byte_at = Instant::now();
        let mut result: Vec<u8> = Vec::with_capacity(256);
        loop {
            let complete = result.last() == Some(&CR) || self.is_read_fail_message(&result);
            let now = Instant::now();
            if complete && (now.duration_since(last_byte_at) >= gap || now >= deadline) {
                trace!("end of data detected, result len {}", result.len());
                return Ok(result);
            }
            if now >= deadline {
                debug!(
                    "timeout waiting for barcode data, {} bytes received: {:02X?}",
                    result.len(),
                    result
                );
                return Err(Error::Timeout(timeout));
            }
            let wait = if complete {
                (last_byte_at + gap).min(deadline).saturating_duration_since(now)
            } else {
                deadline - now
            };
            // byte by byte, anything after the gap belongs to the next scan
            let buffer = self.engine.transport_mut().read(1, wait)?;
            if let Some(&byte) = buffer.first() {
                result.push(byte);
                last_byte_at = Instant::now();
            }
        }
    }

    fn disconnect_after(&mut self, err: &Error) {
        warn!("transport failed ({}), closing session", err);
        self.state = SessionState::Disconnected;
        self.cache.clear();
        if let Err(close_err) = self.engine.transport_mut().close() {
            debug!("closing the transport failed as well: {}", close_err);
        }
    }
}

impl<T: Transport> Drop for BarcodeScanner<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!("closing the session failed: {}", err);
        }
    }
}

fn version_string(version: u8) -> String {
    match version {
        0x64 => String::from("V1.00"),
        0x6E => String::from("V1.10"),
        0x78 => String::from("V1.20"),
        0x82 => String::from("V1.30"),
        0x8C => String::from("V1.40"),
        _ => format!("unknown {:0X}", version),
    }
}
