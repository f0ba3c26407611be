use std::time::Duration;

use crate::{
    IlluminationMode, NAK, OperationMode, TargetLightMode,
    error::{Error, Result},
    registers::ModuleVariant,
};

/// carriage return, the end character `configure()` sets up for every scan result
pub const CR: u8 = 0x0D;

/// silence after which a scan result is considered complete
pub const DEFAULT_END_OF_DATA_GAP: Duration = Duration::from_millis(50);

/// message the scanner sends when a scan fails, NAK followed by CR
///
/// This is a convention configured on the device itself (written by `configure()` where the
/// module has the registers, set up manually via setting codes otherwise). The host has no way
/// to verify it and only compares the received bytes against it.
pub const DEFAULT_READ_FAIL_MESSAGE: [u8; 2] = [NAK, CR];

/// options for a scanner session
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub variant: ModuleVariant,
    /// baud rate of the serial connection, 9600 is the factory default
    pub baud: u32,
    /// how long to wait for the reply to a single register command
    pub timeout: Duration,
    /// re-sends of a command after a timed out or corrupted reply
    pub retries: u32,
    /// bytes the scanner returns instead of a payload when decoding fails
    pub read_fail_message: Vec<u8>,
    /// silence after the end character (or the read fail message) that completes a scan result,
    /// end characters arriving earlier are part of the payload
    pub end_of_data_gap: Duration,
    /// accept replies carrying the "checksum not calculated" marker
    pub accept_unchecked_replies: bool,
    pub led_indication: bool,
    pub buzzer: bool,
    pub target_light: TargetLightMode,
    pub illumination: IlluminationMode,
    pub operation_mode: OperationMode,
    /// `with_retries` was called, `with_variant` keeps the count
    retries_set: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        let variant = ModuleVariant::default();
        ScannerConfig {
            variant,
            baud: 9600,
            // TODO: confirm the reply latency against the GM65 datasheet, 500ms is a placeholder
            timeout: Duration::from_millis(500),
            retries: variant.profile().default_retries,
            read_fail_message: DEFAULT_READ_FAIL_MESSAGE.to_vec(),
            end_of_data_gap: DEFAULT_END_OF_DATA_GAP,
            accept_unchecked_replies: false,
            led_indication: true,
            buzzer: true,
            target_light: TargetLightMode::Standard,
            illumination: IlluminationMode::Standard,
            operation_mode: OperationMode::Command,
            retries_set: false,
        }
    }
}

impl ScannerConfig {
    /// build a configuration from plain option values
    ///
    /// # Arguments
    ///
    /// * `baud` - the baud rate of the serial connection
    /// * `timeout_s` - the reply timeout in seconds
    /// * `retries` - re-sends of a command after a failed attempt
    pub fn from_options(baud: u32, timeout_s: f64, retries: u32) -> Result<Self> {
        let timeout = Duration::try_from_secs_f64(timeout_s)
            .map_err(|err| Error::InvalidArgument(format!("timeout {}: {}", timeout_s, err)))?;
        ScannerConfig::default()
            .with_baud(baud)
            .with_timeout(timeout)
            .with_retries(retries)
            .validated()
    }

    /// select the module variant, the retry count follows the variant's default unless it was
    /// set with `with_retries`
    pub fn with_variant(mut self, variant: ModuleVariant) -> Self {
        self.variant = variant;
        if !self.retries_set {
            self.retries = variant.profile().default_retries;
        }
        self
    }

    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self.retries_set = true;
        self
    }

    /// change the expected read fail message
    ///
    /// Decoded payloads still end with CR, the message does not need to.
    pub fn with_read_fail_message(mut self, message: &[u8]) -> Self {
        self.read_fail_message = message.to_vec();
        self
    }

    pub fn with_end_of_data_gap(mut self, gap: Duration) -> Self {
        self.end_of_data_gap = gap;
        self
    }

    pub fn with_operation_mode(mut self, operation_mode: OperationMode) -> Self {
        self.operation_mode = operation_mode;
        self
    }

    /// accept replies whose checksum field holds the "not calculated" marker
    pub fn with_unchecked_replies(mut self, accept: bool) -> Self {
        self.accept_unchecked_replies = accept;
        self
    }

    /// check the options for values the scanner or the protocol cannot handle
    pub fn validated(self) -> Result<Self> {
        if self.baud == 0 {
            return Err(Error::InvalidArgument(String::from("baud rate must not be 0")));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidArgument(String::from(
                "this crate does not support indefinite waiting",
            )));
        }
        if self.read_fail_message.is_empty() || self.read_fail_message.len() > 16 {
            return Err(Error::InvalidArgument(format!(
                "read fail message must be 1 to 16 bytes, got {}",
                self.read_fail_message.len()
            )));
        }
        if self.end_of_data_gap.is_zero() {
            return Err(Error::InvalidArgument(String::from(
                "end of data gap must not be 0",
            )));
        }
        Ok(self)
    }

    /// value of the mode register for the configured light, buzzer and operation settings
    pub fn mode_register_value(&self) -> u8 {
        crate::mode_byte(
            self.led_indication,
            self.buzzer,
            self.target_light,
            self.illumination,
            self.operation_mode,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_register() {
        // LED on, buzzer on, lights while scanning, command triggered
        assert_eq!(ScannerConfig::default().mode_register_value(), 0b1101_0101);
    }

    #[test]
    fn test_from_options() -> anyhow::Result<()> {
        let config = ScannerConfig::from_options(115200, 1.5, 4)?;
        assert_eq!(config.baud, 115200);
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retries, 4);
        assert!(ScannerConfig::from_options(9600, -1.0, 2).is_err());
        assert!(ScannerConfig::from_options(9600, 0.0, 2).is_err());
        assert!(ScannerConfig::from_options(0, 1.0, 2).is_err());
        Ok(())
    }

    #[test]
    fn test_read_fail_message() {
        let config = ScannerConfig::default().with_read_fail_message(b"FAIL\n");
        assert_eq!(config.read_fail_message, b"FAIL\n".to_vec());
        assert!(config.validated().is_ok());
        // a message without any end character is fine too
        let mut config = ScannerConfig::default();
        config.read_fail_message = vec![NAK];
        assert!(config.clone().validated().is_ok());
        config.read_fail_message = Vec::new();
        assert!(config.validated().is_err());
        let config = ScannerConfig::default().with_end_of_data_gap(Duration::ZERO);
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_variant_keeps_explicit_retries() {
        let config = ScannerConfig::default()
            .with_retries(5)
            .with_variant(ModuleVariant::Gm812);
        assert_eq!(config.retries, 5);
        let config = ScannerConfig::default()
            .with_retries(0)
            .with_variant(ModuleVariant::Waveshare);
        assert_eq!(config.retries, 0);
        let config = ScannerConfig::default().with_variant(ModuleVariant::Gm812);
        assert_eq!(
            config.retries,
            ModuleVariant::Gm812.profile().default_retries
        );
    }

    #[test]
    fn test_from_options_survives_variant_change() -> anyhow::Result<()> {
        let config = ScannerConfig::from_options(9600, 0.2, 7)?.with_variant(ModuleVariant::Gm812);
        assert_eq!(config.retries, 7);
        Ok(())
    }
}
