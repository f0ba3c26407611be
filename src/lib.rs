use std::fmt::Display;

pub mod config;
pub mod crc;
pub mod engine;
pub mod error;
pub mod frame;
pub mod interface;
pub mod registers;
#[cfg(test)]
mod sim;
pub mod transport;

pub use config::ScannerConfig;
pub use error::{Error, Result};
pub use interface::{BarcodeScanner, SessionState};
pub use registers::{FormatCode, ModuleVariant, Register};

// indicates, that the checksum was not calculated (checksum will not be validated when allowed)
pub const IGNORED_CHECKSUM: u16 = 0xabcd;

/// negative acknowledgement, also the first byte of the default read fail message
pub const NAK: u8 = 0x15;

/// target light mode to indicate scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetLightMode {
    /// target light is disabled
    AlwaysOff,
    /// target light is always on (also when not scanning)
    AlwaysOn,
    /// target light is on during scanning
    Standard,
}

/// light mode for object detection in dark environments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IlluminationMode {
    /// white LED is disabled (scanning in dark environments might be difficult)
    AlwaysOff,
    /// white LED is always on (also when not scanning)
    AlwaysOn,
    /// white LED is on during scanning
    Standard,
}

/// scanner mode operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// push button to scan
    Manual,
    /// send command to scan
    Command,
    /// continuous scanning
    Continuous,
    /// detect ambient brightness change and start scanning
    Sensing,
}

/// scan area for bar codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanArea {
    /// the entire area of view of the camera is used to detect barcodes
    All,
    /// the center area (default 20%) of the camera is used to detect barcodes
    Center,
}

/// global switch for the barcode formats the scanner decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barcodes {
    /// enable all supported barcodes
    EnableAll,
    /// disable all barcodes
    DisableAll,
    /// enable all default barcodes
    Default,
}

/// value of the mode register
pub(crate) fn mode_byte(
    enable_led_indication_on_successful_scan: bool,
    enable_buzzer: bool,
    target_light_mode: TargetLightMode,
    illumination_mode: IlluminationMode,
    operation_mode: OperationMode,
) -> u8 {
    let mut operation: u8 = 0x0;
    if enable_led_indication_on_successful_scan {
        operation |= 0x80;
    }
    if enable_buzzer {
        operation |= 0x40;
    }
    match target_light_mode {
        TargetLightMode::AlwaysOff => {}
        TargetLightMode::AlwaysOn => operation |= 0x20,
        TargetLightMode::Standard => operation |= 0x10,
    }
    match illumination_mode {
        IlluminationMode::AlwaysOff => {}
        IlluminationMode::AlwaysOn => operation |= 0x08,
        IlluminationMode::Standard => operation |= 0x04,
    }
    match operation_mode {
        OperationMode::Manual => {}
        OperationMode::Command => operation |= 0x01,
        OperationMode::Continuous => operation |= 0x02,
        OperationMode::Sensing => operation |= 0x03,
    }
    operation
}

/// outcome of a single scan
///
/// Decoding happens on the scanner, the payload is passed on untouched. Bytes like `0x15` or
/// `0x0D` inside a payload are data, only the CR ending the transmission is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// barcode payload, without the final CR
    Decoded(Vec<u8>),
    /// the scanner could not decode a barcode in time and sent its read fail message
    NoRead(Vec<u8>),
}

impl ScanResult {
    pub fn is_decoded(&self) -> bool {
        matches!(self, ScanResult::Decoded(_))
    }

    /// the payload, or the read fail message as received
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ScanResult::Decoded(data) | ScanResult::NoRead(data) => data,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ScanResult::Decoded(data) | ScanResult::NoRead(data) => data,
        }
    }
}

impl Display for ScanResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanResult::Decoded(data) => write!(
                f,
                "{}",
                String::from_utf8_lossy(data)
                    .lines()
                    .enumerate()
                    .map(|(i, line)| format!("{}: {}", i, line))
                    .collect::<Vec<String>>()
                    .join("\n")
            ),
            ScanResult::NoRead(data) => write!(f, "no read ({:02X?})", data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_byte() {
        assert_eq!(
            mode_byte(
                false,
                false,
                TargetLightMode::AlwaysOff,
                IlluminationMode::AlwaysOff,
                OperationMode::Manual
            ),
            0x00
        );
        assert_eq!(
            mode_byte(
                true,
                false,
                TargetLightMode::AlwaysOn,
                IlluminationMode::AlwaysOn,
                OperationMode::Sensing
            ),
            0b1010_1011
        );
    }

    #[test]
    fn test_scan_result_display() {
        let result = ScanResult::Decoded(b"first\nsecond".to_vec());
        assert_eq!(result.to_string(), "0: first\n1: second");
        let result = ScanResult::NoRead(vec![NAK, 0x0D]);
        assert_eq!(result.to_string(), "no read ([15, 0D])");
    }
}
