//! Register addresses, barcode format slots and the per-module constant tables.
//!
//! Every supported module variant maps to one static [`ModuleProfile`], selected once when a
//! session is created. The engine never branches on the variant itself, it only consults the
//! profile.

use std::fmt::Display;

use crate::crc::Checksum;

/// address of a configuration register on the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(pub u16);

impl Register {
    /// LED, buzzer, target light, illumination and operation mode
    pub const MODE: Register = Register(0x0000);
    /// scan trigger, write 1 to start and 0 to stop scanning
    pub const TRIGGER: Register = Register(0x0002);
    /// setting code (configuration via scanned barcodes) behaviour
    pub const SETTING_CODE: Register = Register(0x0003);
    /// duration of a single scan in 100ms units
    pub const SCAN_DURATION: Register = Register(0x0006);
    /// scan area (bit 3) and allowed barcodes (bits 2..1)
    pub const SCAN_AREA_AND_BARCODES: Register = Register(0x002C);
    /// serial output options: terminator, read fail return, prefix/suffix, code ID
    pub const SERIAL_OUTPUT: Register = Register(0x0060);
    /// length of the message returned when a scan fails
    pub const READ_FAIL_LENGTH: Register = Register(0x0081);
    /// first byte of the message returned when a scan fails
    pub const READ_FAIL_MESSAGE: Register = Register(0x0082);
    /// writing the reset magic here restores the factory defaults
    pub const FACTORY_RESET: Register = Register(0x00D9);
    pub const HW_VERSION: Register = Register(0x00E1);
    pub const SW_VERSION: Register = Register(0x00E2);
    pub const SW_YEAR: Register = Register(0x00E3);
    pub const SW_MONTH: Register = Register(0x00E4);
    pub const SW_DAY: Register = Register(0x00E5);
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// barcode symbology that can be enabled or disabled for decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatCode {
    Ean13,
    Ean8,
    UpcA,
    UpcE0,
    UpcE1,
    Code128,
    Code39,
    Code93,
    Codabar,
    Qr,
    Interleaved2of5,
    Industrial2of5,
    Matrix2of5,
    Code11,
    Msi,
    Rss14,
    LimitedRss,
    ExpandedRss,
    StackedRss,
    DataMatrix,
    Pdf417,
    MicroPdf417,
    Isbn,
    Issn,
    MicroQr,
}

impl Display for FormatCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FormatCode::Ean13 => "EAN13",
            FormatCode::Ean8 => "EAN8",
            FormatCode::UpcA => "UPC-A",
            FormatCode::UpcE0 => "UPC-E0",
            FormatCode::UpcE1 => "UPC-E1",
            FormatCode::Code128 => "Code128",
            FormatCode::Code39 => "Code39",
            FormatCode::Code93 => "Code93",
            FormatCode::Codabar => "Codabar",
            FormatCode::Qr => "QR",
            FormatCode::Interleaved2of5 => "Interleaved 2of5",
            FormatCode::Industrial2of5 => "Industrial 2of5",
            FormatCode::Matrix2of5 => "Matrix 2of5",
            FormatCode::Code11 => "Code11",
            FormatCode::Msi => "MSI-Plessey",
            FormatCode::Rss14 => "GS1 Databar (RSS-14)",
            FormatCode::LimitedRss => "GS1 Databar Limited",
            FormatCode::ExpandedRss => "GS1 Databar Expanded",
            FormatCode::StackedRss => "GS1 Databar Stacked",
            FormatCode::DataMatrix => "DataMatrix",
            FormatCode::Pdf417 => "PDF417",
            FormatCode::MicroPdf417 => "Micro PDF417",
            FormatCode::Isbn => "ISBN",
            FormatCode::Issn => "ISSN",
            FormatCode::MicroQr => "Micro QR",
        };
        f.write_str(name)
    }
}

/// location of a format's enable bit, plus its optional length limit registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSlot {
    pub register: Register,
    pub bit: u8,
    /// (minimum length, maximum length) registers
    pub length_limits: Option<(Register, Register)>,
}

impl FormatSlot {
    const fn simple(address: u16) -> Self {
        FormatSlot {
            register: Register(address),
            bit: 0,
            length_limits: None,
        }
    }

    const fn with_limits(address: u16, min: u16, max: u16) -> Self {
        FormatSlot {
            register: Register(address),
            bit: 0,
            length_limits: Some((Register(min), Register(max))),
        }
    }

    /// the bitmask of this format inside its register
    pub fn mask(&self) -> u8 {
        1 << self.bit
    }
}

/// a contiguous range of documented registers
#[derive(Debug, Clone, Copy)]
pub struct RegisterSpan {
    pub first: u16,
    pub last: u16,
    pub writable: bool,
}

const fn span(first: u16, last: u16, writable: bool) -> RegisterSpan {
    RegisterSpan {
        first,
        last,
        writable,
    }
}

/// the module variants speaking this register protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleVariant {
    #[default]
    Gm65,
    Gm812,
    /// Waveshare barcode scanner module (GM65 based)
    Waveshare,
}

impl Display for ModuleVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.profile().name)
    }
}

impl ModuleVariant {
    /// the constant table for this variant
    pub fn profile(self) -> &'static ModuleProfile {
        match self {
            ModuleVariant::Gm65 => &GM65,
            ModuleVariant::Gm812 => &GM812,
            ModuleVariant::Waveshare => &WAVESHARE,
        }
    }
}

/// constant description of one module variant
#[derive(Debug)]
pub struct ModuleProfile {
    pub name: &'static str,
    pub checksum: Checksum,
    /// largest payload a single command frame can carry
    pub max_payload: usize,
    /// header (2) + status (1) + length (1) + checksum (2)
    pub min_response_len: usize,
    /// re-sends of a command after a timed out or corrupted reply
    pub default_retries: u32,
    /// whether registers 0x0081/0x0082 (read fail message) exist
    pub read_fail_message_registers: bool,
    pub registers: &'static [RegisterSpan],
    pub formats: &'static [(FormatCode, FormatSlot)],
}

impl ModuleProfile {
    fn find_span(&self, address: u16) -> Option<&RegisterSpan> {
        self.registers
            .iter()
            .find(|span| span.first <= address && address <= span.last)
    }

    /// true if every register in `address..address+len` is documented
    pub fn is_readable(&self, address: Register, len: usize) -> bool {
        (0..len.max(1)).all(|offset| {
            u16::try_from(offset)
                .ok()
                .and_then(|offset| address.0.checked_add(offset))
                .and_then(|address| self.find_span(address))
                .is_some()
        })
    }

    /// `None` if some register in the range is undocumented, `Some(false)` if one is read-only
    pub fn is_writable(&self, address: Register, len: usize) -> Option<bool> {
        let mut writable = true;
        for offset in 0..len.max(1) {
            let span = u16::try_from(offset)
                .ok()
                .and_then(|offset| address.0.checked_add(offset))
                .and_then(|address| self.find_span(address))?;
            writable &= span.writable;
        }
        Some(writable)
    }

    /// register and bit of a barcode format
    pub fn format_slot(&self, code: FormatCode) -> Option<&FormatSlot> {
        self.formats
            .iter()
            .find(|(format, _)| *format == code)
            .map(|(_, slot)| slot)
    }
}

// bit positions and addresses are fixed by the module firmware
const FORMATS: &[(FormatCode, FormatSlot)] = &[
    (FormatCode::StackedRss, FormatSlot::simple(0x0026)),
    (FormatCode::MicroPdf417, FormatSlot::simple(0x0029)),
    (FormatCode::Ean13, FormatSlot::simple(0x002E)),
    (FormatCode::Ean8, FormatSlot::simple(0x002F)),
    (FormatCode::UpcA, FormatSlot::simple(0x0030)),
    (FormatCode::UpcE0, FormatSlot::simple(0x0031)),
    (FormatCode::UpcE1, FormatSlot::simple(0x0032)),
    (FormatCode::Code128, FormatSlot::with_limits(0x0033, 0x0034, 0x0035)),
    (FormatCode::Code39, FormatSlot::with_limits(0x0036, 0x0037, 0x0038)),
    (FormatCode::Code93, FormatSlot::with_limits(0x0039, 0x003A, 0x003B)),
    (FormatCode::Codabar, FormatSlot::with_limits(0x003C, 0x003D, 0x003E)),
    (FormatCode::Qr, FormatSlot::simple(0x003F)),
    (FormatCode::Interleaved2of5, FormatSlot::with_limits(0x0040, 0x0041, 0x0042)),
    (FormatCode::Industrial2of5, FormatSlot::with_limits(0x0043, 0x0044, 0x0045)),
    (FormatCode::Matrix2of5, FormatSlot::with_limits(0x0046, 0x0047, 0x0048)),
    (FormatCode::Code11, FormatSlot::with_limits(0x0049, 0x004A, 0x004B)),
    (FormatCode::Msi, FormatSlot::with_limits(0x004C, 0x004D, 0x004E)),
    (FormatCode::Rss14, FormatSlot::simple(0x004F)),
    (FormatCode::LimitedRss, FormatSlot::simple(0x0050)),
    (FormatCode::ExpandedRss, FormatSlot::with_limits(0x0051, 0x0052, 0x0053)),
    (FormatCode::DataMatrix, FormatSlot::simple(0x0054)),
    (FormatCode::Pdf417, FormatSlot::simple(0x0055)),
    (FormatCode::Issn, FormatSlot::simple(0x0056)),
    (FormatCode::Isbn, FormatSlot::simple(0x0057)),
    (FormatCode::MicroQr, FormatSlot::simple(0x005F)),
];

const GM65_REGISTERS: &[RegisterSpan] = &[
    span(0x0000, 0x000D, true),
    span(0x0026, 0x0060, true),
    span(0x0062, 0x0063, true),
    span(0x0081, 0x0091, true),
    span(0x00D9, 0x00D9, true),
    span(0x00E1, 0x00E5, false),
];

// no read fail message registers on the GM812
const GM812_REGISTERS: &[RegisterSpan] = &[
    span(0x0000, 0x000D, true),
    span(0x0026, 0x0060, true),
    span(0x0062, 0x0063, true),
    span(0x00D9, 0x00D9, true),
    span(0x00E1, 0x00E5, false),
];

// TODO: confirm the retry count against the GM65 datasheet, 2 is a placeholder
const DEFAULT_RETRIES: u32 = 2;

static GM65: ModuleProfile = ModuleProfile {
    name: "GM65",
    checksum: Checksum::CrcCcitt,
    max_payload: 255,
    min_response_len: 6,
    default_retries: DEFAULT_RETRIES,
    read_fail_message_registers: true,
    registers: GM65_REGISTERS,
    formats: FORMATS,
};

static GM812: ModuleProfile = ModuleProfile {
    name: "GM812",
    checksum: Checksum::CrcCcitt,
    max_payload: 255,
    min_response_len: 6,
    default_retries: DEFAULT_RETRIES,
    read_fail_message_registers: false,
    registers: GM812_REGISTERS,
    formats: FORMATS,
};

static WAVESHARE: ModuleProfile = ModuleProfile {
    name: "Waveshare barcode scanner",
    checksum: Checksum::CrcCcitt,
    max_payload: 255,
    min_response_len: 6,
    default_retries: DEFAULT_RETRIES,
    read_fail_message_registers: true,
    registers: GM65_REGISTERS,
    formats: FORMATS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_registers() {
        let profile = ModuleVariant::Gm65.profile();
        assert!(profile.is_readable(Register::MODE, 1));
        assert!(profile.is_readable(Register::SW_YEAR, 3));
        assert!(!profile.is_readable(Register(0x0010), 1));
        // a range running off the end of a span is rejected
        assert!(!profile.is_readable(Register(0x00E4), 3));
        assert_eq!(profile.is_writable(Register::READ_FAIL_MESSAGE, 2), Some(true));
        assert_eq!(profile.is_writable(Register::HW_VERSION, 1), Some(false));
        assert_eq!(profile.is_writable(Register(0x1000), 1), None);
    }

    #[test]
    fn test_gm812_lacks_read_fail_registers() {
        let profile = ModuleVariant::Gm812.profile();
        assert!(!profile.read_fail_message_registers);
        assert_eq!(profile.is_writable(Register::READ_FAIL_LENGTH, 1), None);
    }

    #[test]
    fn test_format_slots() {
        let profile = ModuleVariant::Gm65.profile();
        let qr = profile.format_slot(FormatCode::Qr).copied();
        assert_eq!(qr.map(|slot| slot.register), Some(Register(0x003F)));
        assert_eq!(qr.map(|slot| slot.mask()), Some(0x01));
        let datamatrix = profile.format_slot(FormatCode::DataMatrix).copied();
        assert_eq!(datamatrix.map(|slot| slot.register), Some(Register(0x0054)));
        let code128 = profile.format_slot(FormatCode::Code128).copied();
        assert_eq!(
            code128.and_then(|slot| slot.length_limits),
            Some((Register(0x0034), Register(0x0035)))
        );
        // every format slot points at a documented, writable register
        for (code, slot) in profile.formats {
            assert_eq!(
                profile.is_writable(slot.register, 1),
                Some(true),
                "format {}",
                code
            );
        }
    }
}
