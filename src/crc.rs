use crc_any::CRC;
use tracing::trace;

/// checksum algorithm used by a module variant to protect its frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// CRC-16/CCITT, polynomial 0x1021, initial value 0, not reflected
    CrcCcitt,
}

impl Checksum {
    /// calculate the checksum of a command or reply packet body
    ///
    /// # Arguments
    ///
    /// * `data` - the data to calculate the checksum on
    ///
    /// # Returns
    ///
    /// * the checksum as a u16
    ///
    pub fn calculate(self, data: &[u8]) -> u16 {
        match self {
            Checksum::CrcCcitt => calculate_crc(data),
        }
    }

    /// verify a received checksum, returns the calculated value on mismatch
    pub fn verify(self, data: &[u8], received_checksum: u16) -> Result<(), u16> {
        let calculated_checksum = self.calculate(data);
        if calculated_checksum != received_checksum {
            return Err(calculated_checksum);
        }
        Ok(())
    }
}

fn calculate_crc(data: &[u8]) -> u16 {
    // Use CRC_CCITT polynomial: X16+X12+X5+1, whose coefficients is 0x1021.
    // Initial value is 0, first calculate high bit for single byte without negating.
    let mut crc_calc = CRC::create_crc_u16(0x1021, 16, 0, 0, false);
    crc_calc.digest(data);
    let crc = (crc_calc.get_crc() & 0xFFFF) as u16;
    trace!("CRC {:04X}", crc);
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_crc() {
        assert_eq!(Checksum::CrcCcitt.calculate(&[0x00, 0x01, 0x00]), 0x3331);
        assert_eq!(
            Checksum::CrcCcitt.calculate(&[0x00, 0x07, 0x01, 0x00, 0x0A, 0x01]),
            0xee8a
        );
        assert_eq!(Checksum::CrcCcitt.calculate(&[0x00, 0x00, 0x01, 0x3E]), 0xe4ac);
        assert_eq!(
            Checksum::CrcCcitt.calculate(&[0x00, 0x08, 0x01, 0x00, 0x0A, 0x3E]),
            0x4ccf
        );
    }

    #[test]
    fn test_verify_crc() {
        let data = [0x00, 0x01, 0x00];
        assert_eq!(Checksum::CrcCcitt.verify(&data, 0x3331), Ok(()));
        assert_eq!(Checksum::CrcCcitt.verify(&data, 0x3332), Err(0x3331));
    }
}
