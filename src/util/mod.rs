//! Utility module
//!
//! Binary-coded decimal helpers shared by the clock-register driver.

/// Decodes a packed BCD byte into its binary value
pub fn bcd_to_bin(value: u8) -> u8 {
    (value & 0x0f) + (value >> 4) * 10
}

/// Encodes a binary value 0-99 into a packed BCD byte
pub fn bin_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Whether both nibbles of the byte are decimal digits
pub fn is_valid_bcd(value: u8) -> bool {
    (value & 0x0f) <= 9 && (value >> 4) <= 9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcd_round_trip() {
        for byte in 0x00..=0x99u8 {
            if !is_valid_bcd(byte) {
                continue;
            }
            assert_eq!(bin_to_bcd(bcd_to_bin(byte)), byte, "byte {:#04x}", byte);
        }
    }

    #[test]
    fn test_bcd_values() {
        assert_eq!(bcd_to_bin(0x59), 59);
        assert_eq!(bin_to_bcd(23), 0x23);
        assert!(!is_valid_bcd(0x1a));
    }
}
