//! Small hex helpers shared by the provider and contract layers

use std::num::ParseIntError;

/// Parse a `0x`-prefixed (or bare) hex quantity such as a chain id.
pub fn parse_hex_u64(value: &str) -> Result<u64, ParseIntError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16)
}

/// Render a chain id as the `0x`-prefixed quantity wallets expect.
pub fn to_hex_quantity(value: u64) -> String {
    format!("{:#x}", value)
}

pub fn decode_hex_str(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits)
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quantities_with_and_without_prefix() {
        assert_eq!(parse_hex_u64("0xa869").unwrap(), 43113);
        assert_eq!(parse_hex_u64("0XA869").unwrap(), 43113);
        assert_eq!(parse_hex_u64("a869").unwrap(), 43113);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn renders_quantities_lowercase() {
        assert_eq!(to_hex_quantity(43113), "0xa869");
        assert_eq!(to_hex_quantity(1), "0x1");
    }

    #[test]
    fn hex_bytes_round_trip_through_prefix() {
        let bytes = decode_hex_str("0x08c379a0").unwrap();
        assert_eq!(bytes, vec![0x08, 0xc3, 0x79, 0xa0]);
        assert_eq!(encode_hex(&bytes), "0x08c379a0");
        assert_eq!(encode_hex(&[]), "0x");
    }
}
