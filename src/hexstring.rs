//! Hex-encoded byte sequences.
//!
//! A [`HexString`] is the wire representation of bytes throughout this crate:
//! trace events, calldata, addresses and storage keys are all parsed into
//! (and rendered back from) this type.

use std::fmt;

use num_bigint::BigUint;

use crate::error::Error;

/// An ordered sequence of bytes, parsed from (and rendered back to) hex text.
///
/// Always holds a whole number of bytes - the textual form always has an even
/// number of hex digits.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct HexString(Vec<u8>);

impl HexString {
    /// Parses hex text, with or without a leading `0x`.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();
        let stripped = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = if stripped.is_empty() {
            Vec::new()
        } else if stripped.len() % 2 == 1 {
            // tolerate an odd nibble count the way geth-style traces sometimes emit it
            let padded = format!("0{stripped}");
            hex::decode(padded).map_err(|_| Error::HexStringParsing(s.to_string()))?
        } else {
            hex::decode(stripped).map_err(|_| Error::HexStringParsing(s.to_string()))?
        };
        Ok(HexString(bytes))
    }

    /// Builds a `HexString` directly from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        HexString(bytes)
    }

    /// `n` zero bytes.
    pub fn zeros(n: usize) -> Self {
        HexString(vec![0u8; n])
    }

    /// Renders a non-negative integer as a `HexString`, in as few bytes as needed.
    pub fn from_int(value: u64) -> Self {
        if value == 0 {
            return HexString(vec![0]);
        }
        HexString(value.to_be_bytes().into_iter().skip_while(|b| *b == 0).collect())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Renders with a `0x` prefix.
    pub fn with_prefix(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    /// Interprets the bytes as a non-negative big-endian integer.
    pub fn as_int(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Interprets the bytes as a `usize`, saturating on overflow.
    ///
    /// Offsets and sizes taken off the stack are astronomically large in
    /// theory; in practice a trace that is actually replayable never needs
    /// more than a few megabytes of memory, so saturating is a reasonable choice.
    pub fn as_usize(&self) -> usize {
        let big = self.as_int();
        big.try_into().unwrap_or(usize::MAX)
    }

    /// Resizes to exactly `target_len` bytes: left-pads with zeros if shorter,
    /// keeps the right-most `target_len` bytes if longer.
    pub fn as_size(&self, target_len: usize) -> HexString {
        if self.0.len() == target_len {
            return self.clone();
        }
        if self.0.len() < target_len {
            let mut padded = vec![0u8; target_len - self.0.len()];
            padded.extend_from_slice(&self.0);
            HexString(padded)
        } else {
            HexString(self.0[self.0.len() - target_len..].to_vec())
        }
    }

    /// Interprets the right-most 20 bytes as an address, canonicalizing length.
    pub fn as_address(&self) -> HexString {
        self.as_size(20)
    }
}

impl fmt::Debug for HexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexString({})", self.with_prefix())
    }
}

impl fmt::Display for HexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.with_prefix())
    }
}

impl TryFrom<&str> for HexString {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        HexString::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_prefix() {
        assert_eq!(HexString::new("0x1234").unwrap().to_hex(), "1234");
        assert_eq!(HexString::new("1234").unwrap().to_hex(), "1234");
    }

    #[test]
    fn as_size_pads_left() {
        let short = HexString::new("0x12").unwrap();
        assert_eq!(short.as_size(4).to_hex(), "00000012");
    }

    #[test]
    fn as_size_truncates_right() {
        let long = HexString::new("0x0000000000000000000000000000000000000000000000000000000012345678").unwrap();
        assert_eq!(long.as_size(4).to_hex(), "12345678");
    }

    #[test]
    fn as_address_keeps_rightmost_20_bytes() {
        let word = HexString::new("0x000000000000000000000000aaaabbbbccccddddeeeeffff0000111122223333").unwrap();
        assert_eq!(word.as_address().to_hex(), "aaaabbbbccccddddeeeeffff0000111122223333");
    }

    #[test]
    fn as_int_reads_big_endian() {
        assert_eq!(HexString::new("0x0100").unwrap().as_int(), BigUint::from(256u32));
    }
}
