//! EVM address handling
//!
//! Every address that enters the system goes through [`Address::parse`], which
//! validates the hex form and keeps the raw 20 bytes. Equality and hashing work
//! on the bytes, so lower-case, upper-case and EIP-55 mixed-case spellings of
//! the same address compare equal. Display always renders the checksum form.

use ethers::types::H160;
use ethers::utils::to_checksum;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

lazy_static! {
    static ref ADDRESS_RE: Regex = Regex::new(r"^0[xX][0-9a-fA-F]{40}$").expect("static regex");
}

/// Checksummed 20-byte address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(H160);

impl Address {
    /// The all-zero address, used when the feed omits a creator
    pub fn zero() -> Self {
        Self(H160::zero())
    }

    /// Parse and normalize an address string.
    ///
    /// Accepts any letter case; the stored form is the raw bytes and the
    /// rendered form is EIP-55.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if !ADDRESS_RE.is_match(trimmed) {
            return Err(Error::AddressFormat {
                address: input.to_string(),
                reason: "expected 0x followed by 40 hex characters".to_string(),
            });
        }

        let bytes = H160::from_str(&trimmed[2..]).map_err(|e| Error::AddressFormat {
            address: input.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self(bytes))
    }

    /// EIP-55 representation
    pub fn to_checksum(&self) -> String {
        to_checksum(&self.0, None)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vector from EIP-55
    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn test_checksum_normalization() {
        let lower = Address::parse(&CHECKSUMMED.to_lowercase()).unwrap();
        assert_eq!(lower.to_string(), CHECKSUMMED);

        let upper = Address::parse(&format!("0x{}", CHECKSUMMED[2..].to_uppercase())).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let addr = Address::parse(&format!("  {}\n", CHECKSUMMED)).unwrap();
        assert_eq!(addr.to_string(), CHECKSUMMED);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_err());
        assert!(Address::parse("0xZZAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_err());
        assert!(matches!(
            Address::parse("not-an-address"),
            Err(Error::AddressFormat { .. })
        ));
    }

    #[test]
    fn test_zero_address() {
        let zero = Address::parse("0x0000000000000000000000000000000000000000").unwrap();
        assert!(zero.is_zero());
        assert_eq!(zero, Address::zero());
    }

    #[test]
    fn test_serde_roundtrip_uses_checksum() {
        let addr = Address::parse(&CHECKSUMMED.to_lowercase()).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", CHECKSUMMED));
    }
}
