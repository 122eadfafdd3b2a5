//! Identifier types for ledger participants and withdrawal requests
//!
//! Addresses are 20-byte account keys rendered as `0x`-prefixed lowercase
//! hex. Request identifiers are a gapless counter starting at 1.

use crate::errors::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte length of an account address
pub const ADDRESS_LENGTH: usize = 20;

/// Account address
///
/// Identifies callers, the payment receiver, the contract itself and token
/// contracts alike. The all-zero address is a valid value and is accepted
/// wherever the ledger accepts an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The zero address
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Address with every byte set to `byte`
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; ADDRESS_LENGTH])
    }

    /// Fresh random address
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| ParseError::MissingPrefix(s.to_string()))?;

        let bytes = hex::decode(digits).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
        let bytes: [u8; ADDRESS_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ParseError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// Withdrawal request identifier
///
/// Allocated as `last + 1`; the first request ever created gets id 1, so
/// `RequestId::default()` (0) never names a real request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Identifier following this one, `None` on counter exhaustion
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
