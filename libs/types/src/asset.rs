//! Asset identifiers
//!
//! An asset is keyed by an address: either a fungible token contract or the
//! well-known sentinel standing for the native currency. Code that moves
//! funds dispatches on [`AssetKind`] instead of comparing addresses.

use crate::errors::ParseError;
use crate::ids::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel address for the native currency
/// (`0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE`)
pub const NATIVE_SENTINEL: Address = Address::repeat_byte(0xee);

/// Opaque asset key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(Address);

/// Tagged view over an [`AssetId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Native,
    Token(Address),
}

impl AssetId {
    /// The native currency
    pub const NATIVE: AssetId = AssetId(NATIVE_SENTINEL);

    pub const fn token(contract: Address) -> Self {
        Self(contract)
    }

    pub fn address(&self) -> Address {
        self.0
    }

    pub fn kind(&self) -> AssetKind {
        if self.0 == NATIVE_SENTINEL {
            AssetKind::Native
        } else {
            AssetKind::Token(self.0)
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind(), AssetKind::Native)
    }
}

impl From<Address> for AssetId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Address>().map(Self)
    }
}
