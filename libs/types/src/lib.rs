//! Types library for the escrow payment ledger
//!
//! Core identifiers and amounts shared by the contract, persistence and
//! gateway crates.
//!
//! # Modules
//! - `ids`: Account addresses and withdrawal request identifiers
//! - `asset`: Asset identifiers and the native/token split
//! - `numeric`: Unsigned base-unit amounts with checked arithmetic
//! - `errors`: Parse errors for the textual forms of the above

pub mod asset;
pub mod errors;
pub mod ids;
pub mod numeric;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::asset::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
}
