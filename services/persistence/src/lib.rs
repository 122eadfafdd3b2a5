//! Persistence & Replay Service
//!
//! Keeps the escrow ledger across restarts: every committed operation is
//! appended to a checksummed journal, the full ledger state is snapshotted
//! periodically, and boot restores the latest snapshot then replays the
//! journal tail on top of it.

pub mod durable;
pub mod journal;
pub mod reader;
pub mod recovery;
pub mod snapshot;

pub use durable::{DurableConfig, DurableError, DurableLedger};
