//! Command-line and environment configuration
//!
//! Every flag has an `ESCROW_*` environment fallback; a `.env` file in the
//! working directory is loaded before parsing.

use clap::{Args, Parser, Subcommand};
use escrow_types::ids::Address;
use escrow_types::numeric::Amount;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Escrow payment ledger gateway.
#[derive(Parser, Debug)]
#[command(name = "escrow-gateway", version, propagate_version = true)]
pub struct GatewayCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open (or create) the ledger and serve the HTTP API.
    Serve(ServeArgs),
    /// Print a signed bearer token for an address.
    Token(TokenArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "ESCROW_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Journal and snapshots live under this directory.
    #[arg(long, short = 'd', env = "ESCROW_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Contract address used at first deployment. Random when omitted.
    #[arg(long, env = "ESCROW_CONTRACT_ADDRESS")]
    pub contract_address: Option<Address>,

    /// Deployer and initial owner.
    #[arg(long, env = "ESCROW_OWNER")]
    pub owner: Address,

    #[arg(long, env = "ESCROW_OPERATOR")]
    pub operator: Address,

    #[arg(long, env = "ESCROW_PAYMENT_RECEIVER")]
    pub payment_receiver: Address,

    /// Native fee charged per withdrawal request, in base units.
    #[arg(long, env = "ESCROW_REQUEST_FEE", default_value = "20000000000000000")]
    pub request_fee: Amount,

    #[arg(long, env = "ESCROW_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Expose POST /v1/bank/mint.
    #[arg(long, env = "ESCROW_FAUCET")]
    pub faucet: bool,

    /// Committed operations between snapshots (0 disables).
    #[arg(long, env = "ESCROW_SNAPSHOT_EVERY", default_value_t = 1_000)]
    pub snapshot_every: u64,

    #[arg(long, env = "ESCROW_RETAIN_SNAPSHOTS", default_value_t = 3)]
    pub retain_snapshots: usize,

    /// Token-bucket capacity per caller for state-changing calls.
    #[arg(long, env = "ESCROW_RATE_LIMIT_BURST", default_value_t = 20)]
    pub rate_limit_burst: u32,

    /// Tokens refilled per second.
    #[arg(long, env = "ESCROW_RATE_LIMIT_PER_SEC", default_value_t = 5.0)]
    pub rate_limit_per_sec: f64,

    #[arg(long, env = "ESCROW_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "ESCROW_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Args, Debug, Clone)]
pub struct TokenArgs {
    /// Address placed in the `sub` claim.
    pub address: Address,

    #[arg(long, env = "ESCROW_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Token lifetime in seconds.
    #[arg(long, default_value_t = 3_600)]
    pub ttl_secs: u64,
}
