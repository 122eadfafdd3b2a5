mod auth;
mod config;
mod error;
mod handlers;
mod logging;
mod models;
mod rate_limit;
mod router;
mod state;

use anyhow::Context;
use clap::Parser;
use config::{Commands, GatewayCli, ServeArgs};
use escrow_contracts::{ContractConfig, Ledger};
use escrow_persistence::{DurableConfig, DurableLedger};
use escrow_types::ids::Address;
use router::create_router;
use state::{AppState, Settings};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    let cli = GatewayCli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Token(args) => {
            let keys = auth::JwtKeys::new(args.jwt_secret.as_bytes());
            let token = keys.issue(&args.address, args.ttl_secs)?;
            println!("{}", token);
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<(), anyhow::Error> {
    logging::init_logging(&args.log_level, args.log_format);
    tracing::info!(data_dir = %args.data_dir.display(), "Starting escrow gateway");

    let durable = DurableConfig {
        snapshot_every: args.snapshot_every,
        retain_snapshots: args.retain_snapshots,
        ..DurableConfig::new(&args.data_dir)
    };
    let genesis_config = ContractConfig {
        payment_receiver: args.payment_receiver,
        request_fee: args.request_fee,
        operator: args.operator,
    };
    let contract_address = args.contract_address.unwrap_or_else(Address::random);
    let ledger = DurableLedger::open(durable, || {
        Ledger::deploy(contract_address, args.owner, genesis_config)
    })
    .context("failed to open ledger")?;

    let state = AppState::new(
        ledger,
        Settings {
            jwt_secret: args.jwt_secret.clone(),
            faucet_enabled: args.faucet,
            rate_limit_burst: args.rate_limit_burst,
            rate_limit_per_sec: args.rate_limit_per_sec,
        },
    );
    let app = create_router(state.clone());

    let listener = TcpListener::bind(args.listen).await?;
    tracing::info!("Listening on {}", args.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let mut ledger = state.ledger.lock().await;
    ledger.snapshot().context("final snapshot failed")?;
    tracing::info!(sequence = ledger.last_sequence(), "Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
