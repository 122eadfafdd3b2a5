use crate::auth::JwtKeys;
use crate::error::AppError;
use crate::rate_limit::RateLimiter;
use escrow_contracts::{ContractEvent, Operation, Receipt};
use escrow_persistence::{DurableError, DurableLedger};
use escrow_types::ids::Address;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub struct Settings {
    pub jwt_secret: String,
    pub faucet_enabled: bool,
    pub rate_limit_burst: u32,
    pub rate_limit_per_sec: f64,
}

#[derive(Clone)]
pub struct AppState {
    /// Single writer: every operation is applied under this lock.
    pub ledger: Arc<Mutex<DurableLedger>>,
    pub keys: Arc<JwtKeys>,
    pub rate_limiter: Arc<RateLimiter>,
    pub events: broadcast::Sender<ContractEvent>,
    pub faucet_enabled: bool,
}

impl AppState {
    pub fn new(ledger: DurableLedger, settings: Settings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
            keys: Arc::new(JwtKeys::new(settings.jwt_secret.as_bytes())),
            rate_limiter: Arc::new(RateLimiter::new(
                settings.rate_limit_burst,
                settings.rate_limit_per_sec,
            )),
            events,
            faucet_enabled: settings.faucet_enabled,
        }
    }

    pub fn throttle(&self, caller: &Address, scope: &str) -> Result<(), AppError> {
        self.rate_limiter
            .check_rate_limit(&format!("{}:{}", caller, scope))
    }

    /// Execute `operation` for `caller`, persist it and publish its events.
    /// Returns the receipt and the journal sequence it was committed at.
    ///
    /// The journal write and any periodic snapshot block on disk, so they
    /// run on the blocking pool. Events are published before the lock is
    /// released, keeping the live feed in commit order.
    pub async fn submit(
        &self,
        caller: Address,
        operation: Operation,
    ) -> Result<(Receipt, u64), AppError> {
        let name = operation.name();
        let mut ledger = self.ledger.clone().lock_owned().await;
        let events = self.events.clone();

        let (receipt, sequence) = tokio::task::spawn_blocking(move || {
            let receipt = ledger.execute(caller, operation)?;
            let sequence = ledger.last_sequence();
            for event in &receipt.events {
                // no subscribers is fine
                let _ = events.send(event.clone());
            }
            Ok::<_, DurableError>((receipt, sequence))
        })
        .await
        .map_err(|e| AppError::InternalError(e.into()))?
        .map_err(|e| {
            tracing::info!(op = name, caller = %caller, error = %e, "operation rejected");
            AppError::from(e)
        })?;

        tracing::info!(op = name, caller = %caller, sequence, events = receipt.events.len(), "operation committed");
        Ok((receipt, sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_contracts::{ContractConfig, Ledger};
    use escrow_persistence::DurableConfig;
    use escrow_types::asset::AssetId;
    use escrow_types::numeric::Amount;
    use tempfile::TempDir;

    fn owner() -> Address {
        Address::repeat_byte(0x01)
    }

    fn state(dir: &TempDir) -> AppState {
        let ledger = DurableLedger::open(
            DurableConfig {
                snapshot_every: 7,
                ..DurableConfig::new(dir.path())
            },
            || {
                Ledger::deploy(
                    Address::repeat_byte(0xc0),
                    owner(),
                    ContractConfig {
                        payment_receiver: Address::repeat_byte(0x5e),
                        request_fee: Amount::new(1),
                        operator: Address::repeat_byte(0x02),
                    },
                )
            },
        )
        .unwrap();
        AppState::new(
            ledger,
            Settings {
                jwt_secret: "test-secret".to_string(),
                faucet_enabled: true,
                rate_limit_burst: 100,
                rate_limit_per_sec: 100.0,
            },
        )
    }

    async fn fund_players(state: &AppState, players: u8) {
        state
            .submit(
                owner(),
                Operation::AddQuoteToken {
                    asset: AssetId::NATIVE,
                    min_amount: Amount::ZERO,
                },
            )
            .await
            .unwrap();
        for i in 0..players {
            state
                .submit(
                    owner(),
                    Operation::Mint {
                        asset: AssetId::NATIVE,
                        to: Address::repeat_byte(0x80 + i),
                        amount: Amount::new(1),
                    },
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_submits_commit_in_order() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let players = 24u8;
        fund_players(&state, players).await;
        let base = state.ledger.lock().await.last_sequence();
        let mut feed = state.events.subscribe();

        let mut tasks = Vec::new();
        for i in 0..players {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                state
                    .submit(
                        Address::repeat_byte(0x80 + i),
                        Operation::WithdrawRequest {
                            asset: AssetId::NATIVE,
                            amount: Amount::new(1),
                            value: Amount::new(1),
                        },
                    )
                    .await
            }));
        }

        let mut sequences = Vec::new();
        for task in tasks {
            let (receipt, sequence) = task.await.unwrap().unwrap();
            // request ids and journal sequences advance together
            let id = receipt.request_id().unwrap();
            assert_eq!(base + id.value(), sequence);
            sequences.push(sequence);
        }
        sequences.sort_unstable();
        let expected: Vec<u64> = (base + 1..=base + u64::from(players)).collect();
        assert_eq!(sequences, expected);

        for expected in 1..=u64::from(players) {
            match feed.recv().await.unwrap() {
                ContractEvent::WithdrawRequest(event) => {
                    assert_eq!(event.request_id.value(), expected)
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_rejected_submit_is_not_committed() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let err = state
            .submit(
                Address::repeat_byte(0x04),
                Operation::AddQuoteToken {
                    asset: AssetId::NATIVE,
                    min_amount: Amount::ZERO,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Contract(ref e) if e.code() == "PERMISSION_DENIED"));
        assert_eq!(state.ledger.lock().await.last_sequence(), 0);
    }
}
