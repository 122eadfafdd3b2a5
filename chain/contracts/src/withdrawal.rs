//! Withdrawal System: request, confirm, reject
//!
//! A player files a request and pays a flat fee in native currency. The
//! operator later either confirms it, paying the amount out of the
//! contract's own balance, or rejects it with no transfer.
//!
//! Lifecycle: `NonExistent -> Pending -> {Confirmed, Rejected}`.
//! Both terminal states read as `is_pending == false`.

use escrow_types::asset::AssetId;
use escrow_types::ids::{Address, RequestId};
use escrow_types::numeric::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bank::{AssetFlow, Bank, Checkpointed};
use crate::contract::CallContext;
use crate::errors::WithdrawalError;
use crate::events::{RequestConfirmed, RequestRejected, WithdrawRequest};
use crate::registry::AssetRegistry;

/// A single withdrawal request. Unknown identifiers read as the zeroed
/// default record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub player: Address,
    pub quote_token: AssetId,
    pub amount: Amount,
    pub is_pending: bool,
}

/// Request store plus the ordered set of pending identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQueue {
    requests: BTreeMap<RequestId, WithdrawalRequest>,
    /// Pending identifiers in creation order
    pending: Vec<RequestId>,
    last_id: RequestId,
    request_fee: Amount,
    /// Fees retained by the contract
    collected_fees: Amount,
    #[serde(skip)]
    undo: Option<QueueUndo>,
}

/// Counters at the checkpoint plus the structural changes made since.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueUndo {
    last_id: RequestId,
    collected_fees: Amount,
    changes: Vec<QueueChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueChange {
    Created(RequestId),
    /// Resolved request and its former position in `pending`
    Resolved { id: RequestId, index: usize },
}

impl WithdrawalQueue {
    pub fn new(request_fee: Amount) -> Self {
        Self {
            requests: BTreeMap::new(),
            pending: Vec::new(),
            last_id: RequestId::new(0),
            request_fee,
            collected_fees: Amount::ZERO,
            undo: None,
        }
    }

    /// Queue a withdrawal of `amount` of `asset` for the caller.
    ///
    /// The attached value must cover the request fee and is retained in
    /// full, surplus included. Identifiers start at 1.
    pub fn request(
        &mut self,
        registry: &AssetRegistry,
        call: &CallContext,
        asset: AssetId,
        amount: Amount,
    ) -> Result<WithdrawRequest, WithdrawalError> {
        let config = registry.check(&asset);
        if !config.is_available {
            return Err(WithdrawalError::AssetNotAllowed { asset });
        }
        if amount < config.min_amount {
            return Err(WithdrawalError::AmountTooLow {
                amount,
                min_amount: config.min_amount,
            });
        }
        if call.value < self.request_fee {
            return Err(WithdrawalError::InsufficientFee {
                required: self.request_fee,
                paid: call.value,
            });
        }

        let id = self.last_id.next().ok_or(WithdrawalError::IdsExhausted)?;
        let collected_fees = self
            .collected_fees
            .checked_add(call.value)
            .ok_or(WithdrawalError::Overflow)?;

        self.requests.insert(
            id,
            WithdrawalRequest {
                player: call.caller,
                quote_token: asset,
                amount,
                is_pending: true,
            },
        );
        self.pending.push(id);
        self.last_id = id;
        self.collected_fees = collected_fees;
        self.record(QueueChange::Created(id));

        Ok(WithdrawRequest {
            player: call.caller,
            asset,
            amount,
            request_id: id,
        })
    }

    /// Pay out a pending request from `custodian` to its player.
    ///
    /// The request is resolved before the transfer runs, so a nested call
    /// observes it as no longer pending. A failed transfer surfaces as an
    /// error and the caller is expected to discard the whole call.
    pub fn confirm<B: Bank + ?Sized>(
        &mut self,
        bank: &mut B,
        custodian: &Address,
        id: RequestId,
    ) -> Result<RequestConfirmed, WithdrawalError> {
        let request = self.resolve(id)?;
        request
            .quote_token
            .transfer_out(bank, custodian, &request.player, request.amount)?;

        Ok(RequestConfirmed {
            player: request.player,
            asset: request.quote_token,
            amount: request.amount,
            request_id: id,
        })
    }

    /// Close a pending request without paying anything out.
    pub fn reject(&mut self, id: RequestId) -> Result<RequestRejected, WithdrawalError> {
        let request = self.resolve(id)?;
        Ok(RequestRejected {
            player: request.player,
            asset: request.quote_token,
            amount: request.amount,
            request_id: id,
        })
    }

    fn resolve(&mut self, id: RequestId) -> Result<WithdrawalRequest, WithdrawalError> {
        let request = match self.requests.get_mut(&id) {
            Some(r) if r.is_pending => r,
            _ => return Err(WithdrawalError::NotPending { id }),
        };
        request.is_pending = false;
        let resolved = *request;
        if let Some(index) = self.pending.iter().position(|p| *p == id) {
            self.pending.remove(index);
            self.record(QueueChange::Resolved { id, index });
        }
        Ok(resolved)
    }

    fn record(&mut self, change: QueueChange) {
        if let Some(undo) = self.undo.as_mut() {
            undo.changes.push(change);
        }
    }

    pub fn pending_ids(&self) -> &[RequestId] {
        &self.pending
    }

    pub fn status(&self, id: RequestId) -> WithdrawalRequest {
        self.requests.get(&id).copied().unwrap_or_default()
    }

    pub fn get(&self, id: RequestId) -> Option<&WithdrawalRequest> {
        self.requests.get(&id)
    }

    pub fn last_id(&self) -> RequestId {
        self.last_id
    }

    pub fn request_fee(&self) -> Amount {
        self.request_fee
    }

    pub fn collected_fees(&self) -> Amount {
        self.collected_fees
    }
}

impl Checkpointed for WithdrawalQueue {
    fn checkpoint(&mut self) {
        self.undo = Some(QueueUndo {
            last_id: self.last_id,
            collected_fees: self.collected_fees,
            changes: Vec::new(),
        });
    }

    fn commit(&mut self) {
        self.undo = None;
    }

    fn rollback(&mut self) {
        let Some(undo) = self.undo.take() else {
            return;
        };
        for change in undo.changes.into_iter().rev() {
            match change {
                QueueChange::Created(id) => {
                    self.requests.remove(&id);
                    if self.pending.last() == Some(&id) {
                        self.pending.pop();
                    }
                }
                QueueChange::Resolved { id, index } => {
                    if let Some(request) = self.requests.get_mut(&id) {
                        request.is_pending = true;
                    }
                    self.pending.insert(index.min(self.pending.len()), id);
                }
            }
        }
        self.last_id = undo.last_id;
        self.collected_fees = undo.collected_fees;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::InMemoryBank;

    const COIN: u128 = 1_000_000_000_000_000_000;
    const FEE: u128 = 20_000_000_000_000_000;

    fn player() -> Address {
        Address::repeat_byte(0x01)
    }

    fn contract() -> Address {
        Address::repeat_byte(0xc0)
    }

    fn token() -> AssetId {
        AssetId::token(Address::repeat_byte(0x70))
    }

    fn setup() -> (WithdrawalQueue, AssetRegistry) {
        let mut registry = AssetRegistry::new();
        registry.add(token(), Amount::new(2 * COIN)).unwrap();
        registry.add(AssetId::NATIVE, Amount::new(2 * COIN)).unwrap();
        (WithdrawalQueue::new(Amount::new(FEE)), registry)
    }

    fn paid(value: u128) -> CallContext {
        CallContext::new(player()).with_value(Amount::new(value))
    }

    #[test]
    fn test_request_allocates_sequential_ids() {
        let (mut queue, registry) = setup();
        let first = queue
            .request(&registry, &paid(FEE), token(), Amount::new(2 * COIN))
            .unwrap();
        let second = queue
            .request(&registry, &paid(FEE), AssetId::NATIVE, Amount::new(2 * COIN))
            .unwrap();

        assert_eq!(first.request_id, RequestId::new(1));
        assert_eq!(second.request_id, RequestId::new(2));
        assert_eq!(queue.pending_ids(), &[RequestId::new(1), RequestId::new(2)]);
        assert_eq!(queue.last_id(), RequestId::new(2));
        assert_eq!(queue.collected_fees(), Amount::new(2 * FEE));

        let status = queue.status(RequestId::new(1));
        assert!(status.is_pending);
        assert_eq!(status.player, player());
        assert_eq!(status.quote_token, token());
    }

    #[test]
    fn test_request_validation_order() {
        let (mut queue, registry) = setup();
        let unlisted = AssetId::token(Address::repeat_byte(0x99));
        assert!(matches!(
            queue.request(&registry, &paid(0), unlisted, Amount::ZERO),
            Err(WithdrawalError::AssetNotAllowed { .. })
        ));
        assert!(matches!(
            queue.request(&registry, &paid(0), token(), Amount::new(200_000)),
            Err(WithdrawalError::AmountTooLow { .. })
        ));
        assert_eq!(
            queue.request(&registry, &paid(100), token(), Amount::new(2 * COIN)),
            Err(WithdrawalError::InsufficientFee {
                required: Amount::new(FEE),
                paid: Amount::new(100)
            })
        );
        assert_eq!(queue.last_id(), RequestId::new(0));
        assert!(queue.pending_ids().is_empty());
    }

    #[test]
    fn test_surplus_fee_is_retained() {
        let (mut queue, registry) = setup();
        queue
            .request(&registry, &paid(FEE + 5), token(), Amount::new(2 * COIN))
            .unwrap();
        assert_eq!(queue.collected_fees(), Amount::new(FEE + 5));
    }

    #[test]
    fn test_confirm_pays_player() {
        let (mut queue, registry) = setup();
        let mut bank = InMemoryBank::new();
        bank.mint(&token(), &contract(), Amount::new(2 * COIN)).unwrap();
        queue
            .request(&registry, &paid(FEE), token(), Amount::new(2 * COIN))
            .unwrap();

        let event = queue
            .confirm(&mut bank, &contract(), RequestId::new(1))
            .unwrap();
        assert_eq!(event.player, player());
        assert_eq!(bank.balance_of(&token(), &player()), Amount::new(2 * COIN));
        assert!(!queue.status(RequestId::new(1)).is_pending);
        assert!(queue.pending_ids().is_empty());
    }

    #[test]
    fn test_confirm_underfunded_reports_transfer_error() {
        let (mut queue, registry) = setup();
        let mut bank = InMemoryBank::new();
        queue
            .request(&registry, &paid(FEE), token(), Amount::new(2 * COIN))
            .unwrap();
        let err = queue
            .confirm(&mut bank, &contract(), RequestId::new(1))
            .unwrap_err();
        assert!(matches!(err, WithdrawalError::Transfer(_)));
    }

    #[test]
    fn test_resolved_request_cannot_be_resolved_again() {
        let (mut queue, registry) = setup();
        queue
            .request(&registry, &paid(FEE), token(), Amount::new(2 * COIN))
            .unwrap();
        queue.reject(RequestId::new(1)).unwrap();
        assert_eq!(
            queue.reject(RequestId::new(1)),
            Err(WithdrawalError::NotPending {
                id: RequestId::new(1)
            })
        );
        let mut bank = InMemoryBank::new();
        assert!(queue.confirm(&mut bank, &contract(), RequestId::new(1)).is_err());
    }

    #[test]
    fn test_unknown_id_is_not_pending() {
        let (mut queue, _) = setup();
        assert_eq!(queue.status(RequestId::new(7)), WithdrawalRequest::default());
        assert!(queue.get(RequestId::new(7)).is_none());
        assert!(matches!(
            queue.reject(RequestId::new(7)),
            Err(WithdrawalError::NotPending { .. })
        ));
    }

    #[test]
    fn test_pending_removal_preserves_order() {
        let (mut queue, registry) = setup();
        for _ in 0..4 {
            queue
                .request(&registry, &paid(FEE), token(), Amount::new(2 * COIN))
                .unwrap();
        }
        queue.reject(RequestId::new(2)).unwrap();
        assert_eq!(
            queue.pending_ids(),
            &[RequestId::new(1), RequestId::new(3), RequestId::new(4)]
        );
    }

    #[test]
    fn test_rollback_restores_pending_position() {
        let (mut queue, registry) = setup();
        let mut bank = InMemoryBank::new();
        for _ in 0..3 {
            queue
                .request(&registry, &paid(FEE), token(), Amount::new(2 * COIN))
                .unwrap();
        }
        let before = queue.clone();

        queue.checkpoint();
        queue.reject(RequestId::new(2)).unwrap();
        queue
            .request(&registry, &paid(FEE + 1), token(), Amount::new(2 * COIN))
            .unwrap();
        assert!(queue
            .confirm(&mut bank, &contract(), RequestId::new(1))
            .is_err());
        queue.rollback();

        assert_eq!(queue, before);
        assert_eq!(
            queue.pending_ids(),
            &[RequestId::new(1), RequestId::new(2), RequestId::new(3)]
        );
        assert!(queue.status(RequestId::new(1)).is_pending);
        assert!(queue.get(RequestId::new(4)).is_none());
    }

    #[test]
    fn test_commit_keeps_new_request() {
        let (mut queue, registry) = setup();
        queue.checkpoint();
        queue
            .request(&registry, &paid(FEE), token(), Amount::new(2 * COIN))
            .unwrap();
        queue.commit();
        queue.rollback();
        assert_eq!(queue.last_id(), RequestId::new(1));
        assert_eq!(queue.pending_ids(), &[RequestId::new(1)]);
    }
}
