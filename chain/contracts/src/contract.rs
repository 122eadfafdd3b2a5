//! The deployed payment contract
//!
//! [`PaymentContract`] composes access control, the asset registry, the
//! deposit ledger and the withdrawal queue behind the public entry points.
//! Entry points that move value run under the reentrancy guard.
//!
//! Calls are not atomic on their own: a failing call may leave attached
//! value with the contract. Use [`crate::ledger::Ledger`] to get
//! all-or-nothing execution. The ledger relies on the [`Checkpointed`]
//! impl here, which copies only the components bounded by the number of
//! listed assets and truncates the event log instead of copying it.

use escrow_types::asset::AssetId;
use escrow_types::ids::{Address, RequestId};
use escrow_types::numeric::Amount;
use serde::{Deserialize, Serialize};

use crate::bank::{AssetFlow, Bank, Checkpointed};
use crate::deposit::DepositLedger;
use crate::errors::ContractError;
use crate::events::ContractEvent;
use crate::registry::{AssetConfig, AssetRegistry};
use crate::security::{AccessControl, ReentrancyGuard, Role};
use crate::withdrawal::{WithdrawalQueue, WithdrawalRequest};

/// Deployment parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub payment_receiver: Address,
    /// Flat native-currency fee per withdrawal request
    pub request_fee: Amount,
    pub operator: Address,
}

/// Who is calling and how much native value they attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub value: Amount,
}

impl CallContext {
    pub fn new(caller: Address) -> Self {
        Self {
            caller,
            value: Amount::ZERO,
        }
    }

    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentContract {
    address: Address,
    access: AccessControl,
    registry: AssetRegistry,
    deposits: DepositLedger,
    withdrawals: WithdrawalQueue,
    #[serde(skip)]
    guard: ReentrancyGuard,
    /// Every event emitted since deployment, in order
    events: Vec<ContractEvent>,
    #[serde(skip)]
    saved: Option<Box<SavedParts>>,
}

/// Components copied whole at a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SavedParts {
    access: AccessControl,
    registry: AssetRegistry,
    deposits: DepositLedger,
    guard: ReentrancyGuard,
    events_len: usize,
}

impl PaymentContract {
    /// Deploy at `address`. The deployer becomes the owner.
    pub fn deploy(address: Address, deployer: Address, config: ContractConfig) -> Self {
        Self {
            address,
            access: AccessControl::new(deployer, config.operator),
            registry: AssetRegistry::new(),
            deposits: DepositLedger::new(config.payment_receiver),
            withdrawals: WithdrawalQueue::new(config.request_fee),
            guard: ReentrancyGuard::new(),
            events: Vec::new(),
            saved: None,
        }
    }

    // ── Owner administration ──────────────────────────────────

    pub fn add_quote_token(
        &mut self,
        caller: &Address,
        asset: AssetId,
        min_amount: Amount,
    ) -> Result<(), ContractError> {
        self.access.ensure(caller, Role::Owner)?;
        self.registry.add(asset, min_amount)?;
        Ok(())
    }

    pub fn remove_quote_token(
        &mut self,
        caller: &Address,
        asset: AssetId,
    ) -> Result<(), ContractError> {
        self.access.ensure(caller, Role::Owner)?;
        self.registry.remove(asset)?;
        Ok(())
    }

    pub fn update_min_amount(
        &mut self,
        caller: &Address,
        asset: AssetId,
        new_amount: Amount,
    ) -> Result<(), ContractError> {
        self.access.ensure(caller, Role::Owner)?;
        self.registry.update_min_amount(asset, new_amount);
        Ok(())
    }

    /// Replace the deposit destination. The zero address is accepted.
    pub fn update_payment_receiver(
        &mut self,
        caller: &Address,
        new_receiver: Address,
    ) -> Result<(), ContractError> {
        self.access.ensure(caller, Role::Owner)?;
        self.deposits.set_payment_receiver(new_receiver);
        Ok(())
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        new_owner: Address,
    ) -> Result<(), ContractError> {
        self.access.transfer_ownership(caller, new_owner)?;
        Ok(())
    }

    // ── Payable entry points ──────────────────────────────────

    pub fn deposit<B: Bank + ?Sized>(
        &mut self,
        bank: &mut B,
        call: &CallContext,
        asset: AssetId,
        on_behalf_of: Address,
        amount: Amount,
    ) -> Result<ContractEvent, ContractError> {
        self.guarded(|c| {
            c.receive_value(bank, call)?;
            let event = c.deposits.deposit(
                bank,
                &c.registry,
                &c.address,
                call,
                asset,
                on_behalf_of,
                amount,
            )?;
            Ok(c.emit(ContractEvent::DepositToken(event)))
        })
    }

    pub fn withdraw_request<B: Bank + ?Sized>(
        &mut self,
        bank: &mut B,
        call: &CallContext,
        asset: AssetId,
        amount: Amount,
    ) -> Result<ContractEvent, ContractError> {
        self.guarded(|c| {
            c.receive_value(bank, call)?;
            let event = c.withdrawals.request(&c.registry, call, asset, amount)?;
            Ok(c.emit(ContractEvent::WithdrawRequest(event)))
        })
    }

    // ── Operator resolution ───────────────────────────────────

    pub fn confirm_request<B: Bank + ?Sized>(
        &mut self,
        bank: &mut B,
        caller: &Address,
        id: RequestId,
    ) -> Result<ContractEvent, ContractError> {
        self.guarded(|c| {
            c.access.ensure(caller, Role::Operator)?;
            let event = c.withdrawals.confirm(bank, &c.address, id)?;
            Ok(c.emit(ContractEvent::RequestConfirmed(event)))
        })
    }

    /// Only the operator may reject, even when the owner is a different
    /// address.
    pub fn reject_request(
        &mut self,
        caller: &Address,
        id: RequestId,
    ) -> Result<ContractEvent, ContractError> {
        self.guarded(|c| {
            c.access.ensure(caller, Role::Operator)?;
            let event = c.withdrawals.reject(id)?;
            Ok(c.emit(ContractEvent::RequestRejected(event)))
        })
    }

    // ── Views ─────────────────────────────────────────────────

    pub fn check_quote_token(&self, asset: &AssetId) -> AssetConfig {
        self.registry.check(asset)
    }

    pub fn quote_tokens(&self) -> Vec<(AssetId, AssetConfig)> {
        self.registry.available_assets()
    }

    pub fn request_status(&self, id: RequestId) -> WithdrawalRequest {
        self.withdrawals.status(id)
    }

    pub fn pending_requests(&self) -> Vec<RequestId> {
        self.withdrawals.pending_ids().to_vec()
    }

    pub fn last_request_id(&self) -> RequestId {
        self.withdrawals.last_id()
    }

    pub fn payment_receiver(&self) -> Address {
        self.deposits.payment_receiver()
    }

    pub fn request_fee(&self) -> Amount {
        self.withdrawals.request_fee()
    }

    pub fn collected_fees(&self) -> Amount {
        self.withdrawals.collected_fees()
    }

    pub fn total_forwarded(&self, asset: &AssetId) -> Amount {
        self.deposits.total_forwarded(asset)
    }

    pub fn deposit_count(&self) -> u64 {
        self.deposits.deposit_count()
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn operator(&self) -> Address {
        self.access.operator()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    pub fn is_locked(&self) -> bool {
        self.guard.is_locked()
    }

    // ── Internals ─────────────────────────────────────────────

    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ContractError>,
    ) -> Result<T, ContractError> {
        if !self.guard.acquire() {
            return Err(ContractError::Reentrancy);
        }
        let result = f(self);
        self.guard.release();
        result
    }

    /// Move the attached native value from the caller into the contract.
    fn receive_value<B: Bank + ?Sized>(
        &self,
        bank: &mut B,
        call: &CallContext,
    ) -> Result<(), ContractError> {
        if call.value.is_zero() {
            return Ok(());
        }
        AssetId::NATIVE.transfer_in(bank, &call.caller, &self.address, call.value)?;
        Ok(())
    }

    fn emit(&mut self, event: ContractEvent) -> ContractEvent {
        self.events.push(event.clone());
        event
    }
}

impl Checkpointed for PaymentContract {
    fn checkpoint(&mut self) {
        self.saved = Some(Box::new(SavedParts {
            access: self.access.clone(),
            registry: self.registry.clone(),
            deposits: self.deposits.clone(),
            guard: self.guard.clone(),
            events_len: self.events.len(),
        }));
        self.withdrawals.checkpoint();
    }

    fn commit(&mut self) {
        self.saved = None;
        self.withdrawals.commit();
    }

    fn rollback(&mut self) {
        let Some(saved) = self.saved.take() else {
            return;
        };
        let SavedParts {
            access,
            registry,
            deposits,
            guard,
            events_len,
        } = *saved;
        self.access = access;
        self.registry = registry;
        self.deposits = deposits;
        self.guard = guard;
        self.events.truncate(events_len);
        self.withdrawals.rollback();
    }
}
