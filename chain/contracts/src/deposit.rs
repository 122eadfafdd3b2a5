//! Deposit forwarding
//!
//! Deposits pass straight through the contract to the payment receiver.
//! The contract's own balance of the deposited asset is unchanged by a
//! successful deposit.

use escrow_types::asset::{AssetId, AssetKind};
use escrow_types::ids::Address;
use escrow_types::numeric::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bank::{AssetFlow, Bank};
use crate::contract::CallContext;
use crate::errors::DepositError;
use crate::events::DepositToken;
use crate::registry::AssetRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositLedger {
    payment_receiver: Address,
    /// Cumulative amount forwarded per asset
    forwarded: BTreeMap<AssetId, Amount>,
    deposit_count: u64,
}

impl DepositLedger {
    pub fn new(payment_receiver: Address) -> Self {
        Self {
            payment_receiver,
            forwarded: BTreeMap::new(),
            deposit_count: 0,
        }
    }

    pub fn payment_receiver(&self) -> Address {
        self.payment_receiver
    }

    pub fn set_payment_receiver(&mut self, receiver: Address) {
        self.payment_receiver = receiver;
    }

    pub fn total_forwarded(&self, asset: &AssetId) -> Amount {
        self.forwarded.get(asset).copied().unwrap_or(Amount::ZERO)
    }

    pub fn deposit_count(&self) -> u64 {
        self.deposit_count
    }

    /// Forward a deposit to the payment receiver.
    ///
    /// `custodian` is the contract address. For native deposits the attached
    /// value must already be held by it; the excess over `amount` goes back
    /// to the caller. Token deposits are pulled from the caller and must not
    /// carry native value.
    #[allow(clippy::too_many_arguments)]
    pub fn deposit<B: Bank + ?Sized>(
        &mut self,
        bank: &mut B,
        registry: &AssetRegistry,
        custodian: &Address,
        call: &CallContext,
        asset: AssetId,
        on_behalf_of: Address,
        amount: Amount,
    ) -> Result<DepositToken, DepositError> {
        if !registry.is_available(&asset) {
            return Err(DepositError::AssetNotAllowed { asset });
        }

        let forwarded = self
            .total_forwarded(&asset)
            .checked_add(amount)
            .ok_or(DepositError::Overflow)?;
        let deposit_count = self
            .deposit_count
            .checked_add(1)
            .ok_or(DepositError::Overflow)?;

        match asset.kind() {
            AssetKind::Native => {
                let excess = call.value.checked_sub(amount).ok_or(
                    DepositError::InsufficientPaid {
                        required: amount,
                        paid: call.value,
                    },
                )?;
                asset.transfer_out(bank, custodian, &self.payment_receiver, amount)?;
                if !excess.is_zero() {
                    asset.transfer_out(bank, custodian, &call.caller, excess)?;
                }
            }
            AssetKind::Token(_) => {
                if !call.value.is_zero() {
                    return Err(DepositError::InvalidMethod);
                }
                asset.transfer_in(bank, &call.caller, custodian, amount)?;
                asset.transfer_out(bank, custodian, &self.payment_receiver, amount)?;
            }
        }

        self.forwarded.insert(asset, forwarded);
        self.deposit_count = deposit_count;

        Ok(DepositToken {
            player: on_behalf_of,
            asset,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::InMemoryBank;

    const COIN: u128 = 1_000_000_000_000_000_000;

    fn contract() -> Address {
        Address::repeat_byte(0xc0)
    }

    fn receiver() -> Address {
        Address::repeat_byte(0x5e)
    }

    fn player() -> Address {
        Address::repeat_byte(0x01)
    }

    fn token() -> AssetId {
        AssetId::token(Address::repeat_byte(0x70))
    }

    fn setup() -> (DepositLedger, InMemoryBank, AssetRegistry) {
        let mut registry = AssetRegistry::new();
        registry.add(AssetId::NATIVE, Amount::ZERO).unwrap();
        registry.add(token(), Amount::new(COIN)).unwrap();
        (DepositLedger::new(receiver()), InMemoryBank::new(), registry)
    }

    /// Native value attached to a call lands in the contract before the
    /// deposit logic runs.
    fn attach(bank: &mut InMemoryBank, value: u128) -> CallContext {
        bank.mint(&AssetId::NATIVE, &contract(), Amount::new(value))
            .unwrap();
        CallContext::new(player()).with_value(Amount::new(value))
    }

    #[test]
    fn test_native_deposit_forwards_and_refunds_excess() {
        let (mut ledger, mut bank, registry) = setup();
        let call = attach(&mut bank, 3 * COIN);

        let event = ledger
            .deposit(
                &mut bank,
                &registry,
                &contract(),
                &call,
                AssetId::NATIVE,
                player(),
                Amount::new(2 * COIN),
            )
            .unwrap();

        assert_eq!(event.amount, Amount::new(2 * COIN));
        assert_eq!(
            bank.balance_of(&AssetId::NATIVE, &receiver()),
            Amount::new(2 * COIN)
        );
        assert_eq!(bank.balance_of(&AssetId::NATIVE, &player()), Amount::new(COIN));
        assert_eq!(bank.balance_of(&AssetId::NATIVE, &contract()), Amount::ZERO);
        assert_eq!(ledger.total_forwarded(&AssetId::NATIVE), Amount::new(2 * COIN));
        assert_eq!(ledger.deposit_count(), 1);
    }

    #[test]
    fn test_native_deposit_underpaid() {
        let (mut ledger, mut bank, registry) = setup();
        let call = attach(&mut bank, COIN);
        let err = ledger
            .deposit(
                &mut bank,
                &registry,
                &contract(),
                &call,
                AssetId::NATIVE,
                player(),
                Amount::new(2 * COIN),
            )
            .unwrap_err();
        assert_eq!(
            err,
            DepositError::InsufficientPaid {
                required: Amount::new(2 * COIN),
                paid: Amount::new(COIN)
            }
        );
        assert_eq!(ledger.deposit_count(), 0);
    }

    #[test]
    fn test_token_deposit_with_value_is_invalid() {
        let (mut ledger, mut bank, registry) = setup();
        let call = attach(&mut bank, 1);
        let err = ledger
            .deposit(
                &mut bank,
                &registry,
                &contract(),
                &call,
                token(),
                player(),
                Amount::new(COIN),
            )
            .unwrap_err();
        assert_eq!(err, DepositError::InvalidMethod);
    }

    #[test]
    fn test_token_deposit_passes_through() {
        let (mut ledger, mut bank, registry) = setup();
        let token_addr = token().address();
        bank.mint(&token(), &player(), Amount::new(5 * COIN)).unwrap();
        bank.approve(&token_addr, &player(), &contract(), Amount::new(2 * COIN))
            .unwrap();

        let beneficiary = Address::repeat_byte(0x0b);
        let event = ledger
            .deposit(
                &mut bank,
                &registry,
                &contract(),
                &CallContext::new(player()),
                token(),
                beneficiary,
                Amount::new(2 * COIN),
            )
            .unwrap();

        assert_eq!(event.player, beneficiary);
        assert_eq!(bank.balance_of(&token(), &receiver()), Amount::new(2 * COIN));
        assert_eq!(bank.balance_of(&token(), &player()), Amount::new(3 * COIN));
        assert_eq!(bank.balance_of(&token(), &contract()), Amount::ZERO);
    }

    #[test]
    fn test_token_deposit_without_approval_fails() {
        let (mut ledger, mut bank, registry) = setup();
        bank.mint(&token(), &player(), Amount::new(COIN)).unwrap();
        let err = ledger
            .deposit(
                &mut bank,
                &registry,
                &contract(),
                &CallContext::new(player()),
                token(),
                player(),
                Amount::new(COIN),
            )
            .unwrap_err();
        assert!(matches!(err, DepositError::Transfer(_)));
    }

    #[test]
    fn test_deposit_ignores_minimum() {
        let (mut ledger, mut bank, registry) = setup();
        let token_addr = token().address();
        bank.mint(&token(), &player(), Amount::new(1)).unwrap();
        bank.approve(&token_addr, &player(), &contract(), Amount::new(1))
            .unwrap();
        assert!(ledger
            .deposit(
                &mut bank,
                &registry,
                &contract(),
                &CallContext::new(player()),
                token(),
                player(),
                Amount::new(1),
            )
            .is_ok());
    }

    #[test]
    fn test_unlisted_asset_rejected() {
        let (mut ledger, mut bank, _) = setup();
        let err = ledger
            .deposit(
                &mut bank,
                &AssetRegistry::new(),
                &contract(),
                &CallContext::new(player()),
                token(),
                player(),
                Amount::new(1),
            )
            .unwrap_err();
        assert_eq!(err, DepositError::AssetNotAllowed { asset: token() });
    }
}
