//! Atomic execution against contract and bank
//!
//! A [`Ledger`] pairs one [`PaymentContract`] with the [`Bank`] holding
//! every balance, and applies [`Operation`]s one at a time. Each operation
//! either commits in full or leaves both untouched.
//!
//! [`Ledger::stage`] applies an operation but keeps its undo record open,
//! so a caller can make the commit depend on a side effect such as a
//! journal write. Dropping the [`Staged`] handle rolls it back.

use escrow_types::asset::AssetId;
use escrow_types::ids::{Address, RequestId};
use escrow_types::numeric::Amount;
use serde::{Deserialize, Serialize};

use crate::bank::{Bank, Checkpointed, InMemoryBank};
use crate::contract::{CallContext, ContractConfig, PaymentContract};
use crate::errors::ContractError;
use crate::events::ContractEvent;

/// Every state-changing call the ledger accepts.
///
/// `Transfer`, `Approve` and `Mint` act on the bank directly and stand in
/// for the token and native-currency plumbing around the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    AddQuoteToken {
        asset: AssetId,
        min_amount: Amount,
    },
    RemoveQuoteToken {
        asset: AssetId,
    },
    UpdateMinAmount {
        asset: AssetId,
        new_amount: Amount,
    },
    UpdatePaymentReceiver {
        new_receiver: Address,
    },
    TransferOwnership {
        new_owner: Address,
    },
    Deposit {
        asset: AssetId,
        on_behalf_of: Address,
        amount: Amount,
        value: Amount,
    },
    WithdrawRequest {
        asset: AssetId,
        amount: Amount,
        value: Amount,
    },
    ConfirmRequest {
        id: RequestId,
    },
    RejectRequest {
        id: RequestId,
    },
    Transfer {
        asset: AssetId,
        to: Address,
        amount: Amount,
    },
    Approve {
        token: Address,
        spender: Address,
        amount: Amount,
    },
    Mint {
        asset: AssetId,
        to: Address,
        amount: Amount,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddQuoteToken { .. } => "addQuoteToken",
            Operation::RemoveQuoteToken { .. } => "removeQuoteToken",
            Operation::UpdateMinAmount { .. } => "updateMinAmount",
            Operation::UpdatePaymentReceiver { .. } => "updatePaymentReceiver",
            Operation::TransferOwnership { .. } => "transferOwnership",
            Operation::Deposit { .. } => "deposit",
            Operation::WithdrawRequest { .. } => "withdrawRequest",
            Operation::ConfirmRequest { .. } => "confirmRequest",
            Operation::RejectRequest { .. } => "rejectRequest",
            Operation::Transfer { .. } => "transfer",
            Operation::Approve { .. } => "approve",
            Operation::Mint { .. } => "mint",
        }
    }
}

/// Outcome of a committed operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub events: Vec<ContractEvent>,
}

impl Receipt {
    /// Identifier allocated by a `WithdrawRequest` operation
    pub fn request_id(&self) -> Option<RequestId> {
        self.events.iter().find_map(|e| match e {
            ContractEvent::WithdrawRequest(r) => Some(r.request_id),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger<B = InMemoryBank> {
    contract: PaymentContract,
    bank: B,
}

impl Ledger<InMemoryBank> {
    pub fn deploy(address: Address, deployer: Address, config: ContractConfig) -> Self {
        Self::with_bank(
            PaymentContract::deploy(address, deployer, config),
            InMemoryBank::new(),
        )
    }
}

impl<B: Bank + Checkpointed> Ledger<B> {
    pub fn with_bank(contract: PaymentContract, bank: B) -> Self {
        Self { contract, bank }
    }

    pub fn contract(&self) -> &PaymentContract {
        &self.contract
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount {
        self.bank.balance_of(asset, holder)
    }

    /// Apply `op` on behalf of `caller`. On error nothing changes.
    pub fn execute(&mut self, caller: Address, op: &Operation) -> Result<Receipt, ContractError> {
        self.stage(caller, op).map(Staged::commit)
    }

    /// Apply `op` and hold it open until [`Staged::commit`]. On error, or
    /// when the handle is dropped uncommitted, nothing changes.
    pub fn stage(&mut self, caller: Address, op: &Operation) -> Result<Staged<'_, B>, ContractError> {
        let events_before = self.contract.events().len();
        self.contract.checkpoint();
        self.bank.checkpoint();

        let result = self.apply(caller, op);
        let staged = Staged {
            ledger: self,
            events_before,
            committed: false,
        };
        // on error the handle drops here and rolls back
        result.map(|()| staged)
    }

    fn apply(&mut self, caller: Address, op: &Operation) -> Result<(), ContractError> {
        let contract = &mut self.contract;
        let bank = &mut self.bank;
        match *op {
            Operation::AddQuoteToken { asset, min_amount } => {
                contract.add_quote_token(&caller, asset, min_amount)
            }
            Operation::RemoveQuoteToken { asset } => contract.remove_quote_token(&caller, asset),
            Operation::UpdateMinAmount { asset, new_amount } => {
                contract.update_min_amount(&caller, asset, new_amount)
            }
            Operation::UpdatePaymentReceiver { new_receiver } => {
                contract.update_payment_receiver(&caller, new_receiver)
            }
            Operation::TransferOwnership { new_owner } => {
                contract.transfer_ownership(&caller, new_owner)
            }
            Operation::Deposit {
                asset,
                on_behalf_of,
                amount,
                value,
            } => {
                let call = CallContext::new(caller).with_value(value);
                contract
                    .deposit(bank, &call, asset, on_behalf_of, amount)
                    .map(|_| ())
            }
            Operation::WithdrawRequest {
                asset,
                amount,
                value,
            } => {
                let call = CallContext::new(caller).with_value(value);
                contract
                    .withdraw_request(bank, &call, asset, amount)
                    .map(|_| ())
            }
            Operation::ConfirmRequest { id } => {
                contract.confirm_request(bank, &caller, id).map(|_| ())
            }
            Operation::RejectRequest { id } => contract.reject_request(&caller, id).map(|_| ()),
            Operation::Transfer { asset, to, amount } => {
                bank.transfer(&asset, &caller, &to, amount)?;
                Ok(())
            }
            Operation::Approve {
                token,
                spender,
                amount,
            } => {
                bank.approve(&token, &caller, &spender, amount)?;
                Ok(())
            }
            Operation::Mint { asset, to, amount } => {
                bank.mint(&asset, &to, amount)?;
                Ok(())
            }
        }
    }
}

/// An applied operation awaiting commit.
#[must_use = "dropping a staged operation rolls it back"]
pub struct Staged<'a, B: Bank + Checkpointed> {
    ledger: &'a mut Ledger<B>,
    events_before: usize,
    committed: bool,
}

impl<B: Bank + Checkpointed> Staged<'_, B> {
    /// Events the operation emitted so far
    pub fn events(&self) -> &[ContractEvent] {
        &self.ledger.contract.events()[self.events_before..]
    }

    pub fn commit(mut self) -> Receipt {
        self.ledger.contract.commit();
        self.ledger.bank.commit();
        self.committed = true;
        Receipt {
            events: self.events().to_vec(),
        }
    }
}

impl<B: Bank + Checkpointed> Drop for Staged<'_, B> {
    fn drop(&mut self) {
        if !self.committed {
            self.ledger.contract.rollback();
            self.ledger.bank.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COIN: u128 = 1_000_000_000_000_000_000;
    const FEE: u128 = 20_000_000_000_000_000;

    fn owner() -> Address {
        Address::repeat_byte(0x01)
    }

    fn operator() -> Address {
        Address::repeat_byte(0x02)
    }

    fn player() -> Address {
        Address::repeat_byte(0x04)
    }

    fn ledger() -> Ledger {
        Ledger::deploy(
            Address::repeat_byte(0xc0),
            owner(),
            ContractConfig {
                payment_receiver: Address::repeat_byte(0x5e),
                request_fee: Amount::new(FEE),
                operator: operator(),
            },
        )
    }

    #[test]
    fn test_failed_call_reverts_attached_value() {
        let mut ledger = ledger();
        ledger
            .execute(
                owner(),
                &Operation::Mint {
                    asset: AssetId::NATIVE,
                    to: player(),
                    amount: Amount::new(COIN),
                },
            )
            .unwrap();
        let before = ledger.clone();

        // Native is not whitelisted: the value transfer into the contract
        // happens first and must be undone.
        let err = ledger
            .execute(
                player(),
                &Operation::Deposit {
                    asset: AssetId::NATIVE,
                    on_behalf_of: player(),
                    amount: Amount::new(COIN),
                    value: Amount::new(COIN),
                },
            )
            .unwrap_err();

        assert_eq!(err.code(), "ASSET_NOT_ALLOWED");
        assert_eq!(ledger, before);
        assert_eq!(ledger.balance_of(&AssetId::NATIVE, &player()), Amount::new(COIN));
    }

    #[test]
    fn test_receipt_carries_new_events_only() {
        let mut ledger = ledger();
        let receipt = ledger
            .execute(
                owner(),
                &Operation::AddQuoteToken {
                    asset: AssetId::NATIVE,
                    min_amount: Amount::ZERO,
                },
            )
            .unwrap();
        assert!(receipt.events.is_empty());

        ledger
            .execute(
                owner(),
                &Operation::Mint {
                    asset: AssetId::NATIVE,
                    to: player(),
                    amount: Amount::new(2 * FEE),
                },
            )
            .unwrap();

        for expected in 1..=2u64 {
            let receipt = ledger
                .execute(
                    player(),
                    &Operation::WithdrawRequest {
                        asset: AssetId::NATIVE,
                        amount: Amount::new(1),
                        value: Amount::new(FEE),
                    },
                )
                .unwrap();
            assert_eq!(receipt.events.len(), 1);
            assert_eq!(receipt.request_id(), Some(RequestId::new(expected)));
        }
    }

    #[test]
    fn test_failed_confirm_keeps_request_pending() {
        let mut ledger = ledger();
        let token = AssetId::token(Address::repeat_byte(0x70));
        ledger
            .execute(
                owner(),
                &Operation::AddQuoteToken {
                    asset: token,
                    min_amount: Amount::ZERO,
                },
            )
            .unwrap();
        ledger
            .execute(
                owner(),
                &Operation::Mint {
                    asset: AssetId::NATIVE,
                    to: player(),
                    amount: Amount::new(FEE),
                },
            )
            .unwrap();
        ledger
            .execute(
                player(),
                &Operation::WithdrawRequest {
                    asset: token,
                    amount: Amount::new(COIN),
                    value: Amount::new(FEE),
                },
            )
            .unwrap();

        // contract holds no tokens yet
        let err = ledger
            .execute(operator(), &Operation::ConfirmRequest { id: RequestId::new(1) })
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        assert!(ledger.contract().request_status(RequestId::new(1)).is_pending);
        assert_eq!(ledger.contract().pending_requests(), vec![RequestId::new(1)]);
    }

    #[test]
    fn test_bank_operations_use_caller() {
        let mut ledger = ledger();
        ledger
            .execute(
                owner(),
                &Operation::Mint {
                    asset: AssetId::NATIVE,
                    to: player(),
                    amount: Amount::new(10),
                },
            )
            .unwrap();
        ledger
            .execute(
                player(),
                &Operation::Transfer {
                    asset: AssetId::NATIVE,
                    to: operator(),
                    amount: Amount::new(4),
                },
            )
            .unwrap();
        assert_eq!(ledger.balance_of(&AssetId::NATIVE, &player()), Amount::new(6));
        assert_eq!(ledger.balance_of(&AssetId::NATIVE, &operator()), Amount::new(4));
    }

    #[test]
    fn test_operation_bincode_roundtrip() {
        let op = Operation::Deposit {
            asset: AssetId::NATIVE,
            on_behalf_of: player(),
            amount: Amount::new(COIN),
            value: Amount::new(COIN),
        };
        let bytes = bincode::serialize(&(player(), op.clone())).unwrap();
        let (caller, restored): (Address, Operation) = bincode::deserialize(&bytes).unwrap();
        assert_eq!(caller, player());
        assert_eq!(restored, op);
        assert_eq!(restored.name(), "deposit");
    }

    #[test]
    fn test_ledger_json_roundtrip() {
        let mut ledger = ledger();
        ledger
            .execute(
                owner(),
                &Operation::AddQuoteToken {
                    asset: AssetId::NATIVE,
                    min_amount: Amount::new(3),
                },
            )
            .unwrap();
        let json = serde_json::to_string(&ledger).unwrap();
        let restored: Ledger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ledger);
    }

    fn native_request() -> Operation {
        Operation::WithdrawRequest {
            asset: AssetId::NATIVE,
            amount: Amount::new(1),
            value: Amount::new(FEE),
        }
    }

    fn funded() -> Ledger {
        let mut ledger = ledger();
        ledger
            .execute(
                owner(),
                &Operation::AddQuoteToken {
                    asset: AssetId::NATIVE,
                    min_amount: Amount::ZERO,
                },
            )
            .unwrap();
        ledger
            .execute(
                owner(),
                &Operation::Mint {
                    asset: AssetId::NATIVE,
                    to: player(),
                    amount: Amount::new(COIN),
                },
            )
            .unwrap();
        ledger
    }

    #[test]
    fn test_dropped_stage_rolls_back() {
        let mut ledger = funded();
        ledger.execute(player(), &native_request()).unwrap();
        let before = ledger.clone();

        let staged = ledger.stage(player(), &native_request()).unwrap();
        assert_eq!(staged.events().len(), 1);
        drop(staged);

        assert_eq!(ledger, before);
        assert_eq!(ledger.contract().last_request_id(), RequestId::new(1));
        assert_eq!(ledger.contract().events().len(), 1);
    }

    #[test]
    fn test_committed_stage_is_not_rolled_back_later() {
        let mut ledger = funded();
        let receipt = ledger.stage(player(), &native_request()).unwrap().commit();
        assert_eq!(receipt.request_id(), Some(RequestId::new(1)));
        let after = ledger.clone();

        // a later failure must only undo its own changes
        ledger
            .execute(operator(), &Operation::ConfirmRequest { id: RequestId::new(1) })
            .unwrap_err();
        assert_eq!(ledger, after);
        assert_eq!(ledger.contract().pending_requests(), vec![RequestId::new(1)]);
    }

    #[test]
    fn test_long_run_of_requests_keeps_every_event() {
        let mut ledger = funded();
        let rounds = 2_000u64;
        ledger
            .execute(
                owner(),
                &Operation::Mint {
                    asset: AssetId::NATIVE,
                    to: player(),
                    amount: Amount::new(FEE * u128::from(rounds)),
                },
            )
            .unwrap();
        for i in 1..=rounds {
            let receipt = ledger.execute(player(), &native_request()).unwrap();
            assert_eq!(receipt.request_id(), Some(RequestId::new(i)));
            if i % 2 == 0 {
                ledger
                    .execute(owner(), &Operation::RejectRequest { id: RequestId::new(i) })
                    .unwrap_err();
            }
        }
        assert_eq!(ledger.contract().events().len(), rounds as usize);
        assert_eq!(ledger.contract().pending_requests().len(), rounds as usize);
    }
}
