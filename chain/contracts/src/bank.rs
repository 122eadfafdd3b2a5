//! Asset custody and movement
//!
//! The contract never holds balances itself; it asks a [`Bank`] to move
//! value between addresses. [`InMemoryBank`] keeps native and token
//! balances side by side, with ERC-20 style allowances for tokens.
//!
//! [`AssetFlow`] is the single place that decides how an asset enters or
//! leaves the contract: native value is pushed by the payer, tokens are
//! pulled by the contract against an allowance.

use escrow_types::asset::{AssetId, AssetKind};
use escrow_types::ids::Address;
use escrow_types::numeric::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::TransferError;

/// Balance and allowance operations over native currency and tokens.
pub trait Bank {
    fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount;

    fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Amount;

    /// Move `amount` of `asset` from `from` to `to`.
    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Set the allowance `spender` may pull from `owner`. Replaces any
    /// previous allowance.
    fn approve(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Move tokens on behalf of `from`, consuming `spender`'s allowance.
    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Credit new units to `to`.
    fn mint(&mut self, asset: &AssetId, to: &Address, amount: Amount) -> Result<(), TransferError>;
}

/// State whose changes since a checkpoint can be undone.
///
/// Implementations record only what they overwrite, so the cost of a
/// checkpoint is bounded by the work done after it, not by the size of
/// the state.
pub trait Checkpointed {
    /// Start recording changes. Any open checkpoint is committed first.
    fn checkpoint(&mut self);

    /// Keep every change made since the checkpoint.
    fn commit(&mut self);

    /// Undo every change made since the checkpoint.
    fn rollback(&mut self);
}

/// Previous value of an entry overwritten under a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BankChange {
    Balance {
        asset: AssetId,
        holder: Address,
        previous: Amount,
    },
    Allowance {
        token: Address,
        owner: Address,
        spender: Address,
        previous: Amount,
    },
}

/// Balances held in memory, serializable as part of a snapshot.
///
/// Zero balances and allowances are never stored, so two banks holding
/// the same amounts compare equal regardless of history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryBank {
    balances: BTreeMap<AssetId, BTreeMap<Address, Amount>>,
    /// token -> owner -> spender -> allowance
    allowances: BTreeMap<Address, BTreeMap<Address, BTreeMap<Address, Amount>>>,
    #[serde(skip)]
    undo: Option<Vec<BankChange>>,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all balances of `asset`. `None` on overflow.
    pub fn total_supply(&self, asset: &AssetId) -> Option<Amount> {
        self.balances
            .get(asset)
            .into_iter()
            .flat_map(|holders| holders.values())
            .try_fold(Amount::ZERO, |acc, b| acc.checked_add(*b))
    }

    fn set_balance(&mut self, asset: &AssetId, holder: &Address, amount: Amount) {
        if self.undo.is_some() {
            let change = BankChange::Balance {
                asset: *asset,
                holder: *holder,
                previous: self.balance_of(asset, holder),
            };
            self.record(change);
        }
        self.write_balance(asset, holder, amount);
    }

    fn set_allowance(&mut self, token: &Address, owner: &Address, spender: &Address, amount: Amount) {
        if self.undo.is_some() {
            let change = BankChange::Allowance {
                token: *token,
                owner: *owner,
                spender: *spender,
                previous: self.allowance(token, owner, spender),
            };
            self.record(change);
        }
        self.write_allowance(token, owner, spender, amount);
    }

    fn record(&mut self, change: BankChange) {
        if let Some(undo) = self.undo.as_mut() {
            undo.push(change);
        }
    }

    fn write_balance(&mut self, asset: &AssetId, holder: &Address, amount: Amount) {
        if !amount.is_zero() {
            self.balances.entry(*asset).or_default().insert(*holder, amount);
            return;
        }
        if let Some(holders) = self.balances.get_mut(asset) {
            holders.remove(holder);
            if holders.is_empty() {
                self.balances.remove(asset);
            }
        }
    }

    fn write_allowance(&mut self, token: &Address, owner: &Address, spender: &Address, amount: Amount) {
        if !amount.is_zero() {
            self.allowances
                .entry(*token)
                .or_default()
                .entry(*owner)
                .or_default()
                .insert(*spender, amount);
            return;
        }
        let Some(owners) = self.allowances.get_mut(token) else {
            return;
        };
        if let Some(spenders) = owners.get_mut(owner) {
            spenders.remove(spender);
            if spenders.is_empty() {
                owners.remove(owner);
            }
        }
        if owners.is_empty() {
            self.allowances.remove(token);
        }
    }
}

impl Checkpointed for InMemoryBank {
    fn checkpoint(&mut self) {
        self.undo = Some(Vec::new());
    }

    fn commit(&mut self) {
        self.undo = None;
    }

    fn rollback(&mut self) {
        let Some(changes) = self.undo.take() else {
            return;
        };
        for change in changes.into_iter().rev() {
            match change {
                BankChange::Balance {
                    asset,
                    holder,
                    previous,
                } => self.write_balance(&asset, &holder, previous),
                BankChange::Allowance {
                    token,
                    owner,
                    spender,
                    previous,
                } => self.write_allowance(&token, &owner, &spender, previous),
            }
        }
    }
}

impl Bank for InMemoryBank {
    fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount {
        self.balances
            .get(asset)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(token)
            .and_then(|owners| owners.get(owner))
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let available = self.balance_of(asset, from);
        let remaining =
            available
                .checked_sub(amount)
                .ok_or(TransferError::InsufficientBalance {
                    asset: *asset,
                    holder: *from,
                    required: amount,
                    available,
                })?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;

        self.set_balance(asset, from, remaining);
        self.set_balance(asset, to, credited);
        Ok(())
    }

    fn approve(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        if AssetId::token(*token).is_native() {
            return Err(TransferError::NotAToken);
        }
        self.set_allowance(token, owner, spender, amount);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let asset = AssetId::token(*token);
        if asset.is_native() {
            return Err(TransferError::NotAToken);
        }
        let available = self.allowance(token, from, spender);
        let remaining =
            available
                .checked_sub(amount)
                .ok_or(TransferError::InsufficientAllowance {
                    token: *token,
                    owner: *from,
                    spender: *spender,
                    required: amount,
                    available,
                })?;

        self.transfer(&asset, from, to, amount)?;
        self.set_allowance(token, from, spender, remaining);
        Ok(())
    }

    fn mint(&mut self, asset: &AssetId, to: &Address, amount: Amount) -> Result<(), TransferError> {
        let credited = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        self.set_balance(asset, to, credited);
        Ok(())
    }
}

/// Movement of an asset into and out of a custodian address.
pub trait AssetFlow {
    /// Bring `amount` from `payer` into `custodian`. Tokens are pulled with
    /// the custodian as spender, so the payer must have approved it.
    fn transfer_in<B: Bank + ?Sized>(
        &self,
        bank: &mut B,
        payer: &Address,
        custodian: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Send `amount` held by `custodian` to `recipient`.
    fn transfer_out<B: Bank + ?Sized>(
        &self,
        bank: &mut B,
        custodian: &Address,
        recipient: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

impl AssetFlow for AssetId {
    fn transfer_in<B: Bank + ?Sized>(
        &self,
        bank: &mut B,
        payer: &Address,
        custodian: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        match self.kind() {
            AssetKind::Native => bank.transfer(self, payer, custodian, amount),
            AssetKind::Token(token) => bank.transfer_from(&token, custodian, payer, custodian, amount),
        }
    }

    fn transfer_out<B: Bank + ?Sized>(
        &self,
        bank: &mut B,
        custodian: &Address,
        recipient: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        bank.transfer(self, custodian, recipient, amount)
    }
}
