//! Asset whitelist
//!
//! Every asset has a configuration record. Unknown assets read as the
//! default record (not available, zero minimum), and removal resets an
//! asset back to that default rather than forgetting it.

use escrow_types::asset::AssetId;
use escrow_types::numeric::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::RegistryError;

/// Per-asset configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub is_available: bool,
    /// Minimum amount accepted for a withdrawal request
    pub min_amount: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRegistry {
    assets: BTreeMap<AssetId, AssetConfig>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whitelist `asset` with the given minimum.
    pub fn add(&mut self, asset: AssetId, min_amount: Amount) -> Result<(), RegistryError> {
        if self.is_available(&asset) {
            return Err(RegistryError::AlreadyExists { asset });
        }
        self.assets.insert(
            asset,
            AssetConfig {
                is_available: true,
                min_amount,
            },
        );
        Ok(())
    }

    /// Remove `asset` from the whitelist, resetting its minimum to zero.
    pub fn remove(&mut self, asset: AssetId) -> Result<(), RegistryError> {
        if !self.is_available(&asset) {
            return Err(RegistryError::NotFound { asset });
        }
        self.assets.remove(&asset);
        Ok(())
    }

    /// Overwrite the minimum of `asset`. Does not require the asset to be
    /// whitelisted and leaves its availability untouched.
    pub fn update_min_amount(&mut self, asset: AssetId, new_amount: Amount) {
        let entry = self.assets.entry(asset).or_default();
        entry.min_amount = new_amount;
        if !entry.is_available && entry.min_amount.is_zero() {
            self.assets.remove(&asset);
        }
    }

    pub fn check(&self, asset: &AssetId) -> AssetConfig {
        self.assets.get(asset).copied().unwrap_or_default()
    }

    pub fn is_available(&self, asset: &AssetId) -> bool {
        self.check(asset).is_available
    }

    /// Whitelisted assets in key order
    pub fn available_assets(&self) -> Vec<(AssetId, AssetConfig)> {
        self.assets
            .iter()
            .filter(|(_, cfg)| cfg.is_available)
            .map(|(asset, cfg)| (*asset, *cfg))
            .collect()
    }
}
