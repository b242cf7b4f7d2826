//! Wallet Sync Library
//!
//! This library keeps the observable state of a connected wallet (accounts,
//! active chain, balances and ENS names) in step with the events its
//! provider emits and with lookups against the chain's RPC endpoint.

pub mod bridge;
pub mod config;
pub mod enrich;
pub mod ens;
pub mod error;
pub mod provider;
pub mod reconcile;
pub mod rpc;
pub mod store;
pub mod tracker;

use serde::{Deserialize, Serialize};

pub use error::ProviderError;

/// Hex chain identifier as reported by the provider, e.g. `0x1`
pub type ChainId = String;

/// Native currency balance of an account, already scaled to whole units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceInfo {
    pub amount: String,
    pub denomination: String,
}

impl BalanceInfo {
    pub fn new(amount: String, denomination: String) -> Self {
        Self {
            amount,
            denomination,
        }
    }
}

/// Reverse-resolved ENS identity of an account.
///
/// Text records are looked up on demand through [`EnsIdentity::text`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnsIdentity {
    pub name: String,
    pub content_hash: Option<String>,
    /// Resolver contract the name points at
    pub resolver: String,
}

/// One account reported by a wallet, plus whatever enrichment has landed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub address: String,
    pub ens: Option<EnsIdentity>,
    pub balance: Option<BalanceInfo>,
}

impl Account {
    /// Create an account with no enrichment yet
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ens: None,
            balance: None,
        }
    }

    /// Same address, enrichment dropped
    pub fn cleared(&self) -> Self {
        Self::new(self.address.clone())
    }
}

/// Snapshot of a tracked wallet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletState {
    pub label: String,
    pub chain: ChainId,
    pub accounts: Vec<Account>,
    /// Bumped on every chain switch, so revisits of a chain are told apart
    #[serde(default)]
    pub chain_epoch: u64,
}

impl WalletState {
    pub fn new(label: impl Into<String>, chain: impl Into<ChainId>, accounts: Vec<Account>) -> Self {
        Self {
            label: label.into(),
            chain: chain.into(),
            accounts,
            chain_epoch: 0,
        }
    }

    /// Epoch the wallet will be in once it is on `chain`
    pub fn epoch_for(&self, chain: &str) -> u64 {
        if self.chain == chain {
            self.chain_epoch
        } else {
            self.chain_epoch + 1
        }
    }

    /// The account the provider currently reports as active
    pub fn primary(&self) -> Option<&Account> {
        self.accounts.first()
    }

    pub fn account(&self, address: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| account.address == address)
    }
}
