//! Shared wallet registry
//!
//! Process-wide table of tracked wallets keyed by label. Every change is a
//! merge into the current snapshot taken under the table lock, and each
//! successful change is broadcast to subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::debug;

use crate::{Account, ChainId, WalletState};

const EVENT_CAPACITY: usize = 256;

/// Partial wallet state; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletUpdate {
    pub chain: Option<ChainId>,
    pub accounts: Option<Vec<Account>>,
}

impl WalletUpdate {
    pub fn accounts(accounts: Vec<Account>) -> Self {
        Self {
            chain: None,
            accounts: Some(accounts),
        }
    }

    pub fn chain(chain: ChainId, accounts: Vec<Account>) -> Self {
        Self {
            chain: Some(chain),
            accounts: Some(accounts),
        }
    }
}

impl WalletState {
    fn apply(&mut self, update: WalletUpdate) {
        if let Some(chain) = update.chain {
            self.chain_epoch = self.epoch_for(&chain);
            self.chain = chain;
        }
        if let Some(accounts) = update.accounts {
            self.accounts = accounts;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Updated(WalletState),
    Removed(String),
}

#[derive(Debug, Clone)]
pub struct WalletStore {
    wallets: Arc<Mutex<HashMap<String, WalletState>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for WalletStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            wallets: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Insert or replace a wallet snapshot
    pub fn add_wallet(&self, wallet: WalletState) {
        let mut wallets = self.lock();
        wallets.insert(wallet.label.clone(), wallet.clone());
        self.publish(StoreEvent::Updated(wallet));
    }

    /// Insert a wallet unless one is already tracked under its label.
    ///
    /// Returns `false` (and publishes nothing) on a label clash.
    pub fn insert_wallet(&self, wallet: WalletState) -> bool {
        let mut wallets = self.lock();
        if wallets.contains_key(&wallet.label) {
            return false;
        }
        wallets.insert(wallet.label.clone(), wallet.clone());
        self.publish(StoreEvent::Updated(wallet));
        true
    }

    pub fn get(&self, label: &str) -> Option<WalletState> {
        self.lock().get(label).cloned()
    }

    pub fn wallets(&self) -> Vec<WalletState> {
        self.lock().values().cloned().collect()
    }

    /// Merge `update` into the wallet named `label`.
    ///
    /// Returns `false` (and publishes nothing) if no such wallet is tracked.
    pub fn update_wallet(&self, label: &str, update: WalletUpdate) -> bool {
        self.update_wallet_with(label, |_| (Some(update), ()))
            .is_some()
    }

    /// Read-modify-write against the latest snapshot.
    ///
    /// `f` sees the current state and returns the update to merge (or `None`
    /// to leave the wallet alone) together with a value handed back to the
    /// caller. Returns `None` if no wallet is tracked under `label`.
    pub fn update_wallet_with<R>(
        &self,
        label: &str,
        f: impl FnOnce(&WalletState) -> (Option<WalletUpdate>, R),
    ) -> Option<R> {
        let mut wallets = self.lock();
        let wallet = wallets.get_mut(label)?;

        let (update, result) = f(wallet);
        if let Some(update) = update {
            wallet.apply(update);
            let snapshot = wallet.clone();
            self.publish(StoreEvent::Updated(snapshot));
        }

        Some(result)
    }

    pub fn remove_wallet(&self, label: &str) -> Option<WalletState> {
        let removed = self.lock().remove(label);
        if removed.is_some() {
            self.publish(StoreEvent::Removed(label.to_string()));
        }
        removed
    }

    fn publish(&self, event: StoreEvent) {
        if self.events.send(event).is_err() {
            debug!("no store subscribers");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WalletState>> {
        // state is replaced whole under the lock, so a poisoned table is still consistent
        self.wallets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
