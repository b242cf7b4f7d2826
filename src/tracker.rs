//! Per-wallet tracking
//!
//! A tracked wallet listens to its provider's `accountsChanged` and
//! `chainChanged` events, folds each one into the shared store and starts
//! enrichment where the event introduced something new. Tracking ends when
//! the provider reports no account or when a disconnect for the wallet's
//! label is requested; both listeners are removed and the wallet leaves the
//! store, after which nothing more is published for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{self, EventStream};
use crate::enrich::{ChainVisit, EnrichmentClient};
use crate::provider::{self, Provider, ACCOUNTS_CHANGED, CHAIN_CHANGED};
use crate::reconcile::{reconcile_accounts, reconcile_chain, AccountChange, ChainAction};
use crate::store::{WalletStore, WalletUpdate};
use crate::{Account, ChainId, ProviderError, WalletState};

const DISCONNECT_CAPACITY: usize = 64;

/// Broadcast of external disconnect requests, by wallet label
#[derive(Debug, Clone)]
pub struct Disconnects {
    tx: broadcast::Sender<String>,
}

impl Default for Disconnects {
    fn default() -> Self {
        Self::new()
    }
}

impl Disconnects {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DISCONNECT_CAPACITY);
        Self { tx }
    }

    pub fn disconnect(&self, label: &str) {
        if self.tx.send(label.to_string()).is_err() {
            debug!(label, "disconnect requested with no tracked wallets");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

struct Shared {
    label: String,
    provider: Arc<dyn Provider>,
    store: WalletStore,
    active: AtomicBool,
    closing: Mutex<()>,
    stop: watch::Sender<bool>,
}

impl Shared {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Active -> Disconnected. Only the first caller does anything.
    ///
    /// The wallet leaves the store before `active` drops, so once the tracker
    /// reads inactive no snapshot for it can still be published.
    async fn shutdown(&self, reason: &str) {
        {
            let _closing = self.closing.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.is_active() {
                return;
            }
            self.store.remove_wallet(&self.label);
            self.active.store(false, Ordering::SeqCst);
        }

        info!(label = %self.label, reason, "wallet disconnected");
        self.stop.send_replace(true);

        if self.provider.can_disconnect() {
            if let Err(e) = self.provider.disconnect().await {
                warn!(label = %self.label, error = %e, "provider disconnect failed");
            }
        }
    }
}

/// What a handled event asks for once the store has been updated
enum Followup {
    Nothing,
    Disconnect,
    Enrich {
        visit: ChainVisit,
        addresses: Vec<String>,
    },
}

/// Handle to a tracked wallet
pub struct TrackerHandle {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl TrackerHandle {
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Stop tracking; safe to call more than once
    pub async fn disconnect(&self) {
        self.shared.shutdown("disconnect requested").await;
    }

    /// Wait until tracking has ended
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "tracker task failed");
            }
        }
    }
}

/// Start tracking the wallet `label`, which must already be in the store.
///
/// Listeners are registered before this returns.
pub fn track(
    label: &str,
    provider: Arc<dyn Provider>,
    enrichment: EnrichmentClient,
    disconnects: &Disconnects,
) -> TrackerHandle {
    let (stop, stop_rx) = watch::channel(false);
    let shared = Arc::new(Shared {
        label: label.to_string(),
        provider: provider.clone(),
        store: enrichment.store().clone(),
        active: AtomicBool::new(true),
        closing: Mutex::new(()),
        stop,
    });

    let accounts = bridge::subscribe(
        provider.clone(),
        ACCOUNTS_CHANGED,
        stop_rx.clone(),
        decode_accounts,
    );
    let chains = bridge::subscribe(provider, CHAIN_CHANGED, stop_rx.clone(), decode_chain);

    let tasks = vec![
        tokio::spawn(watch_accounts(shared.clone(), enrichment.clone(), accounts)),
        tokio::spawn(watch_chain(shared.clone(), enrichment, chains)),
        tokio::spawn(watch_disconnects(
            shared.clone(),
            disconnects.subscribe(),
            stop_rx,
        )),
    ];

    debug!(label, "tracking wallet");
    TrackerHandle { shared, tasks }
}

/// Connect to `provider`, publish its initial state under `label`, start
/// tracking and enrich the reported accounts.
///
/// Fails with [`ProviderError::AlreadyConnected`] while another wallet is
/// tracked under `label`; that wallet is left untouched.
pub async fn connect_wallet(
    label: &str,
    provider: Arc<dyn Provider>,
    enrichment: EnrichmentClient,
    disconnects: &Disconnects,
) -> Result<TrackerHandle, ProviderError> {
    if enrichment.store().get(label).is_some() {
        return Err(ProviderError::AlreadyConnected(label.to_string()));
    }

    let reported = provider::request_accounts(provider.as_ref()).await?;
    let chain = provider::get_chain_id(provider.as_ref()).await?;

    let mut addresses: Vec<String> = Vec::with_capacity(reported.len());
    for address in reported {
        if !address.is_empty() && !addresses.contains(&address) {
            addresses.push(address);
        }
    }
    if addresses.is_empty() {
        return Err(ProviderError::NoAccounts);
    }

    let wallet = WalletState::new(label, chain.clone(), addresses.iter().map(Account::new).collect());
    let visit = ChainVisit::current(&wallet);
    // the label may have been taken while the provider was prompting
    if !enrichment.store().insert_wallet(wallet) {
        return Err(ProviderError::AlreadyConnected(label.to_string()));
    }
    info!(label, %chain, primary = %addresses[0], "wallet connected");

    let handle = track(label, provider, enrichment.clone(), disconnects);
    enrichment.enrich(label, &visit, addresses);

    Ok(handle)
}

async fn watch_accounts(
    shared: Arc<Shared>,
    enrichment: EnrichmentClient,
    mut events: EventStream<Option<String>>,
) {
    while let Some(reported) = events.next().await {
        if !shared.is_active() {
            break;
        }

        let followup = shared.store.update_wallet_with(&shared.label, |wallet| {
            match reconcile_accounts(&wallet.accounts, reported.as_deref()) {
                AccountChange::Disconnected => (None, Followup::Disconnect),
                AccountChange::Reordered(accounts) if accounts == wallet.accounts => {
                    (None, Followup::Nothing)
                }
                AccountChange::Reordered(accounts) => {
                    (Some(WalletUpdate::accounts(accounts)), Followup::Nothing)
                }
                AccountChange::Added { accounts, address } => (
                    Some(WalletUpdate::accounts(accounts)),
                    Followup::Enrich {
                        visit: ChainVisit::current(wallet),
                        addresses: vec![address],
                    },
                ),
            }
        });

        if !follow(&shared, &enrichment, followup).await {
            break;
        }
    }
    events.close();
}

async fn watch_chain(
    shared: Arc<Shared>,
    enrichment: EnrichmentClient,
    mut events: EventStream<ChainId>,
) {
    while let Some(reported) = events.next().await {
        if !shared.is_active() {
            break;
        }

        let followup = shared.store.update_wallet_with(&shared.label, |wallet| {
            match reconcile_chain(&wallet.chain, &reported, &wallet.accounts) {
                ChainAction::Unchanged => (None, Followup::Nothing),
                ChainAction::Reset { chain, accounts } => {
                    let addresses = accounts.iter().map(|a| a.address.clone()).collect();
                    let visit = ChainVisit::new(chain.clone(), wallet.epoch_for(&chain));
                    (
                        Some(WalletUpdate::chain(chain, accounts)),
                        Followup::Enrich { visit, addresses },
                    )
                }
            }
        });

        if !follow(&shared, &enrichment, followup).await {
            break;
        }
    }
    events.close();
}

/// Act on a handled event; `false` once tracking is over
async fn follow(shared: &Shared, enrichment: &EnrichmentClient, followup: Option<Followup>) -> bool {
    match followup {
        None => {
            shared.shutdown("wallet no longer in store").await;
            false
        }
        Some(Followup::Disconnect) => {
            shared.shutdown("provider reported no accounts").await;
            false
        }
        Some(Followup::Nothing) => true,
        Some(Followup::Enrich { visit, addresses }) => {
            enrichment.enrich(&shared.label, &visit, addresses);
            true
        }
    }
}

async fn watch_disconnects(
    shared: Arc<Shared>,
    mut requests: broadcast::Receiver<String>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            return;
        }

        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            request = requests.recv() => match request {
                Ok(label) if label == shared.label => {
                    shared.shutdown("external disconnect").await;
                    return;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(label = %shared.label, skipped, "missed disconnect requests");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

/// `accountsChanged` carries an array whose first entry is the primary address.
///
/// Only an empty list, an empty address or `null` means no account; a first
/// entry that is not a string is undecodable.
fn decode_accounts(payload: Value) -> Option<Option<String>> {
    match payload {
        Value::Array(addresses) => match addresses.first() {
            None => Some(None),
            Some(Value::String(address)) => Some(Some(address.clone()).filter(|address| !address.is_empty())),
            Some(_) => None,
        },
        Value::String(address) => Some(Some(address).filter(|address| !address.is_empty())),
        Value::Null => Some(None),
        _ => None,
    }
}

fn decode_chain(payload: Value) -> Option<ChainId> {
    match payload {
        Value::String(chain) if !chain.is_empty() => Some(chain),
        Value::Number(n) => n.as_u64().map(|id| format!("0x{:x}", id)),
        _ => None,
    }
}
