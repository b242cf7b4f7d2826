//! In-memory provider and scripted enricher shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot, Notify};

use wallet_sync::config::ChainConfig;
use wallet_sync::enrich::{Enricher, EnrichmentClient};
use wallet_sync::provider::{EventHandler, ListenerId, Provider};
use wallet_sync::store::{StoreEvent, WalletStore};
use wallet_sync::{EnsIdentity, ProviderError};

pub const WAIT: Duration = Duration::from_secs(2);
pub const QUIET: Duration = Duration::from_millis(100);

pub const ADDR_A: &str = "0xAAA";
pub const ADDR_B: &str = "0xBBB";

pub fn chains() -> Vec<ChainConfig> {
    vec![
        ChainConfig::new("0x1", "ETH", "Ethereum", Some("https://mainnet.test")),
        ChainConfig::new("0x89", "MATIC", "Polygon", Some("https://polygon.test")),
        ChainConfig::new("0xa", "ETH", "Optimism", None),
    ]
}

pub fn identity(name: &str) -> EnsIdentity {
    EnsIdentity {
        name: name.to_string(),
        content_hash: None,
        resolver: "0x0000000000000000000000000000000000000042".to_string(),
    }
}

/// Provider whose events are fired by the test
pub struct MockProvider {
    listeners: Mutex<HashMap<String, Vec<(ListenerId, EventHandler)>>>,
    next_id: AtomicU64,
    removals: AtomicUsize,
    disconnects: AtomicUsize,
    can_disconnect: bool,
    accounts: Mutex<Vec<String>>,
    chain: Mutex<String>,
    known_chains: Mutex<Vec<String>>,
    requests: Mutex<Vec<(String, Value)>>,
    reject_with: Mutex<Option<ProviderError>>,
}

impl MockProvider {
    pub fn new(accounts: &[&str], chain: &str) -> Arc<Self> {
        Self::build(accounts, chain, false)
    }

    pub fn with_disconnect(accounts: &[&str], chain: &str) -> Arc<Self> {
        Self::build(accounts, chain, true)
    }

    fn build(accounts: &[&str], chain: &str, can_disconnect: bool) -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            removals: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            can_disconnect,
            accounts: Mutex::new(accounts.iter().map(|a| a.to_string()).collect()),
            chain: Mutex::new(chain.to_string()),
            known_chains: Mutex::new(vec!["0x1".to_string(), chain.to_string()]),
            requests: Mutex::new(Vec::new()),
            reject_with: Mutex::new(None),
        })
    }

    pub fn emit(&self, event: &str, payload: Value) {
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .unwrap()
            .get(event)
            .map(|entries| entries.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(payload.clone());
        }
    }

    pub fn accounts_changed(&self, accounts: &[&str]) {
        self.emit("accountsChanged", json!(accounts));
    }

    pub fn chain_changed(&self, chain: &str) {
        self.emit("chainChanged", json!(chain));
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn current_chain(&self) -> String {
        self.chain.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reject_next(&self, error: ProviderError) {
        *self.reject_with.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn on(&self, event: &str, handler: EventHandler) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        if let Some(entries) = self.listeners.lock().unwrap().get_mut(event) {
            entries.retain(|(existing, _)| *existing != id);
        }
        self.removals.fetch_add(1, Ordering::SeqCst);
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        if let Some(error) = self.reject_with.lock().unwrap().take() {
            return Err(error);
        }

        match method {
            "eth_requestAccounts" => Ok(json!(*self.accounts.lock().unwrap())),
            "eth_chainId" => Ok(json!(*self.chain.lock().unwrap())),
            "wallet_switchEthereumChain" => {
                let chain_id = params[0]["chainId"].as_str().unwrap_or_default().to_string();
                if self.known_chains.lock().unwrap().contains(&chain_id) {
                    *self.chain.lock().unwrap() = chain_id;
                    Ok(Value::Null)
                } else {
                    Err(ProviderError::from_code(4902, chain_id))
                }
            }
            "wallet_addEthereumChain" => {
                let chain_id = params[0]["chainId"].as_str().unwrap_or_default().to_string();
                self.known_chains.lock().unwrap().push(chain_id.clone());
                *self.chain.lock().unwrap() = chain_id;
                Ok(Value::Null)
            }
            other => Err(ProviderError::UnsupportedMethod(other.to_string())),
        }
    }

    fn can_disconnect(&self) -> bool {
        self.can_disconnect
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type Reply<T> = Result<Option<T>, String>;
type Pending<T> = Mutex<HashMap<String, VecDeque<(String, oneshot::Sender<Reply<T>>)>>>;

/// Enricher whose lookups block until the test answers them, oldest first
#[derive(Default)]
pub struct ScriptedEnricher {
    balances: Pending<String>,
    names: Pending<EnsIdentity>,
    calls: Mutex<Vec<(&'static str, String, String)>>,
    arrived: Notify,
}

impl ScriptedEnricher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// (kind, rpc_url, address) of every lookup started so far
    pub fn calls(&self) -> Vec<(&'static str, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, kind: &str) -> usize {
        self.calls().iter().filter(|(k, _, _)| *k == kind).count()
    }

    /// Wait until `count` lookups of `kind` have started
    pub async fn wait_for_calls(&self, kind: &str, count: usize) {
        let started = async {
            while self.call_count(kind) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(WAIT, started)
            .await
            .expect("lookups were never started");
    }

    /// Answer the oldest pending balance lookup for `address`; returns its RPC URL
    pub async fn answer_balance(&self, address: &str, reply: Reply<String>) -> String {
        Self::answer(&self.arrived, &self.balances, address, reply).await
    }

    pub async fn answer_ens(&self, address: &str, reply: Reply<EnsIdentity>) -> String {
        Self::answer(&self.arrived, &self.names, address, reply).await
    }

    async fn answer<T>(arrived: &Notify, pending: &Pending<T>, address: &str, reply: Reply<T>) -> String {
        let wait = async {
            loop {
                let notified = arrived.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let next = pending
                    .lock()
                    .unwrap()
                    .get_mut(address)
                    .and_then(VecDeque::pop_front);
                if let Some((rpc_url, tx)) = next {
                    return (rpc_url, tx);
                }
                notified.await;
            }
        };

        let (rpc_url, tx) = tokio::time::timeout(WAIT, wait)
            .await
            .expect("lookup was never started");
        let _ = tx.send(reply);
        rpc_url
    }

    async fn wait_reply<T>(
        &self,
        kind: &'static str,
        pending: &Pending<T>,
        rpc_url: &str,
        address: &str,
    ) -> anyhow::Result<Option<T>> {
        let (tx, rx) = oneshot::channel();
        self.calls
            .lock()
            .unwrap()
            .push((kind, rpc_url.to_string(), address.to_string()));
        pending
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push_back((rpc_url.to_string(), tx));
        self.arrived.notify_waiters();

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(anyhow::anyhow!(message)),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl Enricher for ScriptedEnricher {
    async fn balance(&self, rpc_url: &str, address: &str) -> anyhow::Result<Option<String>> {
        self.wait_reply("balance", &self.balances, rpc_url, address).await
    }

    async fn ens(&self, rpc_url: &str, address: &str) -> anyhow::Result<Option<EnsIdentity>> {
        self.wait_reply("ens", &self.names, rpc_url, address).await
    }
}

pub fn enrichment(store: &WalletStore, enricher: &Arc<ScriptedEnricher>) -> EnrichmentClient {
    EnrichmentClient::new(store.clone(), chains(), enricher.clone())
}

/// Next store event, failing the test if none arrives in time
pub async fn next_event(events: &mut broadcast::Receiver<StoreEvent>) -> StoreEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a store event")
        .expect("store event channel closed")
}

/// Assert the store stays silent for a short while
pub async fn assert_quiet(events: &mut broadcast::Receiver<StoreEvent>) {
    if let Ok(event) = tokio::time::timeout(QUIET, events.recv()).await {
        panic!("unexpected store event: {:?}", event);
    }
}

pub fn updated(event: StoreEvent) -> wallet_sync::WalletState {
    match event {
        StoreEvent::Updated(wallet) => wallet,
        other => panic!("expected an update, got {:?}", other),
    }
}
