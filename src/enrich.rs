//! Account enrichment
//!
//! Balance and ENS lookups run as two independent tasks per address. Each
//! one merges its result into whatever the wallet looks like when it
//! finishes, and only if the wallet is still on the chain visit the lookup ran
//! against and still holds the address.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{find_chain, get_rpc_url, valid_ens_chain, ChainConfig};
use crate::rpc::{format_native, RpcClient};
use crate::store::{WalletStore, WalletUpdate};
use crate::{ens, BalanceInfo, ChainId, EnsIdentity, WalletState};

const DEFAULT_DENOMINATION: &str = "ETH";

/// Source of balances and names for an address
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Native balance as a decimal string in whole units
    async fn balance(&self, rpc_url: &str, address: &str) -> Result<Option<String>>;

    async fn ens(&self, rpc_url: &str, address: &str) -> Result<Option<EnsIdentity>>;
}

/// [`Enricher`] backed by JSON-RPC calls
#[derive(Debug, Clone, Default)]
pub struct RpcEnricher {
    http: reqwest::Client,
}

impl RpcEnricher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Enricher for RpcEnricher {
    async fn balance(&self, rpc_url: &str, address: &str) -> Result<Option<String>> {
        let client = RpcClient::with_client(rpc_url, self.http.clone());
        let wei = client.get_balance(address).await?;
        Ok(wei.map(format_native))
    }

    async fn ens(&self, rpc_url: &str, address: &str) -> Result<Option<EnsIdentity>> {
        let client = RpcClient::with_client(rpc_url, self.http.clone());
        ens::resolve_identity(&client, address).await
    }
}

/// One enrichment result destined for one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    Balance(BalanceInfo),
    Ens(EnsIdentity),
}

/// The chain a lookup runs against, and which visit to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVisit {
    pub chain: ChainId,
    pub epoch: u64,
}

impl ChainVisit {
    pub fn new(chain: impl Into<ChainId>, epoch: u64) -> Self {
        Self {
            chain: chain.into(),
            epoch,
        }
    }

    pub fn current(wallet: &WalletState) -> Self {
        Self::new(wallet.chain.clone(), wallet.chain_epoch)
    }
}

/// Merge `enrichment` into `address` of wallet `label` if the wallet is still
/// on the same visit to the chain and still holds the address. Returns
/// whether anything was published.
pub fn apply_enrichment(
    store: &WalletStore,
    label: &str,
    visit: &ChainVisit,
    address: &str,
    enrichment: Enrichment,
) -> bool {
    store
        .update_wallet_with(label, |wallet| {
            if wallet.chain != visit.chain || wallet.chain_epoch != visit.epoch {
                debug!(
                    label,
                    address,
                    chain = %visit.chain,
                    epoch = visit.epoch,
                    current = %wallet.chain,
                    current_epoch = wallet.chain_epoch,
                    "dropping enrichment for superseded chain"
                );
                return (None, false);
            }
            if wallet.account(address).is_none() {
                debug!(label, address, "dropping enrichment for departed account");
                return (None, false);
            }

            let accounts = wallet
                .accounts
                .iter()
                .map(|account| {
                    let mut account = account.clone();
                    if account.address == address {
                        match &enrichment {
                            Enrichment::Balance(balance) => account.balance = Some(balance.clone()),
                            Enrichment::Ens(identity) => account.ens = Some(identity.clone()),
                        }
                    }
                    account
                })
                .collect();

            (Some(WalletUpdate::accounts(accounts)), true)
        })
        .unwrap_or_else(|| {
            debug!(label, address, "dropping enrichment for untracked wallet");
            false
        })
}

/// Starts enrichment tasks and publishes their results to the store
#[derive(Clone)]
pub struct EnrichmentClient {
    store: WalletStore,
    chains: Arc<[ChainConfig]>,
    enricher: Arc<dyn Enricher>,
}

impl EnrichmentClient {
    pub fn new(store: WalletStore, chains: Vec<ChainConfig>, enricher: Arc<dyn Enricher>) -> Self {
        Self {
            store,
            chains: chains.into(),
            enricher,
        }
    }

    pub fn store(&self) -> &WalletStore {
        &self.store
    }

    pub fn chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    /// Spawn balance (and, on ENS chains, name) lookups for each address
    /// under `visit`.
    ///
    /// Nothing is spawned when the chain has no RPC endpoint. The returned
    /// handles need not be awaited.
    pub fn enrich(&self, label: &str, visit: &ChainVisit, addresses: Vec<String>) -> Vec<JoinHandle<()>> {
        let chain = visit.chain.as_str();
        let Some(rpc_url) = get_rpc_url(chain, &self.chains) else {
            warn!(label, chain, "no RPC URL configured for chain, skipping enrichment");
            return Vec::new();
        };

        let denomination = find_chain(chain, &self.chains)
            .map(|config| config.token.clone())
            .unwrap_or_else(|| DEFAULT_DENOMINATION.to_string());
        let with_ens = valid_ens_chain(chain);

        info!(label, chain, accounts = addresses.len(), "enriching accounts");

        let mut handles = Vec::with_capacity(addresses.len() * 2);
        for address in addresses {
            let task = Task {
                store: self.store.clone(),
                enricher: self.enricher.clone(),
                label: label.to_string(),
                visit: visit.clone(),
                rpc_url: rpc_url.to_string(),
                address,
            };

            if with_ens {
                handles.push(tokio::spawn(task.clone().ens()));
            }
            handles.push(tokio::spawn(task.balance(denomination.clone())));
        }

        handles
    }
}

#[derive(Clone)]
struct Task {
    store: WalletStore,
    enricher: Arc<dyn Enricher>,
    label: String,
    visit: ChainVisit,
    rpc_url: String,
    address: String,
}

impl Task {
    async fn balance(self, denomination: String) {
        match self.enricher.balance(&self.rpc_url, &self.address).await {
            Ok(Some(amount)) => {
                self.publish(Enrichment::Balance(BalanceInfo::new(amount, denomination)));
            }
            Ok(None) => debug!(address = %self.address, chain = %self.visit.chain, "no balance returned"),
            Err(e) => {
                warn!(address = %self.address, chain = %self.visit.chain, error = %e, "balance lookup failed")
            }
        }
    }

    async fn ens(self) {
        match self.enricher.ens(&self.rpc_url, &self.address).await {
            Ok(Some(identity)) => self.publish(Enrichment::Ens(identity)),
            Ok(None) => debug!(address = %self.address, "no ENS name"),
            Err(e) => {
                warn!(address = %self.address, chain = %self.visit.chain, error = %e, "ENS lookup failed")
            }
        }
    }

    fn publish(&self, enrichment: Enrichment) {
        apply_enrichment(&self.store, &self.label, &self.visit, &self.address, enrichment);
    }
}
