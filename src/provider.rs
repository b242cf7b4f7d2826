//! Wallet provider interface
//!
//! An EIP-1193 style provider: listeners for push events and a `request`
//! entry point for RPC methods answered by the wallet itself.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::ChainConfig;
use crate::{ChainId, ProviderError};

pub const ACCOUNTS_CHANGED: &str = "accountsChanged";
pub const CHAIN_CHANGED: &str = "chainChanged";

pub type ListenerId = u64;

/// Callback registered for one provider event
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Register `handler` for `event`, returning an id for removal
    fn on(&self, event: &str, handler: EventHandler) -> ListenerId;

    fn remove_listener(&self, event: &str, id: ListenerId);

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Whether the provider can end the session itself
    fn can_disconnect(&self) -> bool {
        false
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        Err(ProviderError::UnsupportedMethod("disconnect".to_string()))
    }
}

/// `eth_requestAccounts`; prompts the user when not yet connected
pub async fn request_accounts(provider: &dyn Provider) -> Result<Vec<String>, ProviderError> {
    let payload = provider.request("eth_requestAccounts", json!([])).await?;

    serde_json::from_value(payload)
        .map_err(|e| ProviderError::InvalidResponse(format!("eth_requestAccounts: {}", e)))
}

pub async fn get_chain_id(provider: &dyn Provider) -> Result<ChainId, ProviderError> {
    let payload = provider.request("eth_chainId", json!([])).await?;

    match payload {
        Value::String(chain_id) => Ok(chain_id),
        Value::Number(n) => n
            .as_u64()
            .map(|id| format!("0x{:x}", id))
            .ok_or_else(|| ProviderError::InvalidResponse(format!("eth_chainId: {}", n))),
        other => Err(ProviderError::InvalidResponse(format!("eth_chainId: {}", other))),
    }
}

pub async fn switch_chain(provider: &dyn Provider, chain_id: &str) -> Result<(), ProviderError> {
    provider
        .request("wallet_switchEthereumChain", json!([{ "chainId": chain_id }]))
        .await?;
    Ok(())
}

/// `wallet_addEthereumChain`; wallets switch to the chain once added
pub async fn add_chain(provider: &dyn Provider, chain: &ChainConfig) -> Result<(), ProviderError> {
    let rpc_urls: Vec<&str> = chain.rpc_url.as_deref().into_iter().collect();

    provider
        .request(
            "wallet_addEthereumChain",
            json!([{
                "chainId": chain.id,
                "chainName": chain.label,
                "nativeCurrency": {
                    "name": chain.token,
                    "symbol": chain.token,
                    "decimals": 18,
                },
                "rpcUrls": rpc_urls,
            }]),
        )
        .await?;
    Ok(())
}

/// Switch to `chain`, adding it to the wallet first if the wallet does not know it
pub async fn add_or_switch_chain(
    provider: &dyn Provider,
    chain: &ChainConfig,
) -> Result<(), ProviderError> {
    match switch_chain(provider, &chain.id).await {
        Err(ProviderError::UnrecognizedChain(_)) => {
            info!(chain = %chain.id, "chain unknown to wallet, adding it");
            add_chain(provider, chain).await
        }
        other => other,
    }
}
