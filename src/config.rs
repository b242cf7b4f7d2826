//! Chain configuration
//!
//! Which chains the application knows about, their native token and the RPC
//! endpoint used to enrich accounts on them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ChainId;

/// Chains where the ENS registry is deployed
const ENS_CHAINS: [&str; 5] = ["0x1", "0x3", "0x4", "0x5", "0xaa36a7"];

/// A chain the application is configured for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub id: ChainId,
    /// Native currency symbol, e.g. ETH
    pub token: String,
    pub label: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
}

impl ChainConfig {
    pub fn new(id: &str, token: &str, label: &str, rpc_url: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            token: token.to_string(),
            label: label.to_string(),
            rpc_url: rpc_url.map(str::to_string),
        }
    }
}

pub fn find_chain<'a>(chain_id: &str, chains: &'a [ChainConfig]) -> Option<&'a ChainConfig> {
    chains.iter().find(|chain| chain.id == chain_id)
}

/// RPC endpoint for a chain; `None` when the chain is unknown or has no URL
pub fn get_rpc_url<'a>(chain_id: &str, chains: &'a [ChainConfig]) -> Option<&'a str> {
    find_chain(chain_id, chains)
        .and_then(|chain| chain.rpc_url.as_deref())
        .filter(|url| !url.is_empty())
}

/// Whether ENS lookups make sense on this chain
pub fn valid_ens_chain(chain_id: &str) -> bool {
    ENS_CHAINS.contains(&chain_id)
}

/// Load a JSON array of chain entries
pub fn load_chains(path: &Path) -> Result<Vec<ChainConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chain config {}", path.display()))?;

    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse chain config {}", path.display()))
}
