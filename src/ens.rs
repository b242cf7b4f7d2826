//! ENS lookups
//!
//! Reverse resolution of an address to its primary name, plus the resolver
//! reads (content hash, text records) that hang off a name. Calls go through
//! the registry at [`ENS_REGISTRY`] with hand-encoded ABI payloads.

use alloy_primitives::{keccak256, B256, U256};
use anyhow::{Context, Result};
use tracing::debug;

use crate::rpc::RpcClient;
use crate::EnsIdentity;

pub const ENS_REGISTRY: &str = "0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e";

/// resolver(bytes32)
const RESOLVER_SELECTOR: [u8; 4] = [0x01, 0x78, 0xb8, 0xbf];
/// addr(bytes32)
const ADDR_SELECTOR: [u8; 4] = [0x3b, 0x3b, 0x57, 0xde];
/// name(bytes32)
const NAME_SELECTOR: [u8; 4] = [0x69, 0x1f, 0x34, 0x31];
/// contenthash(bytes32)
const CONTENTHASH_SELECTOR: [u8; 4] = [0xbc, 0x1c, 0x58, 0xd1];
/// text(bytes32,string)
const TEXT_SELECTOR: [u8; 4] = [0x59, 0xd1, 0xd4, 0x3c];

/// EIP-137 namehash
pub fn namehash(name: &str) -> B256 {
    let mut node = B256::ZERO;
    if name.is_empty() {
        return node;
    }

    for label in name.rsplit('.') {
        let label_hash = keccak256(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(label_hash.as_slice());
        node = keccak256(buf);
    }

    node
}

/// Node of `<address>.addr.reverse`
pub fn reverse_node(address: &str) -> B256 {
    let bare = address.trim_start_matches("0x").to_lowercase();
    namehash(&format!("{}.addr.reverse", bare))
}

/// Reverse-resolve `address` and, if it has a name, read the name's
/// resolver and content hash.
///
/// Returns `None` when no name is set, the forward record does not point
/// back at `address`, or the name has no resolver.
pub async fn resolve_identity(client: &RpcClient, address: &str) -> Result<Option<EnsIdentity>> {
    let Some(name) = lookup_address(client, address).await? else {
        return Ok(None);
    };

    let node = namehash(&name);
    let Some(resolver) = resolver(client, node).await? else {
        debug!(%name, "ENS name has no resolver");
        return Ok(None);
    };

    let content_hash = match client.eth_call(&resolver, &node_call(CONTENTHASH_SELECTOR, node)).await {
        Ok(data) => decode_bytes(&data)
            .ok()
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| format!("0x{}", hex::encode(bytes))),
        Err(e) => {
            debug!(%name, error = %e, "resolver has no content hash");
            None
        }
    };

    Ok(Some(EnsIdentity {
        name,
        content_hash,
        resolver,
    }))
}

/// Primary ENS name of an address, verified against its forward record
pub async fn lookup_address(client: &RpcClient, address: &str) -> Result<Option<String>> {
    let node = reverse_node(address);
    let Some(reverse_resolver) = resolver(client, node).await? else {
        return Ok(None);
    };

    let data = client
        .eth_call(&reverse_resolver, &node_call(NAME_SELECTOR, node))
        .await?;
    let name = decode_string(&data)?;
    if name.is_empty() {
        return Ok(None);
    }

    let forward = namehash(&name);
    let Some(forward_resolver) = resolver(client, forward).await? else {
        return Ok(None);
    };
    let data = client
        .eth_call(&forward_resolver, &node_call(ADDR_SELECTOR, forward))
        .await?;

    match decode_address(&data) {
        Some(resolved) if resolved.eq_ignore_ascii_case(address) => Ok(Some(name)),
        _ => {
            debug!(%name, %address, "reverse record does not match forward record");
            Ok(None)
        }
    }
}

impl EnsIdentity {
    /// Look up a text record (e.g. `avatar`, `url`) on this name's resolver
    pub async fn text(&self, client: &RpcClient, key: &str) -> Result<Option<String>> {
        let node = namehash(&self.name);

        let mut data = node_call(TEXT_SELECTOR, node);
        data.extend_from_slice(&word(U256::from(64u64)));
        data.extend_from_slice(&word(U256::from(key.len())));
        data.extend_from_slice(key.as_bytes());
        data.resize(data.len() + padding(key.len()), 0);

        let result = client.eth_call(&self.resolver, &data).await?;
        let value = decode_string(&result)?;

        Ok(Some(value).filter(|value| !value.is_empty()))
    }
}

async fn resolver(client: &RpcClient, node: B256) -> Result<Option<String>> {
    let data = client
        .eth_call(ENS_REGISTRY, &node_call(RESOLVER_SELECTOR, node))
        .await
        .context("Failed to query ENS registry")?;

    Ok(decode_address(&data))
}

fn node_call(selector: [u8; 4], node: B256) -> Vec<u8> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&selector);
    data.extend_from_slice(node.as_slice());
    data
}

fn word(value: U256) -> [u8; 32] {
    value.to_be_bytes()
}

fn padding(len: usize) -> usize {
    (32 - len % 32) % 32
}

/// Address in the low 20 bytes of a word; `None` for the zero address
fn decode_address(data: &[u8]) -> Option<String> {
    if data.len() < 32 {
        return None;
    }
    let raw = &data[12..32];
    if raw.iter().all(|b| *b == 0) {
        return None;
    }

    Some(format!("0x{}", hex::encode(raw)))
}

fn read_usize(data: &[u8], at: usize) -> Result<usize> {
    let end = at.checked_add(32).context("ABI offset overflow")?;
    let slice = data.get(at..end).context("ABI word out of bounds")?;
    let value = U256::from_be_slice(slice);
    if value > U256::from(u32::MAX) {
        return Err(anyhow::anyhow!("ABI offset or length too large: {}", value));
    }

    Ok(value.as_limbs()[0] as usize)
}

/// Decode a single dynamic `bytes` return value
fn decode_bytes(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let offset = read_usize(data, 0)?;
    let len = read_usize(data, offset)?;
    let start = offset + 32;
    let end = start.checked_add(len).context("ABI length overflow")?;

    data.get(start..end)
        .map(<[u8]>::to_vec)
        .context("ABI bytes out of bounds")
}

fn decode_string(data: &[u8]) -> Result<String> {
    String::from_utf8(decode_bytes(data)?).context("ENS string is not valid UTF-8")
}
