//! Pure merge rules for provider events
//!
//! Given the accounts and chain currently recorded for a wallet and what the
//! provider just reported, work out the next snapshot. No I/O happens here;
//! the tracker decides what to publish and which lookups to start.

use crate::{Account, ChainId};

/// Outcome of an `accountsChanged` report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountChange {
    /// No address reported: the wallet is no longer connected
    Disconnected,
    /// Reported address was already known; it moves to the front, enrichment kept
    Reordered(Vec<Account>),
    /// Reported address is new and needs enrichment
    Added {
        accounts: Vec<Account>,
        address: String,
    },
}

/// Outcome of a `chainChanged` report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainAction {
    Unchanged,
    Reset {
        chain: ChainId,
        accounts: Vec<Account>,
    },
}

pub fn reconcile_accounts(previous: &[Account], reported: Option<&str>) -> AccountChange {
    let Some(address) = reported.filter(|address| !address.is_empty()) else {
        return AccountChange::Disconnected;
    };

    let (matching, others): (Vec<&Account>, Vec<&Account>) = previous
        .iter()
        .partition(|account| account.address == address);

    match matching.first() {
        Some(existing) => {
            let accounts = std::iter::once(*existing)
                .chain(others)
                .cloned()
                .collect();
            AccountChange::Reordered(accounts)
        }
        None => {
            let accounts = std::iter::once(Account::new(address))
                .chain(others.into_iter().cloned())
                .collect();
            AccountChange::Added {
                accounts,
                address: address.to_string(),
            }
        }
    }
}

/// A different chain invalidates every balance and name; the same chain is a
/// redundant event.
pub fn reconcile_chain(previous: &str, reported: &str, accounts: &[Account]) -> ChainAction {
    if previous == reported {
        return ChainAction::Unchanged;
    }

    ChainAction::Reset {
        chain: reported.to_string(),
        accounts: accounts.iter().map(Account::cleared).collect(),
    }
}
