//! Errors surfaced by wallet providers

use thiserror::Error;

/// Failure of a provider request, following the EIP-1193 error codes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("user rejected the request")]
    UserRejected,

    #[error("the requested account or method has not been authorized")]
    Unauthorized,

    #[error("provider does not support {0}")]
    UnsupportedMethod(String),

    #[error("provider is disconnected from all chains")]
    Disconnected,

    #[error("provider is not connected to the requested chain")]
    ChainDisconnected,

    #[error("chain {0} has not been added to the wallet")]
    UnrecognizedChain(String),

    #[error("provider returned no accounts")]
    NoAccounts,

    #[error("wallet {0} is already connected")]
    AlreadyConnected(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ProviderError {
    /// Map a raw provider error code onto the taxonomy
    pub fn from_code(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            4001 => ProviderError::UserRejected,
            4100 => ProviderError::Unauthorized,
            4200 => ProviderError::UnsupportedMethod(message),
            4900 => ProviderError::Disconnected,
            4901 => ProviderError::ChainDisconnected,
            4902 => ProviderError::UnrecognizedChain(message),
            _ => ProviderError::Rpc { code, message },
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            ProviderError::UserRejected => Some(4001),
            ProviderError::Unauthorized => Some(4100),
            ProviderError::UnsupportedMethod(_) => Some(4200),
            ProviderError::Disconnected => Some(4900),
            ProviderError::ChainDisconnected => Some(4901),
            ProviderError::UnrecognizedChain(_) => Some(4902),
            ProviderError::Rpc { code, .. } => Some(*code),
            ProviderError::NoAccounts
            | ProviderError::AlreadyConnected(_)
            | ProviderError::InvalidResponse(_) => None,
        }
    }
}
