//! Connectivity error types.

use chainhub_core::ErrorCategory;

use crate::registry::ChainId;

/// Errors that can occur in the chainhub_chains crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The requested chain id is not in the registry.
    #[error("Unknown network: {0}")]
    UnknownNetwork(ChainId),

    /// The wallet reported, or was asked for, a network the registry does
    /// not carry.
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(ChainId),

    /// Every endpoint candidate for a network failed or timed out.
    #[error("All {attempts} endpoint(s) for network {chain_id} failed")]
    EndpointExhausted { chain_id: ChainId, attempts: usize },

    /// The user or wallet declined a connect/switch request.
    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),

    /// The wallet collaborator failed for a reason other than rejection.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// The operation is not valid in the current session state.
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    /// No account is being observed.
    #[error("No account connected")]
    NoAccount,

    /// The string is not a valid account address.
    #[error("Invalid account address: {0}")]
    InvalidAccount(String),

    /// Two descriptors share an id.
    #[error("Duplicate network id {0} in registry configuration")]
    DuplicateNetwork(ChainId),

    /// A registered network ended up without a single endpoint.
    #[error("Network {0} has no endpoints configured")]
    NoEndpoints(ChainId),

    /// A configured endpoint is not a valid http(s) URL.
    #[error("Invalid endpoint for network {chain_id}: {url}")]
    InvalidEndpoint { chain_id: ChainId, url: String },
}

impl ChainError {
    /// Returns the broad error category for routing and display purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownNetwork(_)
            | Self::UnsupportedNetwork(_)
            | Self::InvalidTransition { .. }
            | Self::NoAccount
            | Self::InvalidAccount(_) => ErrorCategory::UserError,
            Self::ConnectionRejected(_) | Self::Wallet(_) => ErrorCategory::WalletError,
            Self::EndpointExhausted { .. } => ErrorCategory::NetworkError,
            Self::DuplicateNetwork(_) | Self::NoEndpoints(_) | Self::InvalidEndpoint { .. } => {
                ErrorCategory::ConfigError
            }
        }
    }

    /// Whether this is a startup-time configuration defect.
    pub fn is_configuration(&self) -> bool {
        self.category() == ErrorCategory::ConfigError
    }

    /// Returns a user-friendly message.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownNetwork(id) | Self::UnsupportedNetwork(id) => {
                format!("Network {id} is not supported.")
            }
            Self::EndpointExhausted { .. } => {
                "This network is unreachable right now. Try again.".into()
            }
            Self::ConnectionRejected(_) => "The request was rejected in your wallet.".into(),
            Self::Wallet(_) => "Wallet error. Reconnect and try again.".into(),
            Self::InvalidTransition { .. } | Self::NoAccount => {
                "Please connect your wallet.".into()
            }
            Self::InvalidAccount(_) => "Invalid address format.".into(),
            Self::DuplicateNetwork(_) | Self::NoEndpoints(_) | Self::InvalidEndpoint { .. } => {
                "Configuration issue. Check your network settings.".into()
            }
        }
    }
}
