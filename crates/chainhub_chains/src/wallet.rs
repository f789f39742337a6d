//! Wallet collaborator interface.
//!
//! The session never talks to a wallet directly; it goes through
//! [`WalletConnector`] for requests and receives unsolicited changes as
//! [`WalletEvent`]s on a channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::ChainError;
use crate::registry::ChainId;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    /// The user declined the request.
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Wallet failure: {0}")]
    Failed(String),
}

impl From<WalletError> for ChainError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rejected(reason) => ChainError::ConnectionRejected(reason),
            WalletError::Failed(reason) => ChainError::Wallet(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the wallet reports after a successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConnection {
    pub account: AccountId,
    pub chain_id: ChainId,
}

/// Unsolicited wallet notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event", content = "value")]
pub enum WalletEvent {
    AccountChanged(AccountId),
    NetworkChanged(ChainId),
    Disconnected,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Ask the wallet for an account and its current network.
    async fn request_connect(&self) -> Result<WalletConnection, WalletError>;

    /// Ask the wallet to move to `chain_id`. Resolves once acknowledged.
    async fn switch_network(&self, chain_id: ChainId) -> Result<(), WalletError>;

    async fn disconnect(&self) -> Result<(), WalletError>;
}
