// Multi-chain connectivity: registry, endpoints, session, balances

pub mod account;
pub mod balances;
pub mod endpoints;
pub mod error;
pub mod reader;
pub mod registry;
pub mod session;
pub mod units;
pub mod wallet;

// Re-export primary types for convenient access.
pub use account::AccountId;
pub use balances::{
    AggregatorConfig, BalanceAggregator, BalanceBoard, BalanceFailure, BalanceSnapshot,
    FailureKind, SnapshotState,
};
pub use endpoints::{
    CandidateSource, EndpointCandidate, EndpointCandidateList, EndpointCatalog, EndpointResolver,
    NetworkEndpoints, ProviderCredentials, ProviderTemplate, validate_url,
};
pub use error::ChainError;
pub use reader::{BalanceReader, JsonRpcBalanceReader, ReadError};
pub use registry::{ChainId, ChainRegistry, NativeCurrency, NetworkDescriptor};
pub use session::{ConnectivitySession, SessionEvent, SessionState, TransitionKind};
pub use units::format_units;
pub use wallet::{WalletConnection, WalletConnector, WalletError, WalletEvent};
