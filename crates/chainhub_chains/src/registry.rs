//! Chain registry -- the frozen catalogue of supported networks.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChainError;

/// Stable numeric network identifier (EIP-155 chain id).
pub type ChainId = u64;

/// Native currency of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// Immutable description of one supported network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub id: ChainId,
    pub name: String,
    pub native_currency: NativeCurrency,
    pub is_testnet: bool,
    /// Block explorer base URL without trailing slash. May be empty.
    pub explorer_base_url: String,
    /// Display accent, `#RRGGBB`.
    pub color: String,
}

impl NetworkDescriptor {
    pub fn new(
        id: ChainId,
        name: impl Into<String>,
        native_currency: NativeCurrency,
        is_testnet: bool,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            native_currency,
            is_testnet,
            explorer_base_url: String::new(),
            color: String::new(),
        }
    }

    pub fn with_explorer(mut self, url: impl Into<String>) -> Self {
        self.explorer_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Explorer link for a transaction hash.
    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_link("tx", tx_hash)
    }

    /// Explorer link for a wallet or contract address.
    pub fn address_url(&self, address: &str) -> Option<String> {
        self.explorer_link("address", address)
    }

    /// Explorer link for a token contract.
    pub fn token_url(&self, token_address: &str) -> Option<String> {
        self.explorer_link("token", token_address)
    }

    /// Explorer link for a block.
    pub fn block_url(&self, block_number: u64) -> Option<String> {
        self.explorer_link("block", &block_number.to_string())
    }

    fn explorer_link(&self, kind: &str, item: &str) -> Option<String> {
        if self.explorer_base_url.is_empty() {
            return None;
        }
        Some(format!("{}/{kind}/{item}", self.explorer_base_url))
    }
}

impl fmt::Display for NetworkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// ---------------------------------------------------------------------------
// ChainRegistry
// ---------------------------------------------------------------------------

/// Read-only catalogue of the networks this process knows about.
///
/// Built once at startup. Mainnets come before testnets, each group in
/// insertion order. Every descriptor stays indexed for lookups; testnets are
/// only left out of the enabled set ([`list_all`](Self::list_all),
/// [`ids`](Self::ids), [`len`](Self::len)) when they are not enabled.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    networks: Vec<NetworkDescriptor>,
    index: HashMap<ChainId, usize>,
    /// `networks[..enabled]` is the enabled set.
    enabled: usize,
    testnets_enabled: bool,
}

impl ChainRegistry {
    /// Build a registry from descriptors. Fails on duplicate ids, including
    /// duplicates among testnets that are not enabled.
    pub fn new(
        descriptors: Vec<NetworkDescriptor>,
        include_testnets: bool,
    ) -> Result<Self, ChainError> {
        let mut seen = HashSet::with_capacity(descriptors.len());
        for d in &descriptors {
            if !seen.insert(d.id) {
                return Err(ChainError::DuplicateNetwork(d.id));
            }
        }
        Ok(Self::from_unique(descriptors, include_testnets))
    }

    /// The built-in network catalogue.
    pub fn builtin(include_testnets: bool) -> Self {
        let descriptors = builtin_networks();
        debug_assert!(
            {
                let mut seen = HashSet::new();
                descriptors.iter().all(|d| seen.insert(d.id))
            },
            "built-in catalogue has duplicate ids"
        );
        Self::from_unique(descriptors, include_testnets)
    }

    /// Callers guarantee that ids are unique.
    fn from_unique(descriptors: Vec<NetworkDescriptor>, include_testnets: bool) -> Self {
        let (mut networks, testnets): (Vec<_>, Vec<_>) =
            descriptors.into_iter().partition(|d| !d.is_testnet);
        let enabled = if include_testnets {
            networks.len() + testnets.len()
        } else {
            networks.len()
        };
        networks.extend(testnets);

        let index = networks
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id, i))
            .collect();

        debug!(
            known = networks.len(),
            enabled,
            include_testnets,
            "chain registry built"
        );

        Self {
            networks,
            index,
            enabled,
            testnets_enabled: include_testnets,
        }
    }

    /// Enabled networks, mainnets first.
    pub fn list_all(&self) -> &[NetworkDescriptor] {
        &self.networks[..self.enabled]
    }

    /// Look up any known network by id, enabled or not.
    pub fn by_id(&self, id: ChainId) -> Result<&NetworkDescriptor, ChainError> {
        self.index
            .get(&id)
            .map(|&i| &self.networks[i])
            .ok_or(ChainError::UnknownNetwork(id))
    }

    /// Whether the id is known, enabled or not.
    pub fn contains(&self, id: ChainId) -> bool {
        self.index.contains_key(&id)
    }

    /// Whether the id is in the enabled set.
    pub fn is_enabled(&self, id: ChainId) -> bool {
        self.index.get(&id).is_some_and(|&i| i < self.enabled)
    }

    pub fn list_mainnets(&self) -> Vec<&NetworkDescriptor> {
        self.networks.iter().filter(|d| !d.is_testnet).collect()
    }

    /// Known testnets, whether or not they are enabled.
    pub fn list_testnets(&self) -> Vec<&NetworkDescriptor> {
        self.networks.iter().filter(|d| d.is_testnet).collect()
    }

    /// Ids of the enabled networks.
    pub fn ids(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.list_all().iter().map(|d| d.id)
    }

    /// Number of enabled networks.
    pub fn len(&self) -> usize {
        self.enabled
    }

    pub fn is_empty(&self) -> bool {
        self.enabled == 0
    }

    pub fn testnets_enabled(&self) -> bool {
        self.testnets_enabled
    }
}

// ---------------------------------------------------------------------------
// Built-in catalogue
// ---------------------------------------------------------------------------

pub const ETHEREUM: ChainId = 1;
pub const POLYGON: ChainId = 137;
pub const BSC: ChainId = 56;
pub const ARBITRUM: ChainId = 42161;
pub const OPTIMISM: ChainId = 10;
pub const BASE: ChainId = 8453;
pub const SEPOLIA: ChainId = 11_155_111;
pub const POLYGON_MUMBAI: ChainId = 80001;
pub const BSC_TESTNET: ChainId = 97;
pub const ARBITRUM_SEPOLIA: ChainId = 421_614;
pub const OPTIMISM_SEPOLIA: ChainId = 11_155_420;
pub const BASE_SEPOLIA: ChainId = 84532;

fn ether(name: &str) -> NativeCurrency {
    NativeCurrency::new(name, "ETH", 18)
}

/// Default descriptors for all supported networks, mainnets first.
pub fn builtin_networks() -> Vec<NetworkDescriptor> {
    let matic = || NativeCurrency::new("MATIC", "MATIC", 18);
    let bnb = || NativeCurrency::new("BNB", "BNB", 18);

    vec![
        // Mainnets
        NetworkDescriptor::new(ETHEREUM, "Ethereum", ether("Ether"), false)
            .with_explorer("https://etherscan.io")
            .with_color("#627EEA"),
        NetworkDescriptor::new(POLYGON, "Polygon", matic(), false)
            .with_explorer("https://polygonscan.com")
            .with_color("#8247E5"),
        NetworkDescriptor::new(BSC, "BNB Chain", bnb(), false)
            .with_explorer("https://bscscan.com")
            .with_color("#F3BA2F"),
        NetworkDescriptor::new(ARBITRUM, "Arbitrum", ether("Ether"), false)
            .with_explorer("https://arbiscan.io")
            .with_color("#28A0F0"),
        NetworkDescriptor::new(OPTIMISM, "Optimism", ether("Ether"), false)
            .with_explorer("https://optimistic.etherscan.io")
            .with_color("#FF0420"),
        NetworkDescriptor::new(BASE, "Base", ether("Ether"), false)
            .with_explorer("https://basescan.org")
            .with_color("#0052FF"),
        // Testnets
        NetworkDescriptor::new(SEPOLIA, "Sepolia", ether("Sepolia Ether"), true)
            .with_explorer("https://sepolia.etherscan.io")
            .with_color("#627EEA"),
        NetworkDescriptor::new(POLYGON_MUMBAI, "Mumbai", matic(), true)
            .with_explorer("https://mumbai.polygonscan.com")
            .with_color("#8247E5"),
        NetworkDescriptor::new(BSC_TESTNET, "BSC Testnet", bnb(), true)
            .with_explorer("https://testnet.bscscan.com")
            .with_color("#F3BA2F"),
        NetworkDescriptor::new(ARBITRUM_SEPOLIA, "Arbitrum Sepolia", ether("Ether"), true)
            .with_explorer("https://sepolia.arbiscan.io")
            .with_color("#28A0F0"),
        NetworkDescriptor::new(OPTIMISM_SEPOLIA, "Optimism Sepolia", ether("Ether"), true)
            .with_explorer("https://sepolia-optimism.etherscan.io")
            .with_color("#FF0420"),
        NetworkDescriptor::new(BASE_SEPOLIA, "Base Sepolia", ether("Ether"), true)
            .with_explorer("https://sepolia.basescan.org")
            .with_color("#0052FF"),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
