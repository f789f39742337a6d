//! Endpoint resolution -- ordered, credential-filtered RPC candidates per network.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ChainError;
use crate::registry::{self, ChainId, ChainRegistry};

const KEY_PLACEHOLDER: &str = "{key}";
const REDACTED: &str = "***";

/// A credentialed provider URL, e.g. `https://eth-mainnet.g.alchemy.com/v2/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTemplate {
    pub provider: String,
    pub url_template: String,
}

impl ProviderTemplate {
    pub fn new(provider: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            url_template: url_template.into(),
        }
    }

    fn render(&self, key: &str) -> String {
        self.url_template.replace(KEY_PLACEHOLDER, key)
    }
}

/// Endpoint sources for one network, before credential filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoints {
    /// Credentialed providers, highest priority first.
    pub providers: Vec<ProviderTemplate>,
    /// Public no-credential fallbacks, highest priority first.
    pub public: Vec<String>,
}

/// Per-network endpoint sources.
#[derive(Debug, Clone, Default)]
pub struct EndpointCatalog {
    entries: HashMap<ChainId, NetworkEndpoints>,
}

impl EndpointCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain_id: ChainId, endpoints: NetworkEndpoints) {
        self.entries.insert(chain_id, endpoints);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, chain_id: ChainId, endpoints: NetworkEndpoints) -> Self {
        self.insert(chain_id, endpoints);
        self
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&NetworkEndpoints> {
        self.entries.get(&chain_id)
    }

    /// Default endpoint table for the built-in networks.
    pub fn builtin() -> Self {
        let alchemy = |slug: &str| {
            ProviderTemplate::new(
                "alchemy",
                format!("https://{slug}.g.alchemy.com/v2/{KEY_PLACEHOLDER}"),
            )
        };
        let infura = |slug: &str| {
            ProviderTemplate::new(
                "infura",
                format!("https://{slug}.infura.io/v3/{KEY_PLACEHOLDER}"),
            )
        };
        let entry = |providers: Vec<ProviderTemplate>, public: &[&str]| NetworkEndpoints {
            providers,
            public: public.iter().map(|u| u.to_string()).collect(),
        };

        Self::new()
            .with(
                registry::ETHEREUM,
                entry(
                    vec![alchemy("eth-mainnet"), infura("mainnet")],
                    &["https://eth.llamarpc.com", "https://ethereum.publicnode.com"],
                ),
            )
            .with(
                registry::POLYGON,
                entry(
                    vec![alchemy("polygon-mainnet"), infura("polygon-mainnet")],
                    &[
                        "https://polygon.llamarpc.com",
                        "https://polygon-bor.publicnode.com",
                    ],
                ),
            )
            .with(
                registry::BSC,
                entry(
                    vec![],
                    &[
                        "https://bsc.publicnode.com",
                        "https://bsc-dataseed.binance.org",
                    ],
                ),
            )
            .with(
                registry::ARBITRUM,
                entry(
                    vec![alchemy("arb-mainnet"), infura("arbitrum-mainnet")],
                    &[
                        "https://arbitrum.llamarpc.com",
                        "https://arbitrum-one.publicnode.com",
                    ],
                ),
            )
            .with(
                registry::OPTIMISM,
                entry(
                    vec![alchemy("opt-mainnet"), infura("optimism-mainnet")],
                    &[
                        "https://optimism.llamarpc.com",
                        "https://optimism.publicnode.com",
                    ],
                ),
            )
            .with(
                registry::BASE,
                entry(
                    vec![alchemy("base-mainnet"), infura("base-mainnet")],
                    &["https://base.llamarpc.com", "https://base.publicnode.com"],
                ),
            )
            .with(
                registry::SEPOLIA,
                entry(
                    vec![alchemy("eth-sepolia"), infura("sepolia")],
                    &["https://ethereum-sepolia.publicnode.com"],
                ),
            )
            .with(
                registry::POLYGON_MUMBAI,
                entry(
                    vec![alchemy("polygon-mumbai")],
                    &["https://polygon-mumbai-bor.publicnode.com"],
                ),
            )
            .with(
                registry::BSC_TESTNET,
                entry(vec![], &["https://bsc-testnet.publicnode.com"]),
            )
            .with(
                registry::ARBITRUM_SEPOLIA,
                entry(
                    vec![alchemy("arb-sepolia")],
                    &["https://arbitrum-sepolia.publicnode.com"],
                ),
            )
            .with(
                registry::OPTIMISM_SEPOLIA,
                entry(
                    vec![alchemy("opt-sepolia")],
                    &["https://optimism-sepolia.publicnode.com"],
                ),
            )
            .with(
                registry::BASE_SEPOLIA,
                entry(
                    vec![alchemy("base-sepolia")],
                    &["https://base-sepolia.publicnode.com"],
                ),
            )
    }
}

/// Provider API credentials keyed by provider name. Blank keys count as absent.
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    keys: BTreeMap<String, String>,
}

impl ProviderCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(keys: BTreeMap<String, String>) -> Self {
        keys.into_iter()
            .fold(Self::new(), |creds, (provider, key)| creds.with(provider, key))
    }

    pub fn with(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into().trim().to_string();
        if !key.is_empty() {
            self.keys.insert(provider.into(), key);
        }
        self
    }

    pub fn get(&self, provider: &str) -> Option<&str> {
        self.keys.get(provider).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.keys.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// Candidate lists
// ---------------------------------------------------------------------------

/// Where a candidate came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "provider")]
pub enum CandidateSource {
    Custom,
    Provider(String),
    Public,
}

/// One endpoint URL in priority order.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointCandidate {
    pub url: String,
    pub source: CandidateSource,
    /// The URL with any credential masked, safe to log.
    redacted: String,
}

impl EndpointCandidate {
    pub fn redacted(&self) -> &str {
        &self.redacted
    }
}

impl std::fmt::Debug for EndpointCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointCandidate")
            .field("url", &self.redacted)
            .field("source", &self.source)
            .finish()
    }
}

/// Ordered endpoint candidates for one network. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidateList {
    chain_id: ChainId,
    candidates: Vec<EndpointCandidate>,
}

impl EndpointCandidateList {
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn candidates(&self) -> &[EndpointCandidate] {
        &self.candidates
    }

    pub fn urls(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.url.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EndpointCandidate> {
        self.candidates.iter()
    }
}

impl<'a> IntoIterator for &'a EndpointCandidateList {
    type Item = &'a EndpointCandidate;
    type IntoIter = std::slice::Iter<'a, EndpointCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

// ---------------------------------------------------------------------------
// EndpointResolver
// ---------------------------------------------------------------------------

/// Resolves a network id to its ordered endpoint candidates.
///
/// All lists are built once at construction; a registered network without
/// endpoints is a configuration error and fails construction.
#[derive(Debug)]
pub struct EndpointResolver {
    registry: Arc<ChainRegistry>,
    lists: HashMap<ChainId, EndpointCandidateList>,
}

impl EndpointResolver {
    /// Build candidate lists for every registered network.
    ///
    /// Order per network: custom endpoint, credentialed providers whose key is
    /// configured, public fallbacks. Repeated URLs keep their first position.
    pub fn new(
        registry: Arc<ChainRegistry>,
        catalog: &EndpointCatalog,
        credentials: &ProviderCredentials,
        custom: &BTreeMap<ChainId, String>,
    ) -> Result<Self, ChainError> {
        for chain_id in custom.keys() {
            if !registry.is_enabled(*chain_id) {
                warn!(chain_id, "custom RPC configured for a network that is not enabled, ignoring");
            }
        }

        let mut lists = HashMap::with_capacity(registry.len());
        for network in registry.list_all() {
            let chain_id = network.id;
            let mut candidates: Vec<EndpointCandidate> = Vec::new();
            let mut push = |candidate: EndpointCandidate| -> Result<(), ChainError> {
                if !validate_url(&candidate.url) {
                    return Err(ChainError::InvalidEndpoint {
                        chain_id,
                        url: candidate.redacted,
                    });
                }
                if !candidates.iter().any(|c| c.url == candidate.url) {
                    candidates.push(candidate);
                }
                Ok(())
            };

            if let Some(url) = custom.get(&chain_id) {
                push(EndpointCandidate {
                    url: url.clone(),
                    source: CandidateSource::Custom,
                    redacted: url.clone(),
                })?;
            }

            if let Some(entry) = catalog.get(chain_id) {
                for template in &entry.providers {
                    if !template.url_template.contains(KEY_PLACEHOLDER) {
                        return Err(ChainError::InvalidEndpoint {
                            chain_id,
                            url: template.url_template.clone(),
                        });
                    }
                    let Some(key) = credentials.get(&template.provider) else {
                        debug!(chain_id, provider = %template.provider, "no credential, provider skipped");
                        continue;
                    };
                    push(EndpointCandidate {
                        url: template.render(key),
                        source: CandidateSource::Provider(template.provider.clone()),
                        redacted: template.render(REDACTED),
                    })?;
                }
                for url in &entry.public {
                    push(EndpointCandidate {
                        url: url.clone(),
                        source: CandidateSource::Public,
                        redacted: url.clone(),
                    })?;
                }
            }

            if candidates.is_empty() {
                return Err(ChainError::NoEndpoints(chain_id));
            }
            debug!(chain_id, count = candidates.len(), "endpoint candidates resolved");
            lists.insert(
                chain_id,
                EndpointCandidateList {
                    chain_id,
                    candidates,
                },
            );
        }

        Ok(Self { registry, lists })
    }

    /// Resolver over the built-in catalogue with no custom endpoints.
    pub fn with_builtin(
        registry: Arc<ChainRegistry>,
        credentials: &ProviderCredentials,
    ) -> Result<Self, ChainError> {
        Self::new(
            registry,
            &EndpointCatalog::builtin(),
            credentials,
            &BTreeMap::new(),
        )
    }

    /// Ordered candidates for a network.
    pub fn resolve(&self, chain_id: ChainId) -> Result<&EndpointCandidateList, ChainError> {
        self.lists
            .get(&chain_id)
            .ok_or(ChainError::UnknownNetwork(chain_id))
    }

    /// Whether the network is enabled in the registry (and therefore resolvable).
    pub fn supports(&self, chain_id: ChainId) -> bool {
        self.lists.contains_key(&chain_id)
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }
}

/// Validate that a URL is well-formed and uses HTTP or HTTPS.
pub fn validate_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            (scheme == "http" || scheme == "https") && parsed.host().is_some()
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NativeCurrency, NetworkDescriptor};

    fn alpha_beta() -> Arc<ChainRegistry> {
        let eth = NativeCurrency::new("Ether", "ETH", 18);
        Arc::new(
            ChainRegistry::new(
                vec![
                    NetworkDescriptor::new(1, "Alpha", eth.clone(), false),
                    NetworkDescriptor::new(2, "Beta", eth, false),
                ],
                false,
            )
            .unwrap(),
        )
    }

    fn alpha_beta_catalog() -> EndpointCatalog {
        EndpointCatalog::new()
            .with(
                1,
                NetworkEndpoints {
                    providers: vec![ProviderTemplate::new(
                        "alchemy",
                        "https://alpha.g.alchemy.com/v2/{key}",
                    )],
                    public: vec!["https://alpha.publicnode.com".into()],
                },
            )
            .with(
                2,
                NetworkEndpoints {
                    providers: vec![ProviderTemplate::new(
                        "alchemy",
                        "https://beta.g.alchemy.com/v2/{key}",
                    )],
                    public: vec![
                        "https://beta-1.example.com".into(),
                        "https://beta-2.example.com".into(),
                    ],
                },
            )
    }

    #[test]
    fn resolve_without_credentials_returns_fallbacks_in_order() {
        let resolver = EndpointResolver::new(
            alpha_beta(),
            &alpha_beta_catalog(),
            &ProviderCredentials::new(),
            &BTreeMap::new(),
        )
        .unwrap();

        let list = resolver.resolve(2).unwrap();
        assert_eq!(
            list.urls(),
            ["https://beta-1.example.com", "https://beta-2.example.com"]
        );
        assert!(list.iter().all(|c| c.source == CandidateSource::Public));
    }

    #[test]
    fn configured_credential_goes_first() {
        let creds = ProviderCredentials::new().with("alchemy", "k3y");
        let resolver =
            EndpointResolver::new(alpha_beta(), &alpha_beta_catalog(), &creds, &BTreeMap::new())
                .unwrap();

        let list = resolver.resolve(1).unwrap();
        assert_eq!(
            list.urls(),
            [
                "https://alpha.g.alchemy.com/v2/k3y",
                "https://alpha.publicnode.com"
            ]
        );
        assert_eq!(
            list.candidates()[0].redacted(),
            "https://alpha.g.alchemy.com/v2/***"
        );
        assert!(!format!("{list:?}").contains("k3y"));
    }

    #[test]
    fn blank_credential_never_produces_template_url() {
        let creds = ProviderCredentials::new().with("alchemy", "   ");
        assert!(creds.is_empty());

        let registry = Arc::new(ChainRegistry::builtin(true));
        let resolver = EndpointResolver::with_builtin(registry.clone(), &creds).unwrap();
        for id in registry.ids() {
            for url in resolver.resolve(id).unwrap().urls() {
                assert!(!url.contains("alchemy"), "{url}");
                assert!(!url.contains("infura"), "{url}");
                assert!(!url.ends_with('/'), "{url}");
            }
        }
    }

    #[test]
    fn every_registered_network_resolves_non_empty() {
        let registry = Arc::new(ChainRegistry::builtin(true));
        let resolver =
            EndpointResolver::with_builtin(registry.clone(), &ProviderCredentials::new()).unwrap();
        for id in registry.ids() {
            assert!(!resolver.resolve(id).unwrap().is_empty());
            assert!(resolver.supports(id));
        }
    }

    #[test]
    fn unknown_network_rejected() {
        let resolver = EndpointResolver::with_builtin(
            Arc::new(ChainRegistry::builtin(false)),
            &ProviderCredentials::new(),
        )
        .unwrap();
        assert_eq!(
            resolver.resolve(424242).unwrap_err(),
            ChainError::UnknownNetwork(424242)
        );
        // Disabled testnets stay known to the registry but are not resolvable.
        assert!(resolver.registry().contains(registry::SEPOLIA));
        assert!(!resolver.supports(registry::SEPOLIA));
        assert_eq!(
            resolver.resolve(registry::SEPOLIA).unwrap_err(),
            ChainError::UnknownNetwork(registry::SEPOLIA)
        );
    }

    #[test]
    fn network_without_endpoints_fails_construction() {
        let catalog = EndpointCatalog::new().with(
            1,
            NetworkEndpoints {
                providers: vec![],
                public: vec!["https://alpha.publicnode.com".into()],
            },
        );
        let err = EndpointResolver::new(
            alpha_beta(),
            &catalog,
            &ProviderCredentials::new(),
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, ChainError::NoEndpoints(2));
    }

    #[test]
    fn provider_only_network_without_key_fails_construction() {
        let catalog = alpha_beta_catalog().with(
            2,
            NetworkEndpoints {
                providers: vec![ProviderTemplate::new(
                    "alchemy",
                    "https://beta.g.alchemy.com/v2/{key}",
                )],
                public: vec![],
            },
        );
        let err = EndpointResolver::new(
            alpha_beta(),
            &catalog,
            &ProviderCredentials::new(),
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn custom_endpoint_takes_priority_and_dedupes() {
        let mut custom = BTreeMap::new();
        custom.insert(1, "https://alpha.publicnode.com".to_string());
        let resolver = EndpointResolver::new(
            alpha_beta(),
            &alpha_beta_catalog(),
            &ProviderCredentials::new(),
            &custom,
        )
        .unwrap();

        let list = resolver.resolve(1).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.candidates()[0].source, CandidateSource::Custom);
    }

    #[test]
    fn invalid_custom_endpoint_rejected() {
        let mut custom = BTreeMap::new();
        custom.insert(2, "ftp://files.example.com".to_string());
        let err = EndpointResolver::new(
            alpha_beta(),
            &alpha_beta_catalog(),
            &ProviderCredentials::new(),
            &custom,
        )
        .unwrap_err();
        assert!(matches!(err, ChainError::InvalidEndpoint { chain_id: 2, .. }));
    }

    #[test]
    fn validate_url_accepts_http_and_https() {
        assert!(validate_url("https://rpc.example.com"));
        assert!(validate_url("http://localhost:8545"));
    }

    #[test]
    fn validate_url_rejects_garbage() {
        assert!(!validate_url(""));
        assert!(!validate_url("not a url"));
        assert!(!validate_url("ftp://server.com"));
        assert!(!validate_url("file:///etc/passwd"));
    }
}
