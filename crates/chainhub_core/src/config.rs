use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

const ENV_ALCHEMY_API_KEY: &str = "CHAINHUB_ALCHEMY_API_KEY";
const ENV_INFURA_API_KEY: &str = "CHAINHUB_INFURA_API_KEY";
const ENV_ENABLE_TESTNET: &str = "CHAINHUB_ENABLE_TESTNET";
const ENV_RPC_TIMEOUT_SECS: &str = "CHAINHUB_RPC_TIMEOUT_SECS";
const ENV_LOG_LEVEL: &str = "CHAINHUB_LOG_LEVEL";
const ENV_APP_NAME: &str = "CHAINHUB_APP_NAME";
const ENV_APP_URL: &str = "CHAINHUB_APP_URL";
const ENV_WALLETCONNECT_PROJECT_ID: &str = "CHAINHUB_WALLETCONNECT_PROJECT_ID";

/// Provider names used as keys in [`ChainHubConfig::api_keys`].
pub const PROVIDER_ALCHEMY: &str = "alchemy";
pub const PROVIDER_INFURA: &str = "infura";

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// ChainHubConfig
// ---------------------------------------------------------------------------

/// Application configuration stored at `~/.chainhub/config.json`, overlaid
/// with `CHAINHUB_*` environment variables.
///
/// Loaded once at startup. Provider API keys are **never** written to the
/// JSON file; they only come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainHubConfig {
    #[serde(skip)]
    pub alchemy_api_key: Option<String>,
    #[serde(skip)]
    pub infura_api_key: Option<String>,

    // Networks
    pub enable_testnets: bool,
    pub rpc_timeout_secs: u64,
    /// User-supplied RPC endpoint per chain id, tried before any provider.
    pub custom_rpc_urls: BTreeMap<u64, String>,

    // Presentation metadata (not used by the connectivity core)
    pub app_name: String,
    pub app_description: String,
    pub app_url: String,
    pub walletconnect_project_id: Option<String>,

    // General
    pub log_level: String,
}

impl Default for ChainHubConfig {
    fn default() -> Self {
        Self {
            alchemy_api_key: None,
            infura_api_key: None,
            enable_testnets: false,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            custom_rpc_urls: BTreeMap::new(),
            app_name: "ChainHub".into(),
            app_description: "Multi-Chain DApp Manager".into(),
            app_url: "https://localhost:3000".into(),
            walletconnect_project_id: None,
            log_level: "info".into(),
        }
    }
}

impl ChainHubConfig {
    /// Returns the base config directory: `~/.chainhub/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".chainhub"))
    }

    /// Returns the config file path: `~/.chainhub/config.json`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Returns the logs directory: `~/.chainhub/logs/`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Ensures all required directories exist.
    pub fn ensure_dirs() -> Result<()> {
        for dir in [Self::base_dir()?, Self::logs_dir()?] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Loads config from disk (creating the default file if missing) and
    /// applies environment overrides.
    pub fn load() -> Result<Self> {
        Self::ensure_dirs()?;
        let path = Self::config_path()?;
        let mut config = Self::load_from_path(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific file path. A missing file is created with
    /// defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Self =
                serde_json::from_str(&content).with_context(|| "Failed to parse config.json")?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Save config to a specific file path (API keys are excluded via
    /// `#[serde(skip)]`).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Overlay values from an arbitrary lookup. Unset or blank variables
    /// leave the current value alone; unparsable numbers are logged and
    /// ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = get(ENV_ALCHEMY_API_KEY) {
            self.alchemy_api_key = Some(key);
        }
        if let Some(key) = get(ENV_INFURA_API_KEY) {
            self.infura_api_key = Some(key);
        }
        if let Some(flag) = get(ENV_ENABLE_TESTNET) {
            self.enable_testnets = parse_flag(&flag);
        }
        if let Some(raw) = get(ENV_RPC_TIMEOUT_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => self.rpc_timeout_secs = secs,
                _ => warn!("Ignoring invalid {ENV_RPC_TIMEOUT_SECS}={raw}"),
            }
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(name) = get(ENV_APP_NAME) {
            self.app_name = name;
        }
        if let Some(url) = get(ENV_APP_URL) {
            self.app_url = url;
        }
        if let Some(id) = get(ENV_WALLETCONNECT_PROJECT_ID) {
            self.walletconnect_project_id = Some(id);
        }
    }

    /// Configured provider credentials keyed by provider name. Blank keys are
    /// treated as absent.
    pub fn api_keys(&self) -> BTreeMap<String, String> {
        [
            (PROVIDER_ALCHEMY, &self.alchemy_api_key),
            (PROVIDER_INFURA, &self.infura_api_key),
        ]
        .into_iter()
        .filter_map(|(provider, key)| {
            key.as_ref()
                .filter(|k| !k.trim().is_empty())
                .map(|k| (provider.to_string(), k.trim().to_string()))
        })
        .collect()
    }

    /// Per-candidate RPC timeout.
    pub fn rpc_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.rpc_timeout_secs.max(1))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_values() {
        let config = ChainHubConfig::default();
        assert!(config.alchemy_api_key.is_none());
        assert!(!config.enable_testnets);
        assert_eq!(config.rpc_timeout_secs, 10);
        assert_eq!(config.log_level, "info");
        assert!(config.api_keys().is_empty());
    }

    #[test]
    fn env_overlay_sets_credentials_and_flags() {
        let mut config = ChainHubConfig::default();
        config.apply_env_from(lookup_from(&[
            ("CHAINHUB_ALCHEMY_API_KEY", "abc123"),
            ("CHAINHUB_ENABLE_TESTNET", "true"),
            ("CHAINHUB_RPC_TIMEOUT_SECS", "3"),
        ]));

        assert_eq!(config.alchemy_api_key.as_deref(), Some("abc123"));
        assert!(config.enable_testnets);
        assert_eq!(config.rpc_timeout_secs, 3);
        assert_eq!(
            config.api_keys().get(PROVIDER_ALCHEMY).map(String::as_str),
            Some("abc123")
        );
        assert!(!config.api_keys().contains_key(PROVIDER_INFURA));
    }

    #[test]
    fn blank_credentials_are_ignored() {
        let mut config = ChainHubConfig::default();
        config.apply_env_from(lookup_from(&[("CHAINHUB_ALCHEMY_API_KEY", "   ")]));
        assert!(config.alchemy_api_key.is_none());

        config.infura_api_key = Some(String::new());
        assert!(config.api_keys().is_empty());
    }

    #[test]
    fn testnet_flag_parsing() {
        for (raw, expected) in [
            ("true", true),
            ("1", true),
            ("YES", true),
            ("false", false),
            ("0", false),
            ("nope", false),
        ] {
            let mut config = ChainHubConfig::default();
            config.enable_testnets = !expected;
            config.apply_env_from(lookup_from(&[("CHAINHUB_ENABLE_TESTNET", raw)]));
            assert_eq!(config.enable_testnets, expected, "flag value {raw}");
        }
    }

    #[test]
    fn invalid_timeout_is_ignored() {
        let mut config = ChainHubConfig::default();
        config.apply_env_from(lookup_from(&[("CHAINHUB_RPC_TIMEOUT_SECS", "soon")]));
        assert_eq!(config.rpc_timeout_secs, 10);

        config.apply_env_from(lookup_from(&[("CHAINHUB_RPC_TIMEOUT_SECS", "0")]));
        assert_eq!(config.rpc_timeout_secs, 10);
    }

    #[test]
    fn missing_file_creates_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let config = ChainHubConfig::load_from_path(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.rpc_timeout_secs, 10);
    }

    #[test]
    fn config_json_never_contains_api_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let mut config = ChainHubConfig::default();
        config.alchemy_api_key = Some("super-secret".into());
        config.custom_rpc_urls.insert(1, "https://my-node.example.com".into());
        config.save_to_path(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("super-secret"));

        let loaded = ChainHubConfig::load_from_path(&path).unwrap();
        assert!(loaded.alchemy_api_key.is_none());
        assert_eq!(
            loaded.custom_rpc_urls.get(&1).map(String::as_str),
            Some("https://my-node.example.com")
        );
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{ "enable_testnets": true }"#).unwrap();

        let loaded = ChainHubConfig::load_from_path(&path).unwrap();
        assert!(loaded.enable_testnets);
        assert_eq!(loaded.rpc_timeout_secs, 10);
        assert_eq!(loaded.app_name, "ChainHub");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(ChainHubConfig::load_from_path(&path).is_err());
    }
}
