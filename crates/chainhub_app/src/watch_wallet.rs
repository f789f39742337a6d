//! Watch-only wallet: a fixed address with no signing capability.

use async_trait::async_trait;
use chainhub_chains::{AccountId, ChainId, WalletConnection, WalletConnector, WalletError};
use parking_lot::Mutex;
use tracing::debug;

pub struct WatchOnlyWallet {
    account: AccountId,
    chain_id: Mutex<ChainId>,
}

impl WatchOnlyWallet {
    pub fn new(account: AccountId, chain_id: ChainId) -> Self {
        Self {
            account,
            chain_id: Mutex::new(chain_id),
        }
    }
}

#[async_trait]
impl WalletConnector for WatchOnlyWallet {
    fn name(&self) -> &str {
        "watch-only"
    }

    async fn request_connect(&self) -> Result<WalletConnection, WalletError> {
        Ok(WalletConnection {
            account: self.account.clone(),
            chain_id: *self.chain_id.lock(),
        })
    }

    async fn switch_network(&self, chain_id: ChainId) -> Result<(), WalletError> {
        debug!(chain_id, "watch-only wallet switching network");
        *self.chain_id.lock() = chain_id;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_current_network_after_switch() {
        let account = AccountId::parse("0x742d35Cc6634C0532925a3b844Bc9e7595f2bD18").unwrap();
        let wallet = WatchOnlyWallet::new(account.clone(), 1);

        wallet.switch_network(137).await.unwrap();
        let conn = wallet.request_connect().await.unwrap();
        assert_eq!(conn.account, account);
        assert_eq!(conn.chain_id, 137);
    }
}
