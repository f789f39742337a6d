//! Connectivity session -- wallet connection state and the active network.
//!
//! ```text
//! Disconnected ──request_connect──▶ Connecting ──wallet ok──▶ Connected{account, chain}
//!      ▲                               │                          │
//!      └──────── rejected / unsupported┘                          │
//!      └──────────────────────── disconnect / wallet Disconnected ┘
//! ```
//!
//! Transitions are serialised under one lock and fanned out to every
//! subscriber in order.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::account::AccountId;
use crate::endpoints::EndpointResolver;
use crate::error::ChainError;
use crate::registry::{ChainId, NetworkDescriptor};
use crate::wallet::{WalletConnection, WalletConnector, WalletEvent};

// ---------------------------------------------------------------------------
// State & events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected { account: AccountId, chain_id: ChainId },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected { .. } => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn account(&self) -> Option<&AccountId> {
        match self {
            Self::Connected { account, .. } => Some(account),
            _ => None,
        }
    }

    pub fn chain_id(&self) -> Option<ChainId> {
        match self {
            Self::Connected { chain_id, .. } => Some(*chain_id),
            _ => None,
        }
    }
}

/// What happened in a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionKind {
    ConnectStarted,
    Connected,
    /// Connect attempt ended back in `Disconnected`.
    ConnectFailed(ChainError),
    /// Switch requested through [`ConnectivitySession::switch_network`].
    /// `from == to` when the active network was requested again.
    NetworkSwitched { from: ChainId, to: ChainId },
    /// Network changed from the wallet side.
    NetworkChanged { from: ChainId, to: ChainId },
    AccountChanged { previous: AccountId },
    /// The wallet moved to a network the registry does not carry. State is
    /// unchanged.
    UnsupportedNetwork(ChainId),
    Disconnected,
}

/// One published transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Strictly increasing per session.
    pub seq: u64,
    pub kind: TransitionKind,
    /// State after the transition.
    pub state: SessionState,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Inner {
    state: SessionState,
    last_error: Option<ChainError>,
    seq: u64,
    /// Bumped per connect attempt and on disconnect so a late wallet answer
    /// can be recognised.
    attempt: u64,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl Inner {
    fn publish(&mut self, kind: TransitionKind) {
        self.seq += 1;
        let event = SessionEvent {
            seq: self.seq,
            kind,
            state: self.state.clone(),
        };
        debug!(seq = event.seq, kind = ?event.kind, state = event.state.label(), "session transition");
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn transition(&mut self, state: SessionState, kind: TransitionKind) {
        self.state = state;
        self.publish(kind);
    }

    fn invalid(&self, operation: &'static str) -> ChainError {
        ChainError::InvalidTransition {
            operation,
            state: self.state.label(),
        }
    }
}

pub struct ConnectivitySession {
    resolver: Arc<EndpointResolver>,
    wallet: Arc<dyn WalletConnector>,
    inner: Mutex<Inner>,
}

impl ConnectivitySession {
    pub fn new(resolver: Arc<EndpointResolver>, wallet: Arc<dyn WalletConnector>) -> Self {
        Self {
            resolver,
            wallet,
            inner: Mutex::new(Inner {
                state: SessionState::Disconnected,
                last_error: None,
                seq: 0,
                attempt: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Register an observer. It receives every later transition, in order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// Connect through the wallet. Only valid from `Disconnected`.
    pub async fn request_connect(&self) -> Result<WalletConnection, ChainError> {
        let attempt = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Disconnected {
                return Err(inner.invalid("connect"));
            }
            inner.attempt += 1;
            inner.last_error = None;
            inner.transition(SessionState::Connecting, TransitionKind::ConnectStarted);
            inner.attempt
        };

        debug!(wallet = self.wallet.name(), "requesting wallet connection");
        let outcome = self.wallet.request_connect().await;

        let mut inner = self.inner.lock();
        if inner.attempt != attempt || inner.state != SessionState::Connecting {
            debug!("wallet answered after disconnect, discarding");
            return Err(ChainError::ConnectionRejected(
                "disconnected while connecting".into(),
            ));
        }

        let result = match outcome {
            Ok(conn) if self.resolver.supports(conn.chain_id) => Ok(conn),
            Ok(conn) => {
                warn!(chain_id = conn.chain_id, "wallet connected on unsupported network");
                Err(ChainError::UnsupportedNetwork(conn.chain_id))
            }
            Err(e) => Err(ChainError::from(e)),
        };

        match result {
            Ok(conn) => {
                info!(account = %conn.account, chain_id = conn.chain_id, "wallet connected");
                inner.transition(
                    SessionState::Connected {
                        account: conn.account.clone(),
                        chain_id: conn.chain_id,
                    },
                    TransitionKind::Connected,
                );
                Ok(conn)
            }
            Err(e) => {
                warn!(error = %e, "wallet connection failed");
                inner.last_error = Some(e.clone());
                inner.transition(
                    SessionState::Disconnected,
                    TransitionKind::ConnectFailed(e.clone()),
                );
                Err(e)
            }
        }
    }

    /// Ask the wallet to move to `target`. Only valid from `Connected`.
    ///
    /// An unregistered target fails before the wallet is asked. A rejected
    /// switch keeps the current network. Requesting the active network skips
    /// the wallet and publishes `NetworkSwitched { from: c, to: c }` so that
    /// subscribers re-read it.
    pub async fn switch_network(&self, target: ChainId) -> Result<(), ChainError> {
        {
            let mut inner = self.inner.lock();
            let Some(current) = inner.state.chain_id() else {
                return Err(inner.invalid("switch network"));
            };
            if !self.resolver.supports(target) {
                return Err(ChainError::UnsupportedNetwork(target));
            }
            if current == target {
                debug!(target, "already on requested network");
                inner.last_error = None;
                inner.publish(TransitionKind::NetworkSwitched {
                    from: current,
                    to: target,
                });
                return Ok(());
            }
        }

        debug!(target, "requesting network switch");
        let outcome = self.wallet.switch_network(target).await;

        let mut inner = self.inner.lock();
        if let Err(e) = outcome {
            let err = ChainError::from(e);
            warn!(target, error = %err, "network switch failed");
            inner.last_error = Some(err.clone());
            return Err(err);
        }

        match inner.state.clone() {
            SessionState::Connected { account, chain_id } => {
                if chain_id != target {
                    inner.last_error = None;
                    inner.transition(
                        SessionState::Connected {
                            account,
                            chain_id: target,
                        },
                        TransitionKind::NetworkSwitched {
                            from: chain_id,
                            to: target,
                        },
                    );
                }
                Ok(())
            }
            _ => Err(inner.invalid("switch network")),
        }
    }

    /// Apply an unsolicited wallet notification. Returns whether observers
    /// were notified.
    pub fn handle_wallet_event(&self, event: WalletEvent) -> bool {
        let mut inner = self.inner.lock();

        if event == WalletEvent::Disconnected {
            if inner.state == SessionState::Disconnected {
                return false;
            }
            info!("wallet disconnected");
            inner.attempt += 1;
            inner.transition(SessionState::Disconnected, TransitionKind::Disconnected);
            return true;
        }

        let SessionState::Connected { account, chain_id } = inner.state.clone() else {
            debug!(?event, state = inner.state.label(), "wallet event ignored");
            return false;
        };

        match event {
            WalletEvent::AccountChanged(next) => {
                if next == account {
                    return false;
                }
                info!(from = %account.short(), to = %next.short(), "account changed");
                inner.transition(
                    SessionState::Connected {
                        account: next,
                        chain_id,
                    },
                    TransitionKind::AccountChanged { previous: account },
                );
                true
            }
            WalletEvent::NetworkChanged(next) => {
                if next == chain_id {
                    return false;
                }
                if !self.resolver.supports(next) {
                    warn!(chain_id = next, "wallet switched to unsupported network");
                    inner.last_error = Some(ChainError::UnsupportedNetwork(next));
                    inner.publish(TransitionKind::UnsupportedNetwork(next));
                    return true;
                }
                inner.last_error = None;
                inner.transition(
                    SessionState::Connected {
                        account,
                        chain_id: next,
                    },
                    TransitionKind::NetworkChanged {
                        from: chain_id,
                        to: next,
                    },
                );
                true
            }
            WalletEvent::Disconnected => false,
        }
    }

    /// Drain a wallet event channel until its sender side closes.
    pub async fn run_wallet_events(&self, mut events: mpsc::Receiver<WalletEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_wallet_event(event);
        }
        debug!("wallet event channel closed");
    }

    /// Drop the connection. A no-op when already disconnected.
    pub async fn disconnect(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Disconnected {
                return;
            }
            inner.attempt += 1;
            inner.transition(SessionState::Disconnected, TransitionKind::Disconnected);
        }
        info!("session disconnected");

        if let Err(e) = self.wallet.disconnect().await {
            warn!(error = %e, "wallet disconnect failed");
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    pub fn account(&self) -> Option<AccountId> {
        self.inner.lock().state.account().cloned()
    }

    pub fn active_chain(&self) -> Option<ChainId> {
        self.inner.lock().state.chain_id()
    }

    /// Descriptor of the active network, when connected.
    pub fn active_network(&self) -> Option<NetworkDescriptor> {
        let chain_id = self.active_chain()?;
        self.resolver.registry().by_id(chain_id).ok().cloned()
    }

    pub fn last_error(&self) -> Option<ChainError> {
        self.inner.lock().last_error.clone()
    }

    pub fn resolver(&self) -> &Arc<EndpointResolver> {
        &self.resolver
    }
}

impl std::fmt::Debug for ConnectivitySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivitySession")
            .field("wallet", &self.wallet.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::endpoints::{EndpointCatalog, NetworkEndpoints, ProviderCredentials};
    use crate::registry::{ChainRegistry, NativeCurrency};
    use crate::wallet::WalletError;

    const ADDR_A: &str = "0x1111111111111111111111111111111111111111";
    const ADDR_B: &str = "0x2222222222222222222222222222222222222222";

    fn resolver() -> Arc<EndpointResolver> {
        let eth = NativeCurrency::new("Ether", "ETH", 18);
        let registry = ChainRegistry::new(
            vec![
                NetworkDescriptor::new(1, "Alpha", eth.clone(), false),
                NetworkDescriptor::new(2, "Beta", eth.clone(), false),
                NetworkDescriptor::new(3, "Gamma", eth, true),
            ],
            false,
        )
        .unwrap();
        let public = |url: &str| NetworkEndpoints {
            providers: vec![],
            public: vec![url.to_string()],
        };
        let catalog = EndpointCatalog::new()
            .with(1, public("https://alpha.example.com"))
            .with(2, public("https://beta.example.com"));
        Arc::new(
            EndpointResolver::new(
                Arc::new(registry),
                &catalog,
                &ProviderCredentials::new(),
                &BTreeMap::new(),
            )
            .unwrap(),
        )
    }

    struct MockWallet {
        connect: parking_lot::Mutex<Result<WalletConnection, WalletError>>,
        switch: parking_lot::Mutex<Result<(), WalletError>>,
        gate: Option<Arc<Notify>>,
        connect_calls: AtomicUsize,
        switch_calls: AtomicUsize,
        disconnect_calls: AtomicUsize,
    }

    impl MockWallet {
        fn on(chain_id: ChainId) -> Self {
            Self {
                connect: parking_lot::Mutex::new(Ok(WalletConnection {
                    account: AccountId::parse(ADDR_A).unwrap(),
                    chain_id,
                })),
                switch: parking_lot::Mutex::new(Ok(())),
                gate: None,
                connect_calls: AtomicUsize::new(0),
                switch_calls: AtomicUsize::new(0),
                disconnect_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WalletConnector for MockWallet {
        fn name(&self) -> &str {
            "mock"
        }

        async fn request_connect(&self) -> Result<WalletConnection, WalletError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.connect.lock().clone()
        }

        async fn switch_network(&self, _chain_id: ChainId) -> Result<(), WalletError> {
            self.switch_calls.fetch_add(1, Ordering::SeqCst);
            self.switch.lock().clone()
        }

        async fn disconnect(&self) -> Result<(), WalletError> {
            self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
            Err(WalletError::Failed("already gone".into()))
        }
    }

    async fn connected(wallet: Arc<MockWallet>) -> ConnectivitySession {
        let session = ConnectivitySession::new(resolver(), wallet);
        session.request_connect().await.unwrap();
        session
    }

    #[tokio::test]
    async fn connect_reaches_connected() {
        let session = ConnectivitySession::new(resolver(), Arc::new(MockWallet::on(1)));
        let mut rx = session.subscribe();

        let conn = session.request_connect().await.unwrap();
        assert_eq!(conn.chain_id, 1);
        assert_eq!(session.active_chain(), Some(1));
        assert_eq!(session.active_network().unwrap().name, "Alpha");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, TransitionKind::ConnectStarted);
        assert_eq!(first.state, SessionState::Connecting);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, TransitionKind::Connected);
        assert!(second.seq > first.seq);
    }

    #[tokio::test]
    async fn connect_twice_is_invalid() {
        let session = connected(Arc::new(MockWallet::on(1))).await;
        let err = session.request_connect().await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn rejected_connect_returns_to_disconnected() {
        let wallet = MockWallet::on(1);
        *wallet.connect.lock() = Err(WalletError::Rejected("user closed modal".into()));
        let session = ConnectivitySession::new(resolver(), Arc::new(wallet));

        let err = session.request_connect().await.unwrap_err();
        assert!(matches!(err, ChainError::ConnectionRejected(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.last_error(), Some(err));
    }

    #[tokio::test]
    async fn connect_on_unregistered_network_is_unsupported() {
        let session = ConnectivitySession::new(resolver(), Arc::new(MockWallet::on(250)));
        let err = session.request_connect().await.unwrap_err();
        assert_eq!(err, ChainError::UnsupportedNetwork(250));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.active_chain(), None);
        assert_eq!(session.last_error(), Some(ChainError::UnsupportedNetwork(250)));
    }

    #[tokio::test]
    async fn switch_to_unknown_network_leaves_state_and_skips_wallet() {
        let wallet = Arc::new(MockWallet::on(1));
        let session = connected(wallet.clone()).await;
        let before = session.state();
        let mut rx = session.subscribe();

        let err = session.switch_network(9999).await.unwrap_err();
        assert_eq!(err, ChainError::UnsupportedNetwork(9999));
        assert_eq!(session.state(), before);
        assert_eq!(wallet.switch_calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn switch_updates_chain_and_keeps_account() {
        let wallet = Arc::new(MockWallet::on(1));
        let session = connected(wallet.clone()).await;
        let mut rx = session.subscribe();

        session.switch_network(2).await.unwrap();
        assert_eq!(session.active_chain(), Some(2));
        assert_eq!(session.account().unwrap().as_str(), ADDR_A);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, TransitionKind::NetworkSwitched { from: 1, to: 2 });
        assert_eq!(wallet.switch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn switch_to_disabled_testnet_is_unsupported() {
        let wallet = Arc::new(MockWallet::on(1));
        let session = connected(wallet.clone()).await;
        assert!(session.resolver().registry().contains(3));

        let err = session.switch_network(3).await.unwrap_err();
        assert_eq!(err, ChainError::UnsupportedNetwork(3));
        assert_eq!(session.active_chain(), Some(1));
        assert_eq!(wallet.switch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn switch_to_active_network_republishes_without_wallet() {
        let wallet = Arc::new(MockWallet::on(1));
        let session = connected(wallet.clone()).await;
        let mut rx = session.subscribe();
        let before = session.state();

        session.switch_network(1).await.unwrap();
        assert_eq!(session.state(), before);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, TransitionKind::NetworkSwitched { from: 1, to: 1 });
        assert_eq!(event.state, before);
        assert_eq!(wallet.switch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_switch_keeps_previous_network() {
        let wallet = Arc::new(MockWallet::on(1));
        let session = connected(wallet.clone()).await;
        *wallet.switch.lock() = Err(WalletError::Rejected("no".into()));
        let mut rx = session.subscribe();

        let err = session.switch_network(2).await.unwrap_err();
        assert!(matches!(err, ChainError::ConnectionRejected(_)));
        assert_eq!(session.active_chain(), Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn switch_while_disconnected_is_invalid() {
        let session = ConnectivitySession::new(resolver(), Arc::new(MockWallet::on(1)));
        let err = session.switch_network(2).await.unwrap_err();
        assert_eq!(
            err,
            ChainError::InvalidTransition {
                operation: "switch network",
                state: "disconnected"
            }
        );
    }

    #[tokio::test]
    async fn wallet_events_update_in_place() {
        let session = connected(Arc::new(MockWallet::on(1))).await;
        let mut rx = session.subscribe();
        let b = AccountId::parse(ADDR_B).unwrap();

        assert!(session.handle_wallet_event(WalletEvent::AccountChanged(b.clone())));
        assert!(!session.handle_wallet_event(WalletEvent::AccountChanged(b.clone())));
        assert!(session.handle_wallet_event(WalletEvent::NetworkChanged(2)));
        assert!(!session.handle_wallet_event(WalletEvent::NetworkChanged(2)));

        let e1 = rx.recv().await.unwrap();
        assert!(matches!(e1.kind, TransitionKind::AccountChanged { .. }));
        assert_eq!(e1.state.account(), Some(&b));
        let e2 = rx.recv().await.unwrap();
        assert_eq!(e2.kind, TransitionKind::NetworkChanged { from: 1, to: 2 });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn wallet_reports_unsupported_network() {
        let session = connected(Arc::new(MockWallet::on(1))).await;
        let mut rx = session.subscribe();

        assert!(session.handle_wallet_event(WalletEvent::NetworkChanged(250)));
        assert_eq!(session.active_chain(), Some(1));
        assert_eq!(session.last_error(), Some(ChainError::UnsupportedNetwork(250)));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, TransitionKind::UnsupportedNetwork(250));
        assert_eq!(event.state.chain_id(), Some(1));
    }

    #[tokio::test]
    async fn events_outside_connected_are_ignored() {
        let session = ConnectivitySession::new(resolver(), Arc::new(MockWallet::on(1)));
        assert!(!session.handle_wallet_event(WalletEvent::NetworkChanged(2)));
        assert!(!session.handle_wallet_event(WalletEvent::Disconnected));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_clears_state_even_if_wallet_fails() {
        let wallet = Arc::new(MockWallet::on(1));
        let session = connected(wallet.clone()).await;

        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.account(), None);
        assert_eq!(wallet.disconnect_calls.load(Ordering::SeqCst), 1);

        // Second disconnect is a no-op.
        session.disconnect().await;
        assert_eq!(wallet.disconnect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_during_connect_wins() {
        let gate = Arc::new(Notify::new());
        let mut wallet = MockWallet::on(1);
        wallet.gate = Some(gate.clone());
        let session = Arc::new(ConnectivitySession::new(resolver(), Arc::new(wallet)));

        let connecting = {
            let session = session.clone();
            tokio::spawn(async move { session.request_connect().await })
        };
        while session.state() != SessionState::Connecting {
            tokio::task::yield_now().await;
        }
        session.disconnect().await;
        gate.notify_one();

        assert!(connecting.await.unwrap().is_err());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn run_wallet_events_drains_channel() {
        let session = connected(Arc::new(MockWallet::on(1))).await;
        let (tx, rx) = mpsc::channel(8);
        tx.send(WalletEvent::NetworkChanged(2)).await.unwrap();
        tx.send(WalletEvent::Disconnected).await.unwrap();
        drop(tx);

        session.run_wallet_events(rx).await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let session = ConnectivitySession::new(resolver(), Arc::new(MockWallet::on(1)));
        let rx = session.subscribe();
        let mut kept = session.subscribe();
        drop(rx);

        session.request_connect().await.unwrap();
        assert_eq!(session.inner.lock().subscribers.len(), 1);
        assert_eq!(kept.recv().await.unwrap().seq, 1);
    }
}
