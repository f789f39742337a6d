//! Balance aggregator -- one native-balance read per registered network.
//!
//! Reads run as independent tokio tasks and report back through a results
//! channel. Every result is tagged with the account epoch and a per-network
//! request number; the join task applies it only if both are still current,
//! so an account switch or a re-issued read silently outdates older answers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chainhub_core::ChainHubConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::account::AccountId;
use crate::endpoints::{EndpointCandidateList, EndpointResolver};
use crate::error::ChainError;
use crate::reader::{BalanceReader, ReadError};
use crate::registry::{ChainId, ChainRegistry, NetworkDescriptor};
use crate::session::{SessionEvent, TransitionKind};
use crate::units;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Transport,
    Rpc,
    InvalidResponse,
}

impl From<&ReadError> for FailureKind {
    fn from(err: &ReadError) -> Self {
        match err {
            ReadError::Timeout => Self::Timeout,
            ReadError::Transport(_) => Self::Transport,
            ReadError::Rpc { .. } => Self::Rpc,
            ReadError::InvalidResponse(_) => Self::InvalidResponse,
        }
    }
}

/// Why a network's read gave up, after every candidate was tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceFailure {
    /// Classification of the last candidate's error.
    pub kind: FailureKind,
    pub attempts: usize,
    pub message: String,
}

impl BalanceFailure {
    pub fn to_error(&self, chain_id: ChainId) -> ChainError {
        ChainError::EndpointExhausted {
            chain_id,
            attempts: self.attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SnapshotState {
    Loading,
    Ready { amount_raw: String },
    Failed { failure: BalanceFailure },
}

static IMPLICIT_LOADING: SnapshotState = SnapshotState::Loading;

/// Native balance of the observed account on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub chain_id: ChainId,
    pub state: SnapshotState,
    pub decimals: u8,
    pub symbol: String,
    pub updated_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    fn loading(network: &NetworkDescriptor) -> Self {
        Self {
            chain_id: network.id,
            state: SnapshotState::Loading,
            decimals: network.native_currency.decimals,
            symbol: network.native_currency.symbol.clone(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SnapshotState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SnapshotState::Ready { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SnapshotState::Failed { .. })
    }

    pub fn amount_raw(&self) -> Option<&str> {
        match &self.state {
            SnapshotState::Ready { amount_raw } => Some(amount_raw),
            _ => None,
        }
    }

    /// Whole-unit amount truncated to `max_fraction_digits`, when ready.
    pub fn display_amount(&self, max_fraction_digits: usize) -> Option<String> {
        let formatted = units::format_units(self.amount_raw()?, self.decimals)?;
        Some(units::truncate_fraction(&formatted, max_fraction_digits))
    }
}

// ---------------------------------------------------------------------------
// BalanceBoard
// ---------------------------------------------------------------------------

/// Every network's snapshot for the observed account.
#[derive(Debug, Clone, Default)]
pub struct BalanceBoard {
    account: Option<AccountId>,
    epoch: u64,
    order: Vec<ChainId>,
    snapshots: HashMap<ChainId, BalanceSnapshot>,
}

impl BalanceBoard {
    fn reset(&mut self, account: Option<AccountId>, epoch: u64, registry: &ChainRegistry) {
        self.account = account;
        self.epoch = epoch;
        self.snapshots.clear();
        self.order.clear();
        if self.account.is_some() {
            for network in registry.list_all() {
                self.order.push(network.id);
                self.snapshots
                    .insert(network.id, BalanceSnapshot::loading(network));
            }
        }
    }

    fn set_state(&mut self, chain_id: ChainId, state: SnapshotState) {
        if let Some(snapshot) = self.snapshots.get_mut(&chain_id) {
            snapshot.state = state;
            snapshot.updated_at = Utc::now();
        }
    }

    pub fn account(&self) -> Option<&AccountId> {
        self.account.as_ref()
    }

    /// Bumped every time the observed account changes or is cleared.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&BalanceSnapshot> {
        self.snapshots.get(&chain_id)
    }

    /// State of a network's balance. A missing snapshot reads as `Loading`.
    pub fn state_of(&self, chain_id: ChainId) -> &SnapshotState {
        self.snapshots
            .get(&chain_id)
            .map(|s| &s.state)
            .unwrap_or(&IMPLICIT_LOADING)
    }

    /// Snapshots in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &BalanceSnapshot> + '_ {
        self.order.iter().filter_map(|id| self.snapshots.get(id))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.snapshots.values().filter(|s| s.is_ready()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.snapshots.values().filter(|s| s.is_failed()).count()
    }

    pub fn loading_count(&self) -> usize {
        self.snapshots.values().filter(|s| s.is_loading()).count()
    }

    /// Whether an account is observed and no network is still loading.
    pub fn is_settled(&self) -> bool {
        self.account.is_some() && self.loading_count() == 0
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Upper bound for a single endpoint attempt.
    pub candidate_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            candidate_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ChainHubConfig> for AggregatorConfig {
    fn from(config: &ChainHubConfig) -> Self {
        Self {
            candidate_timeout: config.rpc_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

struct ReadOutcome {
    account: AccountId,
    epoch: u64,
    chain_id: ChainId,
    request_seq: u64,
    result: Result<String, BalanceFailure>,
}

#[derive(Default)]
struct Tracking {
    account: Option<AccountId>,
    epoch: u64,
    next_request: u64,
    /// Latest request number per network; only its result is applied.
    latest: HashMap<ChainId, u64>,
}

struct Core {
    tracking: Mutex<Tracking>,
    board: watch::Sender<BalanceBoard>,
}

impl Core {
    fn apply(&self, outcome: ReadOutcome) {
        let tracking = self.tracking.lock();
        let current = tracking.account.as_ref() == Some(&outcome.account)
            && tracking.epoch == outcome.epoch
            && tracking.latest.get(&outcome.chain_id) == Some(&outcome.request_seq);
        if !current {
            debug!(
                chain_id = outcome.chain_id,
                epoch = outcome.epoch,
                request = outcome.request_seq,
                "stale balance result discarded"
            );
            return;
        }

        let state = match outcome.result {
            Ok(amount_raw) => SnapshotState::Ready { amount_raw },
            Err(failure) => SnapshotState::Failed { failure },
        };
        debug!(chain_id = outcome.chain_id, ?state, "balance updated");
        self.board
            .send_modify(|board| board.set_state(outcome.chain_id, state));
    }
}

/// Keeps a [`BalanceBoard`] current for one observed account at a time.
///
/// Must be created inside a tokio runtime; it spawns the task that applies
/// read results.
pub struct BalanceAggregator {
    resolver: Arc<EndpointResolver>,
    reader: Arc<dyn BalanceReader>,
    config: AggregatorConfig,
    core: Arc<Core>,
    results: mpsc::UnboundedSender<ReadOutcome>,
    join: JoinHandle<()>,
}

impl BalanceAggregator {
    pub fn new(
        resolver: Arc<EndpointResolver>,
        reader: Arc<dyn BalanceReader>,
        config: AggregatorConfig,
    ) -> Self {
        let (board, _) = watch::channel(BalanceBoard::default());
        let core = Arc::new(Core {
            tracking: Mutex::new(Tracking::default()),
            board,
        });
        let (results, mut rx) = mpsc::unbounded_channel::<ReadOutcome>();

        let join = tokio::spawn({
            let core = Arc::clone(&core);
            async move {
                while let Some(outcome) = rx.recv().await {
                    core.apply(outcome);
                }
            }
        });

        Self {
            resolver,
            reader,
            config,
            core,
            results,
            join,
        }
    }

    /// Start (or keep) observing `account` and return a live view of its
    /// balances.
    ///
    /// A different account than the current one discards every snapshot,
    /// resets all registered networks to `Loading` and issues a fresh read
    /// for each.
    pub fn observe_all(&self, account: AccountId) -> watch::Receiver<BalanceBoard> {
        let mut tracking = self.core.tracking.lock();
        if tracking.account.as_ref() != Some(&account) {
            tracking.epoch += 1;
            tracking.account = Some(account.clone());
            tracking.latest.clear();
            info!(account = %account.short(), epoch = tracking.epoch, "observing balances");

            let epoch = tracking.epoch;
            let registry = self.resolver.registry();
            self.core
                .board
                .send_modify(|board| board.reset(Some(account.clone()), epoch, registry));

            for network in registry.list_all() {
                self.issue_read(&mut tracking, network.id);
            }
        }
        self.core.board.subscribe()
    }

    /// Re-read the newly active network, whatever its current state. Other
    /// networks are left alone.
    pub fn on_active_network_changed(&self, chain_id: ChainId) -> Result<(), ChainError> {
        self.resolver.resolve(chain_id)?;
        let mut tracking = self.core.tracking.lock();
        if tracking.account.is_none() {
            return Err(ChainError::NoAccount);
        }
        debug!(chain_id, "active network changed, re-reading");
        self.issue_read(&mut tracking, chain_id);
        Ok(())
    }

    /// Manual retry: back to `Loading` and read again.
    pub fn retry(&self, chain_id: ChainId) -> Result<(), ChainError> {
        self.resolver.resolve(chain_id)?;
        let mut tracking = self.core.tracking.lock();
        if tracking.account.is_none() {
            return Err(ChainError::NoAccount);
        }
        self.core
            .board
            .send_modify(|board| board.set_state(chain_id, SnapshotState::Loading));
        self.issue_read(&mut tracking, chain_id);
        Ok(())
    }

    /// Stop observing. Drops the account and every snapshot.
    pub fn clear(&self) {
        let mut tracking = self.core.tracking.lock();
        if tracking.account.is_none() {
            return;
        }
        tracking.account = None;
        tracking.epoch += 1;
        tracking.latest.clear();
        let epoch = tracking.epoch;
        let registry = self.resolver.registry();
        self.core
            .board
            .send_modify(|board| board.reset(None, epoch, registry));
        info!("balance observation cleared");
    }

    /// Route a session transition to the matching operation.
    pub fn handle_session_event(&self, event: &SessionEvent) {
        match &event.kind {
            TransitionKind::Connected | TransitionKind::AccountChanged { .. } => {
                if let Some(account) = event.state.account() {
                    self.observe_all(account.clone());
                }
            }
            TransitionKind::NetworkSwitched { to, .. }
            | TransitionKind::NetworkChanged { to, .. } => {
                if let Err(e) = self.on_active_network_changed(*to) {
                    warn!(chain_id = *to, error = %e, "could not re-read active network");
                }
            }
            TransitionKind::Disconnected | TransitionKind::ConnectFailed(_) => self.clear(),
            TransitionKind::ConnectStarted | TransitionKind::UnsupportedNetwork(_) => {}
        }
    }

    /// Apply session transitions until the subscription ends.
    pub async fn follow_session(&self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_session_event(&event);
        }
    }

    /// A receiver for the board, without changing what is observed.
    pub fn subscribe(&self) -> watch::Receiver<BalanceBoard> {
        self.core.board.subscribe()
    }

    /// Copy of the current board.
    pub fn board(&self) -> BalanceBoard {
        self.core.board.borrow().clone()
    }

    pub fn account(&self) -> Option<AccountId> {
        self.core.tracking.lock().account.clone()
    }

    fn issue_read(&self, tracking: &mut Tracking, chain_id: ChainId) {
        let Some(account) = tracking.account.clone() else {
            return;
        };
        let candidates = match self.resolver.resolve(chain_id) {
            Ok(list) => list.clone(),
            Err(e) => {
                warn!(chain_id, error = %e, "no candidates, read skipped");
                return;
            }
        };

        tracking.next_request += 1;
        let request_seq = tracking.next_request;
        tracking.latest.insert(chain_id, request_seq);
        let epoch = tracking.epoch;

        let reader = Arc::clone(&self.reader);
        let results = self.results.clone();
        let timeout = self.config.candidate_timeout;
        tokio::spawn(async move {
            let result = read_with_fallback(reader.as_ref(), &candidates, &account, timeout).await;
            let _ = results.send(ReadOutcome {
                account,
                epoch,
                chain_id,
                request_seq,
                result,
            });
        });
    }
}

impl Drop for BalanceAggregator {
    fn drop(&mut self) {
        self.join.abort();
    }
}

impl std::fmt::Debug for BalanceAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceAggregator")
            .field("config", &self.config)
            .field("account", &self.account())
            .finish()
    }
}

/// Try each candidate in order until one answers with a valid amount.
async fn read_with_fallback(
    reader: &dyn BalanceReader,
    candidates: &EndpointCandidateList,
    account: &AccountId,
    timeout: Duration,
) -> Result<String, BalanceFailure> {
    let chain_id = candidates.chain_id();
    let mut attempts = 0;
    let mut last = ReadError::Transport("no endpoints".into());

    for candidate in candidates {
        attempts += 1;
        debug!(chain_id, endpoint = candidate.redacted(), attempt = attempts, "reading balance");

        let outcome =
            match tokio::time::timeout(timeout, reader.read_balance(&candidate.url, account, chain_id))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ReadError::Timeout),
            };

        match outcome.and_then(|raw| {
            units::normalize_decimal(&raw)
                .ok_or_else(|| ReadError::InvalidResponse(format!("not a decimal amount: {raw}")))
        }) {
            Ok(amount) => return Ok(amount),
            Err(e) => {
                warn!(chain_id, endpoint = candidate.redacted(), error = %e, "endpoint failed");
                last = e;
            }
        }
    }

    Err(BalanceFailure {
        kind: FailureKind::from(&last),
        attempts,
        message: last.to_string(),
    })
}
