//! Plain-text tables for the terminal.

use std::fmt::Write;

use chainhub_chains::{
    BalanceBoard, CandidateSource, ChainId, ChainRegistry, EndpointCandidateList, SnapshotState,
};

pub fn networks_table(registry: &ChainRegistry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>10}  {:<20} {:<6} {:<8} EXPLORER", "ID", "NAME", "SYMBOL", "KIND");
    for network in registry.list_all() {
        let _ = writeln!(
            out,
            "{:>10}  {:<20} {:<6} {:<8} {}",
            network.id,
            network.name,
            network.native_currency.symbol,
            if network.is_testnet { "testnet" } else { "mainnet" },
            network.explorer_base_url,
        );
    }
    out
}

pub fn endpoints_table(list: &EndpointCandidateList) -> String {
    let mut out = String::new();
    for (i, candidate) in list.iter().enumerate() {
        let source = match &candidate.source {
            CandidateSource::Custom => "custom".to_string(),
            CandidateSource::Provider(name) => name.clone(),
            CandidateSource::Public => "public".to_string(),
        };
        let _ = writeln!(out, "{:>2}. {:<8} {}", i + 1, source, candidate.redacted());
    }
    out
}

pub fn balances_table(
    board: &BalanceBoard,
    registry: &ChainRegistry,
    active: Option<ChainId>,
    precision: usize,
) -> String {
    let mut out = String::new();
    if let Some(account) = board.account() {
        let _ = writeln!(out, "Account {account}");
    }
    for snapshot in board.iter() {
        let name = registry
            .by_id(snapshot.chain_id)
            .map(|n| n.name.as_str())
            .unwrap_or("?");
        let marker = if active == Some(snapshot.chain_id) { "*" } else { " " };
        let value = match &snapshot.state {
            SnapshotState::Loading => "loading...".to_string(),
            SnapshotState::Ready { .. } => format!(
                "{} {}",
                snapshot.display_amount(precision).unwrap_or_default(),
                snapshot.symbol
            ),
            SnapshotState::Failed { failure } => format!(
                "unavailable ({:?} after {} attempt(s))",
                failure.kind, failure.attempts
            ),
        };
        let _ = writeln!(out, "{marker} {:<20} {value}", name);
    }
    let _ = writeln!(
        out,
        "{} ready, {} failed, {} loading",
        board.ready_count(),
        board.failed_count(),
        board.loading_count()
    );
    out
}
