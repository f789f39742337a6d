mod cli;
mod render;
mod watch_wallet;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};

use chainhub_chains::{
    AccountId, AggregatorConfig, BalanceAggregator, BalanceBoard, ChainRegistry,
    ConnectivitySession, EndpointCatalog, EndpointResolver, JsonRpcBalanceReader,
    ProviderCredentials,
};
use chainhub_core::config::ChainHubConfig;
use chainhub_core::{classify_error, logging};

use crate::cli::{Cli, Commands};
use crate::watch_wallet::WatchOnlyWallet;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extra slack on top of the worst-case candidate walk before giving up on
/// networks that are still loading.
const SETTLE_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let classified = classify_error(&e);
            error!(category = ?classified.category, "{e:#}");
            eprintln!("error: {}", classified.user_message);
            eprintln!("  {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = ChainHubConfig::load_from_path(path)?;
            config.apply_env();
            config
        }
        None => ChainHubConfig::load()?,
    };
    if cli.testnets {
        config.enable_testnets = true;
    }

    let _log_guard = logging::init_logging(&config)?;
    info!("Starting {} v{VERSION}", config.app_name);

    let resolver = Arc::new(build_resolver(&config)?);

    match cli.command {
        Commands::Networks => {
            print!("{}", render::networks_table(resolver.registry()));
        }
        Commands::Endpoints { chain } => {
            let list = resolver.resolve(chain)?;
            print!("{}", render::endpoints_table(list));
        }
        Commands::Explorer { chain, address } => {
            let network = resolver.registry().by_id(chain)?;
            let url = network
                .address_url(&address)
                .with_context(|| format!("{network} has no block explorer configured"))?;
            println!("{url}");
        }
        Commands::Balances {
            address,
            chain,
            precision,
        } => {
            let account = AccountId::parse(&address)?;
            show_balances(&config, resolver, account, chain, precision).await?;
        }
    }

    Ok(())
}

fn build_resolver(config: &ChainHubConfig) -> Result<EndpointResolver> {
    let registry = Arc::new(ChainRegistry::builtin(config.enable_testnets));
    let credentials = ProviderCredentials::from_map(config.api_keys());
    if credentials.is_empty() {
        info!("No provider credentials configured, using public endpoints only");
    }
    let resolver = EndpointResolver::new(
        registry,
        &EndpointCatalog::builtin(),
        &credentials,
        &config.custom_rpc_urls,
    )
    .context("Invalid network configuration")?;
    Ok(resolver)
}

/// Connect a watch-only wallet, let the aggregator follow the session, and
/// print the board once every network settled (or the wait ran out).
async fn show_balances(
    config: &ChainHubConfig,
    resolver: Arc<EndpointResolver>,
    account: AccountId,
    chain: u64,
    precision: usize,
) -> Result<()> {
    let registry = Arc::clone(resolver.registry());
    let session = ConnectivitySession::new(
        Arc::clone(&resolver),
        Arc::new(WatchOnlyWallet::new(account, chain)),
    );
    let aggregator = Arc::new(BalanceAggregator::new(
        Arc::clone(&resolver),
        Arc::new(JsonRpcBalanceReader::new()),
        AggregatorConfig::from(config),
    ));

    let follower = tokio::spawn({
        let aggregator = Arc::clone(&aggregator);
        let events = session.subscribe();
        async move { aggregator.follow_session(events).await }
    });

    let mut board = aggregator.subscribe();
    session.request_connect().await?;

    let max_candidates = registry
        .ids()
        .filter_map(|id| resolver.resolve(id).ok().map(|l| l.len()))
        .max()
        .unwrap_or(1);
    let deadline = config.rpc_timeout() * max_candidates as u32 + SETTLE_GRACE;
    if tokio::time::timeout(deadline, wait_settled(&mut board))
        .await
        .is_err()
    {
        info!("Some networks are still loading after {deadline:?}");
    }

    print!(
        "{}",
        render::balances_table(&board.borrow(), &registry, session.active_chain(), precision)
    );

    session.disconnect().await;
    drop(session);
    follower.await.context("Session follower panicked")?;
    Ok(())
}

async fn wait_settled(board: &mut tokio::sync::watch::Receiver<BalanceBoard>) {
    while !board.borrow_and_update().is_settled() {
        if board.changed().await.is_err() {
            return;
        }
    }
}
