use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-chain wallet dashboard core
#[derive(Debug, Parser)]
#[command(name = "chainhub", version, about = "Multi-chain wallet connectivity")]
pub struct Cli {
    /// Config file (defaults to ~/.chainhub/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Include testnets regardless of configuration
    #[arg(long, global = true)]
    pub testnets: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List supported networks
    Networks,
    /// Show the RPC endpoints tried for a network, in order
    Endpoints {
        /// Chain id
        chain: u64,
    },
    /// Show native balances of an address on every network
    Balances {
        /// Account address (0x...)
        address: String,
        /// Network the watch-only wallet reports as active
        #[arg(long, default_value_t = 1)]
        chain: u64,
        /// Fractional digits to display
        #[arg(long, default_value_t = 4)]
        precision: usize,
    },
    /// Print the block explorer link for an address
    Explorer {
        /// Chain id
        chain: u64,
        /// Account or token address
        address: String,
    },
}
