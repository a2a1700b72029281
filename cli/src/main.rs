//! Liquidator CLI - auction monitoring and bidding for a margin exchange
//!
//! Reads subaccount and auction state through `cast`, prices liquidation
//! auctions with `auction_model`, and submits `advancedBid` transactions.

use alloy_primitives::{I256, U256};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod account;
mod auctions;
mod bindings;
mod client;
mod config;
mod contracts;
mod display;
mod history;
mod keeper;
mod liquidation;
mod option;
#[cfg(test)]
mod testing;

use client::CastClient;
use config::Config;
use contracts::Session;
use liquidation::BidOptions;

#[derive(Parser)]
#[command(name = "liquidator")]
#[command(about = "Liquidation auction CLI - inspect, monitor and bid on auctions", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default ~/.config/liquidator/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// RPC URL (overrides the config file)
    #[arg(short = 'u', long, global = true)]
    rpc_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Auction discovery and pricing
    Auction {
        #[command(subcommand)]
        command: AuctionCommands,
    },

    /// Subaccount inspection
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Liquidation operations
    Liquidation {
        #[command(subcommand)]
        command: LiquidationCommands,
    },

    /// Liquidation history from event logs
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Option subId encoding
    Option {
        #[command(subcommand)]
        command: OptionCommands,
    },

    /// Keeper operations
    Keeper {
        #[command(subcommand)]
        command: KeeperCommands,
    },
}

#[derive(Subcommand)]
enum AuctionCommands {
    /// List every ongoing auction with its current price
    List,

    /// Show one auction
    Show {
        /// Subaccount id under auction
        sub_account_id: U256,
    },

    /// Show the protocol's auction parameters
    Params,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Show margin and portfolio of a subaccount
    Balances {
        /// Subaccount id
        sub_account_id: U256,

        /// Read at a historical block instead of latest
        #[arg(short, long)]
        block: Option<u64>,

        /// Also fetch spot prices of held markets
        #[arg(short, long)]
        spot: bool,
    },
}

#[derive(Subcommand)]
enum LiquidationCommands {
    /// Bid on an ongoing auction
    Bid {
        /// Subaccount id under auction
        sub_account_id: U256,

        /// Subaccount that takes over the liquidated portfolio
        #[arg(short, long)]
        liquidator: U256,

        /// Fraction of the account to take, in (0, 1] (default: whole account)
        #[arg(short, long, value_parser = parse_amount, default_value = "1")]
        percentage: I256,

        /// Collateral to deposit (default: minimum plus 10)
        #[arg(long, value_parser = parse_amount)]
        collateral: Option<I256>,

        /// Maximum cost, 0 skips the check
        #[arg(long, value_parser = parse_amount, default_value = "0", allow_hyphen_values = true)]
        max_cost: I256,

        /// Expected last trade id of the account (default: current)
        #[arg(long)]
        last_trade_id: Option<U256>,

        /// Merge the liquidated account into the liquidator
        #[arg(long)]
        merge: bool,

        /// Size the bid without sending it
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Liquidations of one subaccount with before/after snapshots
    Account {
        /// Subaccount id
        sub_account_id: U256,

        /// Number of days to look back
        #[arg(short, long, default_value = "7")]
        days: f64,

        /// Fetch spot prices at flagging time
        #[arg(short, long)]
        spot: bool,
    },

    /// Every solvent auction in range
    All {
        /// Number of days to look back
        #[arg(short, long, default_value = "7")]
        days: f64,

        /// Fetch account details before each auction
        #[arg(short, long)]
        accounts: bool,

        /// Fetch spot prices (requires --accounts)
        #[arg(short, long)]
        spot: bool,
    },
}

#[derive(Subcommand)]
enum OptionCommands {
    /// Decode an option subId
    Decode {
        sub_id: U256,
    },

    /// Encode option details into a subId
    Encode {
        /// Unix seconds, RFC 3339 or YYYY-MM-DD
        #[arg(short, long)]
        expiry: String,

        /// Strike price in whole units, e.g. 3250.5
        #[arg(short, long)]
        strike: String,

        /// Call option (default put)
        #[arg(long)]
        call: bool,

        /// Round the strike down onto the packable grid
        #[arg(long)]
        round: bool,
    },
}

#[derive(Subcommand)]
enum KeeperCommands {
    /// Scan and quote auctions on an interval
    Run {
        /// Check interval in seconds
        #[arg(short, long, default_value = "5")]
        interval: u64,

        /// Stop after this many rounds
        #[arg(long)]
        iterations: Option<u64>,
    },
}

fn parse_amount(text: &str) -> Result<I256, String> {
    auction_model::fixed::parse_wad(text).map_err(|e| e.to_string())
}

async fn connect(cli: &Cli) -> anyhow::Result<Session<CastClient>> {
    let config = Config::load(cli.config.as_deref(), cli.rpc_url.clone())?;
    if cli.verbose {
        println!("{} {}", "RPC URL:".bright_cyan(), config.rpc_url);
        println!("{} {}", "Auction:".bright_cyan(), config.contracts.auction);
    }
    let client = CastClient::new(&config);
    Session::connect(client, config).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // Pure commands run without a config file
    if let Commands::Option { command } = &cli.command {
        match command {
            OptionCommands::Decode { sub_id } => {
                option::decode(*sub_id);
            }
            OptionCommands::Encode { expiry, strike, call, round } => {
                option::encode(expiry, strike, *call, *round)?;
            }
        }
        return Ok(());
    }

    let session = connect(&cli).await?;

    match cli.command {
        Commands::Auction { command } => match command {
            AuctionCommands::List => auctions::list_auctions(&session).await?,
            AuctionCommands::Show { sub_account_id } => auctions::show_auction(&session, sub_account_id).await?,
            AuctionCommands::Params => auctions::show_params(&session).await?,
        },
        Commands::Account { command } => match command {
            AccountCommands::Balances { sub_account_id, block, spot } => {
                account::show_balances(&session, sub_account_id, block, spot).await?;
            }
        },
        Commands::Liquidation { command } => match command {
            LiquidationCommands::Bid {
                sub_account_id,
                liquidator,
                percentage,
                collateral,
                max_cost,
                last_trade_id,
                merge,
                dry_run,
            } => {
                let options = BidOptions {
                    sub_account_id,
                    liquidator_sub_account_id: liquidator,
                    percentage,
                    collateral_amount: collateral,
                    max_cost,
                    last_trade_id,
                    merge,
                    dry_run,
                };
                if dry_run {
                    liquidation::bid::<_, CastClient>(&session, None, &options).await?;
                } else {
                    let signer = CastClient::new(&session.config).with_signer(session.config.signing_key()?);
                    liquidation::bid(&session, Some(&signer), &options).await?;
                }
            }
        },
        Commands::History { command } => match command {
            HistoryCommands::Account { sub_account_id, days, spot } => {
                history::account_history(&session, sub_account_id, days, spot).await?;
            }
            HistoryCommands::All { days, accounts, spot } => {
                history::all_history(&session, days, accounts, spot).await?;
            }
        },
        Commands::Keeper { command } => match command {
            KeeperCommands::Run { interval, iterations } => {
                keeper::run_keeper(&session, interval, iterations).await?;
            }
        },
        Commands::Option { .. } => {}
    }

    Ok(())
}
