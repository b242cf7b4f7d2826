//! Wallet Sync CLI
//!
//! Command-line tool to look up the balance and ENS identity of an address
//! on a configured chain

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wallet_sync::config::{self, find_chain, get_rpc_url, valid_ens_chain, ChainConfig};
use wallet_sync::enrich::{Enricher, RpcEnricher};
use wallet_sync::rpc::RpcClient;

#[derive(Parser)]
#[command(name = "wallet-sync")]
#[command(version = "0.1.0")]
#[command(about = "Look up balance and ENS identity of a wallet address", long_about = None)]
struct Cli {
    /// Wallet address to look up
    #[arg(short, long, value_name = "ADDRESS")]
    address: String,

    /// Chain id in hex (e.g. 0x1)
    #[arg(short, long, value_name = "CHAIN_ID", default_value = "0x1")]
    chain: String,

    /// JSON file listing configured chains
    #[arg(long, value_name = "FILE")]
    chains: Option<PathBuf>,

    /// RPC endpoint for the chain, overrides the chains file
    #[arg(long, value_name = "URL")]
    rpc_url: Option<String>,

    /// ENS text record to read (repeatable)
    #[arg(long = "text", value_name = "KEY")]
    text_keys: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut chains = match &cli.chains {
        Some(path) => match config::load_chains(path) {
            Ok(chains) => chains,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                process::exit(1);
            }
        },
        None => Vec::new(),
    };

    if let Some(url) = &cli.rpc_url {
        match chains.iter_mut().find(|chain| chain.id == cli.chain) {
            Some(chain) => chain.rpc_url = Some(url.clone()),
            None => chains.push(ChainConfig::new(&cli.chain, "ETH", &cli.chain, Some(url.as_str()))),
        }
    }

    let Some(rpc_url) = get_rpc_url(&cli.chain, &chains) else {
        eprintln!("Error: No RPC URL configured for chain {}", cli.chain);
        eprintln!("Pass --rpc-url or a --chains file with an rpcUrl for this chain");
        process::exit(1);
    };
    let token = find_chain(&cli.chain, &chains)
        .map(|chain| chain.token.clone())
        .unwrap_or_else(|| "ETH".to_string());

    println!("Fetching account data for {} on chain {}", cli.address, cli.chain);

    let enricher = RpcEnricher::new();
    let ens_lookup = async {
        if valid_ens_chain(&cli.chain) {
            Some(enricher.ens(rpc_url, &cli.address).await)
        } else {
            None
        }
    };
    let (balance, ens) = tokio::join!(enricher.balance(rpc_url, &cli.address), ens_lookup);

    let balance = match balance {
        Ok(balance) => balance,
        Err(e) => {
            eprintln!("\n❌ Error fetching balance: {:#}", e);
            eprintln!("\nPlease check:");
            eprintln!("  • Address format is correct");
            eprintln!("  • The RPC endpoint is reachable");
            process::exit(1);
        }
    };

    println!("\n✅ Success!");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Chain:    {}", cli.chain);
    println!("Address:  {}", cli.address);
    match balance {
        Some(amount) => println!("Balance:  {} {}", amount, token),
        None => println!("Balance:  unavailable"),
    }

    match ens {
        None => println!("ENS:      not available on this chain"),
        Some(Err(e)) => println!("ENS:      lookup failed ({})", e),
        Some(Ok(None)) => println!("ENS:      no name"),
        Some(Ok(Some(identity))) => {
            println!("ENS:      {}", identity.name);
            if let Some(content_hash) = &identity.content_hash {
                println!("Content:  {}", content_hash);
            }

            let client = RpcClient::new(rpc_url);
            for key in &cli.text_keys {
                match identity.text(&client, key).await {
                    Ok(Some(value)) => println!("{:<9} {}", format!("{}:", key), value),
                    Ok(None) => println!("{:<9} (unset)", format!("{}:", key)),
                    Err(e) => println!("{:<9} lookup failed ({})", format!("{}:", key), e),
                }
            }
        }
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
