//! Transaction gateway command line tool
//!
//! Every subcommand reads a JSON request (from `--input <file>` or stdin) and
//! prints the JSON reply. Failures are reported inside the reply envelope with
//! `code = "ERROR"`, the same way a service caller would see them.
//!
//! ## Usage
//! ```bash
//! # Build an unsigned transaction offline
//! gateway --network testnet create --input create.json
//!
//! # Decode a signed transaction, looking up inputs on a node
//! gateway --rpc-url http://127.0.0.1:18332 --rpc-user u --rpc-password p decode --signed < tx.json
//!
//! # Scan a block range, one reply per line
//! gateway --config gateway.json scan --from-block 100 --to-block 200 --workers 4
//! ```
//!
//! Press Ctrl+C during a scan to stop it; replies already printed stay valid.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chain_gateway::{
    data_structures::*, BitcoinAdaptor, BlockRangeScanner, ChainAdaptor, GatewayConfig,
    GatewayError, GatewayResult, NetworkKind, PublicKeyFormat, RpcConfig, ScanAbortFlag,
    UtxoChainAdaptor,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, help = "Network: mainnet, testnet, regtest, signet")]
    network: Option<String>,

    #[arg(long, help = "Public key form in unlocking scripts: compressed, uncompressed")]
    public_key_format: Option<String>,

    #[arg(long, help = "Full node JSON-RPC URL. Without it the gateway runs offline")]
    rpc_url: Option<String>,

    #[arg(long)]
    rpc_user: Option<String>,

    #[arg(long)]
    rpc_password: Option<String>,

    #[arg(long, default_value = "30", help = "Timeout for node requests in seconds")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive the P2PKH address of a hex public key
    ConvertAddress {
        public_key: String,
    },
    /// Check an address against the configured network
    ValidateAddress {
        address: String,
    },
    /// Build an unsigned transaction from a CreateUtxoTransactionRequest
    Create {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Assemble a signed transaction from a CreateUtxoSignedTransactionRequest
    Sign {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Decode a DecodeTransactionRequest
    Decode {
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(long, help = "Treat the data as signed and verify every input")]
        signed: bool,
    },
    /// Verify a VerifySignedTransactionRequest
    Verify {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Broadcast a BroadcastTransactionRequest
    Broadcast {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Query the status of a transaction by hash
    QueryTx {
        hash: String,
    },
    /// Current fee estimate in satoshis per kilobyte
    GasPrice,
    /// Latest block height known to the node
    Height,
    /// Ingest every transaction of a block range
    Scan {
        #[arg(long)]
        from_block: u64,
        #[arg(long)]
        to_block: u64,
        #[arg(long, help = "Number of concurrent block workers")]
        workers: Option<usize>,
    },
}

async fn load_config(args: &CliArgs) -> GatewayResult<GatewayConfig> {
    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_json_file(path).await?,
        None => GatewayConfig::default(),
    };
    if let Some(network) = &args.network {
        config.network = network.parse::<NetworkKind>()?;
    }
    if let Some(format) = &args.public_key_format {
        config.public_key_format = format.parse::<PublicKeyFormat>()?;
    }
    if let Some(url) = &args.rpc_url {
        config.rpc = Some(RpcConfig {
            url: url.clone(),
            username: args.rpc_user.clone(),
            password: args.rpc_password.clone(),
            timeout_secs: args.timeout,
        });
    }
    config.validate()?;
    Ok(config)
}

fn read_request<T: DeserializeOwned>(input: Option<&PathBuf>) -> GatewayResult<T> {
    let json = match input {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            GatewayError::InvalidRequest(format!("failed to read {}: {e}", path.display()))
        })?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| GatewayError::InvalidRequest(format!("failed to read stdin: {e}")))?;
            buf
        }
    };
    serde_json::from_str(&json)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid request JSON: {e}")))
}

fn print_reply<R: Envelope + Serialize>(result: GatewayResult<R>) -> GatewayResult<()> {
    let reply = respond(result);
    let json = serde_json::to_string_pretty(&reply)
        .map_err(|e| GatewayError::Internal(format!("failed to encode reply: {e}")))?;
    println!("{json}");
    Ok(())
}

async fn run_scan(
    adaptor: Arc<BitcoinAdaptor>,
    from_block: u64,
    to_block: u64,
    workers: Option<usize>,
) -> GatewayResult<()> {
    let mut scanner = BlockRangeScanner::new(adaptor);
    if let Some(workers) = workers {
        scanner = scanner.with_workers(workers);
    }

    let abort = ScanAbortFlag::new();
    let handle = abort.handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping scan");
            handle.abort();
        }
    });

    let (sender, mut receiver) = mpsc::channel::<QueryUtxoTransactionReply>(256);
    let printer = tokio::spawn(async move {
        while let Some(reply) = receiver.recv().await {
            match serde_json::to_string(&reply) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to encode scan reply"),
            }
        }
    });

    let result = scanner.scan(from_block, to_block, sender, abort).await;
    printer
        .await
        .map_err(|e| GatewayError::Internal(format!("printer task failed: {e}")))?;

    let summary = result?;
    info!(
        blocks = summary.blocks_scanned,
        transactions = summary.transactions,
        "Scan complete"
    );
    if summary.aborted {
        std::process::exit(130);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> GatewayResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args).await?;
    info!(
        network = config.network.as_str(),
        online = config.rpc.is_some(),
        "Gateway configured"
    );
    let adaptor = Arc::new(BitcoinAdaptor::from_config(config)?);

    match &args.command {
        Command::ConvertAddress { public_key } => {
            let public_key = chain_gateway::decode_hex(public_key)
                .map_err(|e| GatewayError::InvalidRequest(format!("invalid public key hex: {e}")));
            let result = match public_key {
                Ok(public_key) => {
                    adaptor
                        .convert_address(&ConvertAddressRequest { public_key })
                        .await
                }
                Err(e) => Err(e),
            };
            print_reply(result)
        }
        Command::ValidateAddress { address } => print_reply(
            adaptor
                .valid_address(&ValidAddressRequest {
                    address: address.clone(),
                })
                .await,
        ),
        Command::Create { input } => {
            let req: CreateUtxoTransactionRequest = read_request(input.as_ref())?;
            print_reply(adaptor.create_utxo_transaction(&req).await)
        }
        Command::Sign { input } => {
            let req: CreateUtxoSignedTransactionRequest = read_request(input.as_ref())?;
            print_reply(adaptor.create_utxo_signed_transaction(&req).await)
        }
        Command::Decode { input, signed } => {
            let req: DecodeTransactionRequest = read_request(input.as_ref())?;
            if *signed {
                print_reply(adaptor.query_utxo_transaction_from_signed_data(&req).await)
            } else {
                print_reply(adaptor.query_utxo_transaction_from_data(&req).await)
            }
        }
        Command::Verify { input } => {
            let req: VerifySignedTransactionRequest = read_request(input.as_ref())?;
            print_reply(adaptor.verify_utxo_signed_transaction(&req).await)
        }
        Command::Broadcast { input } => {
            let req: BroadcastTransactionRequest = read_request(input.as_ref())?;
            print_reply(adaptor.broadcast_transaction(&req).await)
        }
        Command::QueryTx { hash } => print_reply(
            adaptor
                .query_utxo_transaction(&QueryTransactionRequest {
                    symbol: adaptor.chain_name().to_string(),
                    hash: hash.clone(),
                })
                .await,
        ),
        Command::GasPrice => print_reply(adaptor.query_gas_price().await),
        Command::Height => print_reply(adaptor.get_latest_block_height().await),
        Command::Scan {
            from_block,
            to_block,
            workers,
        } => run_scan(Arc::clone(&adaptor), *from_block, *to_block, *workers).await,
    }
}
