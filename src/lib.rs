//! Multi-chain transaction gateway
//!
//! This crate builds unsigned transactions, computes the hashes an external
//! signer must sign, assembles signed transactions from detached signatures
//! and verifies them against the consensus script interpreter. Bitcoin is the
//! only UTXO chain implemented; other chains answer "unsupported operation"
//! through [`adaptor::UnsupportedChainAdaptor`].
//!
//! ## Features
//!
//! - `rpc` (default): JSON-RPC client for a bitcoind-compatible full node
//! - `cli`: the `gateway` command line tool
//!
//! Without `rpc`, the adaptor runs offline and every operation that needs
//! chain data must be given input hints.

pub mod adaptor;
pub mod btc;
pub mod cache;
pub mod chain_query;
pub mod config;
pub mod data_structures;
pub mod errors;
pub mod hex_utils;
pub mod scanning;

pub use adaptor::{ChainAdaptor, UnsupportedChainAdaptor, UtxoChainAdaptor};
pub use btc::BitcoinAdaptor;
pub use config::{GatewayConfig, NetworkKind, PublicKeyFormat, RpcConfig};
pub use errors::*;
pub use hex_utils::*;
pub use scanning::*;
