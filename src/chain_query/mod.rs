//! Chain-query collaborator
//!
//! The engine never talks to a node directly. Everything it needs from the
//! chain goes through [`ChainQuery`]: previous-output lookups for online
//! decoding, verbose transactions and blocks for status queries and scans,
//! unspent checks, fee estimates and broadcast.

use async_trait::async_trait;
use bitcoin::{BlockHash, Txid};

use crate::errors::ChainQueryError;

pub mod mocks;
#[cfg(feature = "rpc")]
pub mod rpc_client;

pub use mocks::{MockChainQuery, MockFailureModes};
#[cfg(feature = "rpc")]
pub use rpc_client::BitcoindRpcClient;

/// Amount and owner of a previous output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousOutput {
    pub amount: u64,
    pub address: String,
}

/// Input of a verbose transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerboseInput {
    /// `None` for coinbase inputs
    pub txid: Option<Txid>,
    pub vout: u32,
}

impl VerboseInput {
    pub fn spending(txid: Txid, vout: u32) -> Self {
        Self {
            txid: Some(txid),
            vout,
        }
    }

    pub fn coinbase() -> Self {
        Self::default()
    }
}

/// Output of a verbose transaction, amounts already in satoshis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerboseOutput {
    pub value: u64,
    pub n: u32,
    /// Empty when the output script has no address
    pub address: String,
}

/// Decoded transaction as reported by a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerboseTransaction {
    pub txid: Txid,
    pub confirmations: u64,
    pub block_hash: Option<BlockHash>,
    pub block_time: Option<u64>,
    pub vin: Vec<VerboseInput>,
    pub vout: Vec<VerboseOutput>,
}

/// Verbose block with its transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerboseBlock {
    pub hash: BlockHash,
    pub height: u64,
    pub time: u64,
    pub tx: Vec<VerboseTransaction>,
}

/// Header fields needed to place a transaction on chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeaderInfo {
    pub hash: BlockHash,
    pub height: u64,
    pub time: u64,
}

/// Unspent output as reported by `gettxout`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnspentOutput {
    pub value: u64,
    pub confirmations: u64,
    pub address: String,
}

/// Read and broadcast access to a UTXO chain
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Verbose transaction, or `None` when the node does not know the hash
    async fn get_transaction(
        &self,
        txid: &Txid,
    ) -> Result<Option<VerboseTransaction>, ChainQueryError>;

    /// Unspent output at the outpoint, or `None` when spent or unknown
    async fn get_unspent_output(
        &self,
        txid: &Txid,
        vout: u32,
    ) -> Result<Option<UnspentOutput>, ChainQueryError>;

    /// Submit a signed transaction; returns the id reported by the node
    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<Txid, ChainQueryError>;

    async fn get_block_count(&self) -> Result<u64, ChainQueryError>;

    async fn get_block_hash(&self, height: u64) -> Result<BlockHash, ChainQueryError>;

    async fn get_block(&self, hash: &BlockHash) -> Result<VerboseBlock, ChainQueryError>;

    async fn get_block_header(&self, hash: &BlockHash)
        -> Result<BlockHeaderInfo, ChainQueryError>;

    /// Fee rate in satoshis per kilo-vbyte to confirm within `blocks`
    async fn estimate_smart_fee(&self, blocks: u16) -> Result<u64, ChainQueryError>;

    /// Amount and owner of the output `txid:vout`
    async fn get_previous_output(
        &self,
        txid: &Txid,
        vout: u32,
    ) -> Result<PreviousOutput, ChainQueryError> {
        let tx = self
            .get_transaction(txid)
            .await?
            .ok_or_else(|| ChainQueryError::not_found(format!("transaction {txid}")))?;
        let output = tx
            .vout
            .iter()
            .find(|output| output.n == vout)
            .ok_or_else(|| ChainQueryError::not_found(format!("output {txid}:{vout}")))?;
        Ok(PreviousOutput {
            amount: output.value,
            address: output.address.clone(),
        })
    }
}

/// Source of previous-output data used when assembling transaction replies
#[async_trait]
pub trait PreviousOutputResolver: Send + Sync {
    async fn resolve(&self, input: &VerboseInput) -> Result<PreviousOutput, ChainQueryError>;
}

/// Resolves previous outputs through a chain query, coinbase inputs as empty
pub struct ChainResolver<'a> {
    chain: &'a dyn ChainQuery,
}

impl<'a> ChainResolver<'a> {
    pub fn new(chain: &'a dyn ChainQuery) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl PreviousOutputResolver for ChainResolver<'_> {
    async fn resolve(&self, input: &VerboseInput) -> Result<PreviousOutput, ChainQueryError> {
        match &input.txid {
            Some(txid) => self.chain.get_previous_output(txid, input.vout).await,
            None => Ok(PreviousOutput::default()),
        }
    }
}

/// Resolver used for block ingestion: amount 0 and empty owner for every input
pub struct NoopResolver;

#[async_trait]
impl PreviousOutputResolver for NoopResolver {
    async fn resolve(&self, _input: &VerboseInput) -> Result<PreviousOutput, ChainQueryError> {
        Ok(PreviousOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const PREV: &str = "c94a4debf11bfef9316681f61fb663d15ed7a6ad8698063c4f1348575aec57a9";

    #[tokio::test]
    async fn test_default_previous_output_lookup() {
        let chain = MockChainQuery::new();
        let txid = Txid::from_str(PREV).unwrap();
        chain.add_funding_output(txid, 0, 32_500_000, "mhoGjKn5xegDXL6u5LFSUQdm5ozdM6xao9");

        let prev = chain.get_previous_output(&txid, 0).await.unwrap();
        assert_eq!(prev.amount, 32_500_000);
        assert_eq!(prev.address, "mhoGjKn5xegDXL6u5LFSUQdm5ozdM6xao9");

        assert!(matches!(
            chain.get_previous_output(&txid, 5).await,
            Err(ChainQueryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolvers() {
        let chain = MockChainQuery::new();
        let txid = Txid::from_str(PREV).unwrap();
        chain.add_funding_output(txid, 1, 1_000, "mhoGjKn5xegDXL6u5LFSUQdm5ozdM6xao9");

        let resolver = ChainResolver::new(&chain);
        let prev = resolver
            .resolve(&VerboseInput::spending(txid, 1))
            .await
            .unwrap();
        assert_eq!(prev.amount, 1_000);
        let coinbase = resolver.resolve(&VerboseInput::coinbase()).await.unwrap();
        assert_eq!(coinbase, PreviousOutput::default());

        let noop = NoopResolver
            .resolve(&VerboseInput::spending(txid, 1))
            .await
            .unwrap();
        assert_eq!(noop.amount, 0);
        assert!(noop.address.is_empty());
    }
}
