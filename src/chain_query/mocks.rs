//! Mock chain-query implementation for deterministic testing
//!
//! Holds transactions, unspent outputs and blocks in memory and can be told
//! to fail specific operations, so adaptor and scanner behaviour can be
//! exercised without a node.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::consensus::encode::deserialize;
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Transaction, Txid};

use super::{
    BlockHeaderInfo, ChainQuery, UnspentOutput, VerboseBlock, VerboseInput, VerboseOutput,
    VerboseTransaction,
};
use crate::errors::ChainQueryError;

const GENESIS_TIME: u64 = 1_600_000_000;

/// Mock chain implementation for deterministic testing
#[derive(Debug, Clone)]
pub struct MockChainQuery {
    /// Known transactions by id
    transactions: Arc<Mutex<HashMap<Txid, VerboseTransaction>>>,
    /// Unspent outputs by outpoint
    unspent: Arc<Mutex<HashMap<(Txid, u32), UnspentOutput>>>,
    /// Blocks by height
    blocks: Arc<Mutex<BTreeMap<u64, VerboseBlock>>>,
    /// Raw transactions submitted through `broadcast`
    broadcasts: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Id returned by `broadcast` instead of the real one
    broadcast_txid_override: Arc<Mutex<Option<Txid>>>,
    /// Fee rate returned by `estimate_smart_fee`
    fee_rate: Arc<Mutex<u64>>,
    /// Delay applied to every block fetch
    block_delay: Arc<Mutex<Option<Duration>>>,
    /// Number of transaction lookups served
    lookups: Arc<AtomicUsize>,
    /// Simulated failure modes for testing error conditions
    failure_modes: Arc<Mutex<MockFailureModes>>,
}

#[derive(Debug, Clone, Default)]
pub struct MockFailureModes {
    /// Fail next transaction lookup
    pub fail_get_transaction: bool,
    /// Fail next broadcast
    pub fail_broadcast: bool,
    /// Fail next unspent output lookup
    pub fail_get_unspent: bool,
    /// Fail every block fetch at this height
    pub fail_block_at_height: Option<u64>,
    /// Return specific error message for next operation
    pub next_error_message: Option<String>,
}

impl Default for MockChainQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainQuery {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(Mutex::new(HashMap::new())),
            unspent: Arc::new(Mutex::new(HashMap::new())),
            blocks: Arc::new(Mutex::new(BTreeMap::new())),
            broadcasts: Arc::new(Mutex::new(Vec::new())),
            broadcast_txid_override: Arc::new(Mutex::new(None)),
            fee_rate: Arc::new(Mutex::new(1_000)),
            block_delay: Arc::new(Mutex::new(None)),
            lookups: Arc::new(AtomicUsize::new(0)),
            failure_modes: Arc::new(Mutex::new(MockFailureModes::default())),
        }
    }

    pub fn set_failure_mode(&self, mode: MockFailureModes) {
        *self.failure_modes.lock().unwrap() = mode;
    }

    pub fn set_broadcast_txid_override(&self, txid: Option<Txid>) {
        *self.broadcast_txid_override.lock().unwrap() = txid;
    }

    pub fn set_fee_rate(&self, sat_per_kvb: u64) {
        *self.fee_rate.lock().unwrap() = sat_per_kvb;
    }

    pub fn set_block_delay(&self, delay: Option<Duration>) {
        *self.block_delay.lock().unwrap() = delay;
    }

    /// Number of transaction lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn add_transaction(&self, tx: VerboseTransaction) {
        self.transactions.lock().unwrap().insert(tx.txid, tx);
    }

    /// Register a confirmed, unspent output `txid:vout` owned by `address`
    pub fn add_funding_output(&self, txid: Txid, vout: u32, amount: u64, address: &str) {
        {
            let mut transactions = self.transactions.lock().unwrap();
            let tx = transactions
                .entry(txid)
                .or_insert_with(|| VerboseTransaction {
                    txid,
                    confirmations: 6,
                    block_hash: None,
                    block_time: None,
                    vin: vec![VerboseInput::coinbase()],
                    vout: Vec::new(),
                });
            tx.vout.retain(|output| output.n != vout);
            tx.vout.push(VerboseOutput {
                value: amount,
                n: vout,
                address: address.to_string(),
            });
            tx.vout.sort_by_key(|output| output.n);
        }
        self.unspent.lock().unwrap().insert(
            (txid, vout),
            UnspentOutput {
                value: amount,
                confirmations: 6,
                address: address.to_string(),
            },
        );
    }

    pub fn mark_spent(&self, txid: Txid, vout: u32) {
        self.unspent.lock().unwrap().remove(&(txid, vout));
    }

    /// Deterministic hash for a mock block height
    pub fn block_hash_at(height: u64) -> BlockHash {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&height.to_le_bytes());
        bytes[31] = 0xb1;
        BlockHash::from_byte_array(bytes)
    }

    /// Add a block at `height` containing `txs`; the transactions become confirmed
    pub fn add_block(&self, height: u64, txs: Vec<VerboseTransaction>) -> BlockHash {
        let hash = Self::block_hash_at(height);
        let time = GENESIS_TIME + height * 600;
        let txs: Vec<VerboseTransaction> = txs
            .into_iter()
            .map(|mut tx| {
                tx.block_hash = Some(hash);
                tx.block_time = Some(time);
                tx.confirmations = tx.confirmations.max(1);
                tx
            })
            .collect();
        {
            let mut transactions = self.transactions.lock().unwrap();
            for tx in &txs {
                transactions.insert(tx.txid, tx.clone());
            }
        }
        self.blocks.lock().unwrap().insert(
            height,
            VerboseBlock {
                hash,
                height,
                time,
                tx: txs,
            },
        );
        hash
    }

    fn check_failure(&self, operation: &str) -> Result<(), ChainQueryError> {
        let mut modes = self.failure_modes.lock().unwrap();

        if let Some(error_msg) = modes.next_error_message.take() {
            return Err(ChainQueryError::ConnectionFailed(error_msg));
        }

        match operation {
            "get_transaction" if modes.fail_get_transaction => {
                modes.fail_get_transaction = false;
                Err(ChainQueryError::connection_failed(
                    "Mock failure: get_transaction",
                ))
            }
            "broadcast" if modes.fail_broadcast => {
                modes.fail_broadcast = false;
                Err(ChainQueryError::Rpc {
                    code: -26,
                    message: "Mock failure: broadcast".to_string(),
                })
            }
            "get_unspent" if modes.fail_get_unspent => {
                modes.fail_get_unspent = false;
                Err(ChainQueryError::connection_failed("Mock failure: get_unspent"))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ChainQuery for MockChainQuery {
    async fn get_transaction(
        &self,
        txid: &Txid,
    ) -> Result<Option<VerboseTransaction>, ChainQueryError> {
        self.check_failure("get_transaction")?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.transactions.lock().unwrap().get(txid).cloned())
    }

    async fn get_unspent_output(
        &self,
        txid: &Txid,
        vout: u32,
    ) -> Result<Option<UnspentOutput>, ChainQueryError> {
        self.check_failure("get_unspent")?;
        Ok(self.unspent.lock().unwrap().get(&(*txid, vout)).cloned())
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<Txid, ChainQueryError> {
        self.check_failure("broadcast")?;
        let tx: Transaction = deserialize(tx_bytes).map_err(|e| ChainQueryError::Rpc {
            code: -22,
            message: format!("TX decode failed: {e}"),
        })?;
        self.broadcasts.lock().unwrap().push(tx_bytes.to_vec());
        let override_txid = *self.broadcast_txid_override.lock().unwrap();
        Ok(override_txid.unwrap_or_else(|| tx.compute_txid()))
    }

    async fn get_block_count(&self) -> Result<u64, ChainQueryError> {
        self.check_failure("get_block_count")?;
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }

    async fn get_block_hash(&self, height: u64) -> Result<BlockHash, ChainQueryError> {
        self.check_failure("get_block_hash")?;
        self.blocks
            .lock()
            .unwrap()
            .get(&height)
            .map(|block| block.hash)
            .ok_or_else(|| ChainQueryError::Rpc {
                code: -8,
                message: "Block height out of range".to_string(),
            })
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<VerboseBlock, ChainQueryError> {
        let delay = *self.block_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure("get_block")?;
        let block = self
            .blocks
            .lock()
            .unwrap()
            .values()
            .find(|block| block.hash == *hash)
            .cloned()
            .ok_or_else(|| ChainQueryError::not_found(format!("block {hash}")))?;
        let fail_at = self.failure_modes.lock().unwrap().fail_block_at_height;
        if fail_at == Some(block.height) {
            return Err(ChainQueryError::connection_failed(&format!(
                "Mock failure: get_block at height {}",
                block.height
            )));
        }
        Ok(block)
    }

    async fn get_block_header(
        &self,
        hash: &BlockHash,
    ) -> Result<BlockHeaderInfo, ChainQueryError> {
        self.check_failure("get_block_header")?;
        self.blocks
            .lock()
            .unwrap()
            .values()
            .find(|block| block.hash == *hash)
            .map(|block| BlockHeaderInfo {
                hash: block.hash,
                height: block.height,
                time: block.time,
            })
            .ok_or_else(|| ChainQueryError::not_found(format!("block {hash}")))
    }

    async fn estimate_smart_fee(&self, _blocks: u16) -> Result<u64, ChainQueryError> {
        self.check_failure("estimate_smart_fee")?;
        Ok(*self.fee_rate.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn txid(n: u8) -> Txid {
        Txid::from_byte_array([n; 32])
    }

    #[tokio::test]
    async fn test_failure_mode_resets_after_use() {
        let chain = MockChainQuery::new();
        chain.add_funding_output(txid(1), 0, 10, "addr");
        chain.set_failure_mode(MockFailureModes {
            fail_get_transaction: true,
            ..Default::default()
        });
        assert!(chain.get_transaction(&txid(1)).await.is_err());
        assert!(chain.get_transaction(&txid(1)).await.unwrap().is_some());
        assert_eq!(chain.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_next_error_message() {
        let chain = MockChainQuery::new();
        chain.set_failure_mode(MockFailureModes {
            next_error_message: Some("node down".to_string()),
            ..Default::default()
        });
        let err = chain.get_block_count().await.unwrap_err();
        assert_eq!(err.to_string(), "blockchain connection failed: node down");
    }

    #[tokio::test]
    async fn test_blocks_and_headers() {
        let chain = MockChainQuery::new();
        let tx = VerboseTransaction {
            txid: txid(7),
            confirmations: 0,
            block_hash: None,
            block_time: None,
            vin: vec![VerboseInput::coinbase()],
            vout: vec![],
        };
        let hash = chain.add_block(100, vec![tx]);
        assert_eq!(chain.get_block_count().await.unwrap(), 100);
        assert_eq!(chain.get_block_hash(100).await.unwrap(), hash);
        let header = chain.get_block_header(&hash).await.unwrap();
        assert_eq!(header.height, 100);
        let stored = chain.get_transaction(&txid(7)).await.unwrap().unwrap();
        assert_eq!(stored.block_hash, Some(hash));
        assert_eq!(stored.confirmations, 1);
        assert!(chain.get_block_hash(101).await.is_err());
    }

    #[tokio::test]
    async fn test_unspent_and_spent() {
        let chain = MockChainQuery::new();
        let id = Txid::from_str(
            "c94a4debf11bfef9316681f61fb663d15ed7a6ad8698063c4f1348575aec57a9",
        )
        .unwrap();
        chain.add_funding_output(id, 0, 500, "owner");
        assert_eq!(
            chain.get_unspent_output(&id, 0).await.unwrap().unwrap().value,
            500
        );
        chain.mark_spent(id, 0);
        assert!(chain.get_unspent_output(&id, 0).await.unwrap().is_none());
    }
}
