//! Bitcoin chain adaptor
//!
//! Wires the UTXO engine (construction, sign-hashes, signature assembly,
//! decoding and verification) to the adaptor traits and the chain-query
//! collaborator.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::consensus::encode::serialize;
use bitcoin::{ScriptBuf, Txid, Witness};
use futures::future::try_join_all;
use tracing::{debug, error, info, warn};

use crate::adaptor::{ChainAdaptor, UtxoChainAdaptor};
use crate::btc::address::AddressCodec;
use crate::btc::amount::parse_fee;
use crate::btc::decoder::{ParsedTx, TxDecoder};
use crate::btc::raw_tx::RawTxBuilder;
use crate::btc::script::{p2pkh_unlocking_script, p2wpkh_witness, ScriptBuilder, SpendKind};
use crate::btc::sighash::SignHashCalculator;
use crate::btc::signature::SignatureAdapter;
use crate::btc::verifier::{ScriptVerifier, SpentOutput};
use crate::cache::TxCache;
use crate::chain_query::{
    ChainQuery, ChainResolver, NoopResolver, PreviousOutputResolver, VerboseTransaction,
};
use crate::config::GatewayConfig;
use crate::data_structures::*;
use crate::errors::{ChainQueryError, GatewayResult, TransactionError};

pub const BITCOIN_CHAIN: &str = "btc";

/// Confirmation target used for fee estimation
pub const FEE_ESTIMATE_BLOCKS: u16 = 3;

/// Signed transaction produced by finalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx_bytes: Vec<u8>,
    pub txid: Txid,
}

pub struct BitcoinAdaptor {
    config: GatewayConfig,
    scripts: ScriptBuilder,
    signatures: SignatureAdapter,
    chain: Option<Arc<dyn ChainQuery>>,
    cache: TxCache<QueryUtxoTransactionReply>,
}

impl BitcoinAdaptor {
    pub fn new(config: GatewayConfig, chain: Option<Arc<dyn ChainQuery>>) -> GatewayResult<Self> {
        config.validate()?;
        let codec = AddressCodec::new(config.network);
        Ok(Self {
            scripts: ScriptBuilder::new(codec, config.allow_script_hash_destinations),
            signatures: SignatureAdapter::new(config.public_key_format),
            cache: TxCache::new(config.cache_capacity),
            chain,
            config,
        })
    }

    /// Adaptor without a chain collaborator; decoding then requires hints
    pub fn offline(config: GatewayConfig) -> GatewayResult<Self> {
        Self::new(config, None)
    }

    /// Adaptor backed by the node configured in `config.rpc`, if any
    #[cfg(feature = "rpc")]
    pub fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        let chain: Option<Arc<dyn ChainQuery>> = match &config.rpc {
            Some(rpc) => Some(Arc::new(crate::chain_query::BitcoindRpcClient::new(rpc)?)),
            None => None,
        };
        Self::new(config, chain)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn codec(&self) -> &AddressCodec {
        self.scripts.codec()
    }

    fn chain(&self) -> Result<&dyn ChainQuery, ChainQueryError> {
        self.chain.as_deref().ok_or(ChainQueryError::Unavailable)
    }

    fn decoder(&self) -> TxDecoder<'_> {
        TxDecoder::new(self.scripts, self.chain.as_deref())
    }

    /// Build an unsigned transaction and the digest each input must sign
    ///
    /// Script-hash owners are refused: their redeem script is unknown, so the
    /// digest could not be turned into a spendable input at finalization.
    pub fn create_transaction(
        &self,
        vins: &[Vin],
        vouts: &[Vout],
        fee: &str,
    ) -> GatewayResult<(Vec<u8>, DecodedTransaction)> {
        RawTxBuilder::check_shape(vins, vouts)?;
        let fee = parse_fee(fee)?;
        RawTxBuilder::check_conservation(vins, vouts, fee)?;

        for (index, vin) in vins.iter().enumerate() {
            let owner_script = self.scripts.owner_script(&vin.address)?;
            if SpendKind::of(index, &owner_script)? == SpendKind::ScriptHash {
                warn!(index, owner = %vin.address, "Refusing script-hash input, redeem script unknown");
                return Err(TransactionError::UnsupportedScript {
                    index,
                    kind: "script hash with unknown redeem script".to_string(),
                }
                .into());
            }
        }

        let tx = RawTxBuilder::new(self.scripts).build(vins, vouts)?;
        let sign_hashes = SignHashCalculator::new(self.scripts).sign_hashes(&tx, vins)?;
        let tx_bytes = serialize(&tx);
        info!(
            inputs = vins.len(),
            outputs = vouts.len(),
            fee,
            tx = %hex::encode(&tx_bytes),
            "Created unsigned transaction"
        );

        let vouts = vouts
            .iter()
            .enumerate()
            .map(|(index, vout)| Vout::new(vout.address.clone(), vout.amount, index as u32))
            .collect();
        Ok((
            tx_bytes,
            DecodedTransaction {
                tx_hash: None,
                vins: vins.to_vec(),
                vouts,
                fee,
                sign_hashes,
            },
        ))
    }

    /// Attach signatures and keys to an unsigned transaction and verify the result
    ///
    /// Malformed signatures and keys are rejected before any input is resolved.
    pub async fn finalize_transaction(
        &self,
        tx_data: &[u8],
        signatures: &[Vec<u8>],
        public_keys: &[Vec<u8>],
        hints: &[Vin],
    ) -> GatewayResult<SignedTransaction> {
        let parsed = ParsedTx::parse(tx_data)?;
        let inputs = parsed.tx().input.len();
        if signatures.len() != inputs {
            return Err(TransactionError::SignatureCountMismatch {
                signatures: signatures.len(),
                inputs,
            }
            .into());
        }
        if public_keys.len() != inputs {
            return Err(TransactionError::PublicKeyCountMismatch {
                public_keys: public_keys.len(),
                inputs,
            }
            .into());
        }

        let encoded = signatures
            .iter()
            .zip(public_keys)
            .enumerate()
            .map(|(index, (sig, key))| {
                Ok((
                    self.signatures.encode_signature(index, sig)?,
                    self.signatures.encode_public_key(index, key)?,
                ))
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        let (mut tx, vins) = parsed
            .resolve_inputs(hints, self.chain.as_deref())
            .await?
            .into_parts();

        let mut owner_scripts: Vec<ScriptBuf> = Vec::with_capacity(inputs);
        for (index, ((signature, key), vin)) in encoded.iter().zip(&vins).enumerate() {
            let owner_script = self.scripts.owner_script(&vin.address)?;
            let kind = SpendKind::of(index, &owner_script)?;
            self.signatures
                .check_owner(index, kind, key, &vin.address, &owner_script)?;

            let txin = &mut tx.input[index];
            match kind {
                SpendKind::PubkeyHash => {
                    txin.script_sig = p2pkh_unlocking_script(index, signature, key)?;
                    txin.witness = Witness::new();
                }
                SpendKind::WitnessPubkeyHash => {
                    txin.script_sig = ScriptBuf::new();
                    txin.witness = p2wpkh_witness(signature, key);
                }
                SpendKind::ScriptHash => {
                    return Err(TransactionError::UnsupportedScript {
                        index,
                        kind: "script hash with unknown redeem script".to_string(),
                    }
                    .into());
                }
            }
            debug!(index, owner = %vin.address, amount = vin.amount, "Attached signature");
            owner_scripts.push(owner_script);
        }

        let spent: Vec<SpentOutput<'_>> = owner_scripts
            .iter()
            .zip(&vins)
            .map(|(script, vin)| SpentOutput {
                script_pubkey: script,
                amount: vin.amount,
            })
            .collect();
        ScriptVerifier::verify_transaction(&tx, &spent)?;

        let txid = tx.compute_txid();
        let tx_bytes = serialize(&tx);
        info!(%txid, tx = %hex::encode(&tx_bytes), "Created signed transaction");
        Ok(SignedTransaction { tx_bytes, txid })
    }

    /// Decode raw bytes; `verify` runs every input and reports the transaction id
    pub async fn decode_transaction(
        &self,
        data: &[u8],
        hints: &[Vin],
        verify: bool,
    ) -> GatewayResult<DecodedTransaction> {
        self.decoder().decode(data, hints, verify).await
    }

    async fn assemble_reply(
        &self,
        tx: &VerboseTransaction,
        block_height: u64,
        block_time: u64,
        status: TxStatus,
        resolver: &dyn PreviousOutputResolver,
    ) -> GatewayResult<QueryUtxoTransactionReply> {
        let resolved = try_join_all(tx.vin.iter().map(|input| resolver.resolve(input))).await?;
        let vins: Vec<Vin> = tx
            .vin
            .iter()
            .zip(resolved)
            .map(|(input, prev)| Vin {
                hash: input.txid.map(|txid| txid.to_string()).unwrap_or_default(),
                index: input.vout,
                amount: prev.amount,
                address: prev.address,
            })
            .collect();
        let vouts: Vec<Vout> = tx
            .vout
            .iter()
            .map(|output| Vout::new(output.address.clone(), output.value, output.n))
            .collect();

        let fee = total_amount(vins.iter().map(|v| v.amount))
            - total_amount(vouts.iter().map(|v| v.amount));

        Ok(QueryUtxoTransactionReply {
            tx_hash: tx.txid.to_string(),
            tx_status: status,
            vins,
            vouts,
            cost_fee: fee.to_string(),
            block_height,
            block_time,
            ..Default::default()
        })
    }
}

fn decoded_reply(decoded: DecodedTransaction) -> QueryUtxoTransactionReply {
    QueryUtxoTransactionReply {
        tx_hash: decoded.tx_hash.clone().unwrap_or_default(),
        tx_status: TxStatus::Other,
        cost_fee: decoded.fee.to_string(),
        sign_hashes: decoded.sign_hash_bytes(),
        vins: decoded.vins,
        vouts: decoded.vouts,
        ..Default::default()
    }
}

fn parse_txid(hash: &str) -> Result<Txid, TransactionError> {
    Txid::from_str(hash).map_err(|e| TransactionError::invalid_tx_hash(hash, e))
}

#[async_trait]
impl ChainAdaptor for BitcoinAdaptor {
    fn chain_name(&self) -> &str {
        BITCOIN_CHAIN
    }

    async fn convert_address(
        &self,
        req: &ConvertAddressRequest,
    ) -> GatewayResult<ConvertAddressReply> {
        let address = self.codec().p2pkh_from_bytes(&req.public_key)?;
        Ok(ConvertAddressReply {
            address: address.to_string(),
            ..Default::default()
        })
    }

    async fn valid_address(&self, req: &ValidAddressRequest) -> GatewayResult<ValidAddressReply> {
        let validated = self
            .codec()
            .validate(&req.address, self.config.allow_script_hash_destinations)?;
        Ok(ValidAddressReply {
            valid: true,
            can_withdrawal: validated.can_withdrawal,
            canonical_address: validated.canonical(),
            ..Default::default()
        })
    }

    async fn query_gas_price(&self) -> GatewayResult<QueryGasPriceReply> {
        let rate = self.chain()?.estimate_smart_fee(FEE_ESTIMATE_BLOCKS).await?;
        Ok(QueryGasPriceReply {
            gas_price: rate.to_string(),
            ..Default::default()
        })
    }

    async fn broadcast_transaction(
        &self,
        req: &BroadcastTransactionRequest,
    ) -> GatewayResult<BroadcastTransactionReply> {
        let local = ParsedTx::parse(&req.raw_tx)?.tx().compute_txid();
        let remote = self.chain()?.broadcast(&req.raw_tx).await?;
        if remote != local {
            error!(%local, %remote, "Node returned a different transaction id");
        } else {
            info!(txid = %remote, "Broadcast transaction");
        }
        Ok(BroadcastTransactionReply {
            hash: remote.to_string(),
            ..Default::default()
        })
    }

    async fn get_latest_block_height(&self) -> GatewayResult<LatestBlockHeightReply> {
        let height = self.chain()?.get_block_count().await?;
        Ok(LatestBlockHeightReply {
            height,
            ..Default::default()
        })
    }
}

#[async_trait]
impl UtxoChainAdaptor for BitcoinAdaptor {
    async fn create_utxo_transaction(
        &self,
        req: &CreateUtxoTransactionRequest,
    ) -> GatewayResult<CreateUtxoTransactionReply> {
        let (tx_data, decoded) = self.create_transaction(&req.vins, &req.vouts, &req.fee)?;
        Ok(CreateUtxoTransactionReply {
            tx_data,
            sign_hashes: decoded.sign_hash_bytes(),
            ..Default::default()
        })
    }

    async fn create_utxo_signed_transaction(
        &self,
        req: &CreateUtxoSignedTransactionRequest,
    ) -> GatewayResult<CreateSignedTransactionReply> {
        let signed = self
            .finalize_transaction(&req.tx_data, &req.signatures, &req.public_keys, &req.vins)
            .await?;
        Ok(CreateSignedTransactionReply {
            signed_tx_data: signed.tx_bytes,
            hash: signed.txid.to_string(),
            ..Default::default()
        })
    }

    async fn query_utxo_transaction_from_data(
        &self,
        req: &DecodeTransactionRequest,
    ) -> GatewayResult<QueryUtxoTransactionReply> {
        let decoded = self.decode_transaction(&req.raw_data, &req.vins, false).await?;
        Ok(decoded_reply(decoded))
    }

    async fn query_utxo_transaction_from_signed_data(
        &self,
        req: &DecodeTransactionRequest,
    ) -> GatewayResult<QueryUtxoTransactionReply> {
        let decoded = self.decode_transaction(&req.raw_data, &req.vins, true).await?;
        Ok(decoded_reply(decoded))
    }

    async fn verify_utxo_signed_transaction(
        &self,
        req: &VerifySignedTransactionRequest,
    ) -> GatewayResult<VerifySignedTransactionReply> {
        self.decode_transaction(&req.signed_tx_data, &req.vins, true)
            .await?;
        Ok(VerifySignedTransactionReply {
            verified: true,
            ..Default::default()
        })
    }

    async fn query_utxo(&self, req: &QueryUtxoRequest) -> GatewayResult<QueryUtxoReply> {
        let txid = parse_txid(&req.vin.hash)?;
        let Some(output) = self
            .chain()?
            .get_unspent_output(&txid, req.vin.index)
            .await?
        else {
            debug!(%txid, index = req.vin.index, "Output is spent or unknown");
            return Ok(QueryUtxoReply::default());
        };

        if output.value != req.vin.amount {
            return Err(TransactionError::mismatch(0, "amount", req.vin.amount, output.value).into());
        }
        if output.address != req.vin.address {
            return Err(
                TransactionError::mismatch(0, "address", &req.vin.address, &output.address).into(),
            );
        }
        Ok(QueryUtxoReply {
            unspent: true,
            ..Default::default()
        })
    }

    async fn query_utxo_ins_from_data(
        &self,
        req: &QueryUtxoInsFromDataRequest,
    ) -> GatewayResult<QueryUtxoInsFromDataReply> {
        let parsed = ParsedTx::parse(&req.data)?;
        Ok(QueryUtxoInsFromDataReply {
            vins: parsed.outpoints(),
            ..Default::default()
        })
    }

    async fn query_utxo_transaction(
        &self,
        req: &QueryTransactionRequest,
    ) -> GatewayResult<QueryUtxoTransactionReply> {
        let key = TxCache::<QueryUtxoTransactionReply>::key(&req.symbol, &req.hash);
        if let Some(reply) = self.cache.get(&key) {
            debug!(%key, "Transaction cache hit");
            return Ok(reply);
        }

        let txid = parse_txid(&req.hash)?;
        let chain = self.chain()?;
        let not_found = QueryUtxoTransactionReply {
            tx_hash: req.hash.clone(),
            tx_status: TxStatus::NotFound,
            ..Default::default()
        };

        let Some(tx) = chain.get_transaction(&txid).await? else {
            return Ok(not_found);
        };
        if tx.txid != txid {
            warn!(requested = %txid, returned = %tx.txid, "Node returned a different transaction");
            return Ok(not_found);
        }

        let block_hash = match tx.block_hash {
            Some(hash) if tx.confirmations >= self.config.min_confirmations => hash,
            _ => {
                return Ok(QueryUtxoTransactionReply {
                    tx_hash: tx.txid.to_string(),
                    tx_status: TxStatus::Pending,
                    ..Default::default()
                })
            }
        };

        let header = chain.get_block_header(&block_hash).await?;
        let reply = self
            .assemble_reply(
                &tx,
                header.height,
                header.time,
                TxStatus::Success,
                &ChainResolver::new(chain),
            )
            .await?;
        self.cache.insert(key, reply.clone());
        Ok(reply)
    }

    async fn get_utxo_transactions_by_height(
        &self,
        height: u64,
    ) -> GatewayResult<Vec<QueryUtxoTransactionReply>> {
        let chain = self.chain()?;
        let hash = chain.get_block_hash(height).await?;
        let block = chain.get_block(&hash).await?;
        let mut replies = Vec::with_capacity(block.tx.len());
        for tx in &block.tx {
            replies.push(
                self.assemble_reply(tx, block.height, block.time, TxStatus::Success, &NoopResolver)
                    .await?,
            );
        }
        debug!(height, transactions = replies.len(), "Ingested block");
        Ok(replies)
    }
}
