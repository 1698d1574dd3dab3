//! JSON-RPC client for bitcoind-compatible full nodes
//!
//! Amounts arrive as decimal BTC JSON numbers. With `serde_json`'s
//! `arbitrary_precision` feature the number text is preserved and converted
//! to satoshis exactly.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::{BlockHash, Txid};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    BlockHeaderInfo, ChainQuery, UnspentOutput, VerboseBlock, VerboseInput, VerboseOutput,
    VerboseTransaction,
};
use crate::btc::amount::json_btc_to_sats;
use crate::config::RpcConfig;
use crate::errors::{ChainQueryError, GatewayError, GatewayResult};

/// `RPC_INVALID_ADDRESS_OR_KEY`: unknown transaction or block
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

#[derive(Serialize, Debug)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: i32,
}

#[derive(Deserialize, Debug)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

#[derive(Deserialize, Debug)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize, Debug, Default)]
struct ScriptPubKeyWire {
    address: Option<String>,
    addresses: Option<Vec<String>>,
}

impl ScriptPubKeyWire {
    fn first_address(self) -> String {
        self.address
            .or_else(|| self.addresses.and_then(|a| a.into_iter().next()))
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug)]
struct VinWire {
    txid: Option<Txid>,
    vout: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct VoutWire {
    value: serde_json::Number,
    n: u32,
    #[serde(rename = "scriptPubKey", default)]
    script_pub_key: ScriptPubKeyWire,
}

#[derive(Deserialize, Debug)]
struct TransactionWire {
    txid: Txid,
    #[serde(default)]
    confirmations: u64,
    blockhash: Option<BlockHash>,
    blocktime: Option<u64>,
    vin: Vec<VinWire>,
    vout: Vec<VoutWire>,
}

impl TransactionWire {
    fn into_verbose(self) -> Result<VerboseTransaction, ChainQueryError> {
        let vout = self
            .vout
            .into_iter()
            .map(|output| {
                Ok(VerboseOutput {
                    value: json_btc_to_sats(&output.value)?,
                    n: output.n,
                    address: output.script_pub_key.first_address(),
                })
            })
            .collect::<Result<Vec<_>, ChainQueryError>>()?;
        let vin = self
            .vin
            .into_iter()
            .map(|input| VerboseInput {
                txid: input.txid,
                vout: input.vout.unwrap_or_default(),
            })
            .collect();
        Ok(VerboseTransaction {
            txid: self.txid,
            confirmations: self.confirmations,
            block_hash: self.blockhash,
            block_time: self.blocktime,
            vin,
            vout,
        })
    }
}

#[derive(Deserialize, Debug)]
struct BlockWire {
    hash: BlockHash,
    height: u64,
    time: u64,
    #[serde(default)]
    tx: Vec<TransactionWire>,
}

#[derive(Deserialize, Debug)]
struct TxOutWire {
    confirmations: u64,
    value: serde_json::Number,
    #[serde(rename = "scriptPubKey", default)]
    script_pub_key: ScriptPubKeyWire,
}

#[derive(Deserialize, Debug)]
struct SmartFeeWire {
    feerate: Option<serde_json::Number>,
    #[serde(default)]
    errors: Vec<String>,
}

/// JSON-RPC 1.0 client for a bitcoind-compatible node
pub struct BitcoindRpcClient {
    client: Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
    id_counter: AtomicI32,
}

impl BitcoindRpcClient {
    pub fn new(config: &RpcConfig) -> GatewayResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                GatewayError::configuration(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            id_counter: AtomicI32::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<R, ChainQueryError> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            jsonrpc: "1.0",
            method,
            params,
            id,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }

        debug!(method, id, "Sending RPC request");
        let response = builder
            .send()
            .await
            .map_err(|e| ChainQueryError::connection_failed(&e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ChainQueryError::connection_failed(&format!(
                "authentication rejected by node ({status})"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ChainQueryError::connection_failed(&e.to_string()))?;

        // bitcoind reports method errors with HTTP 500 and a JSON body
        let parsed: RpcResponse = serde_json::from_slice(&body).map_err(|e| {
            ChainQueryError::invalid_response(format!(
                "{method}: HTTP {status}, unparsable body: {e}"
            ))
        })?;

        if let Some(error) = parsed.error {
            return Err(ChainQueryError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(parsed.result)
            .map_err(|e| ChainQueryError::invalid_response(format!("{method}: {e}")))
    }
}

#[async_trait]
impl ChainQuery for BitcoindRpcClient {
    async fn get_transaction(
        &self,
        txid: &Txid,
    ) -> Result<Option<VerboseTransaction>, ChainQueryError> {
        match self
            .call::<TransactionWire>("getrawtransaction", json!([txid.to_string(), true]))
            .await
        {
            Ok(wire) => wire.into_verbose().map(Some),
            Err(ChainQueryError::Rpc { code, .. }) if code == RPC_INVALID_ADDRESS_OR_KEY => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_unspent_output(
        &self,
        txid: &Txid,
        vout: u32,
    ) -> Result<Option<UnspentOutput>, ChainQueryError> {
        let wire: Option<TxOutWire> = self
            .call("gettxout", json!([txid.to_string(), vout, true]))
            .await?;
        wire.map(|out| {
            Ok(UnspentOutput {
                value: json_btc_to_sats(&out.value)?,
                confirmations: out.confirmations,
                address: out.script_pub_key.first_address(),
            })
        })
        .transpose()
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<Txid, ChainQueryError> {
        self.call("sendrawtransaction", json!([hex::encode(tx_bytes)]))
            .await
    }

    async fn get_block_count(&self) -> Result<u64, ChainQueryError> {
        self.call("getblockcount", json!([])).await
    }

    async fn get_block_hash(&self, height: u64) -> Result<BlockHash, ChainQueryError> {
        self.call("getblockhash", json!([height])).await
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<VerboseBlock, ChainQueryError> {
        let wire: BlockWire = self.call("getblock", json!([hash.to_string(), 2])).await?;
        let tx = wire
            .tx
            .into_iter()
            .map(TransactionWire::into_verbose)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VerboseBlock {
            hash: wire.hash,
            height: wire.height,
            time: wire.time,
            tx,
        })
    }

    async fn get_block_header(
        &self,
        hash: &BlockHash,
    ) -> Result<BlockHeaderInfo, ChainQueryError> {
        let wire: BlockWire = self
            .call("getblockheader", json!([hash.to_string(), true]))
            .await?;
        Ok(BlockHeaderInfo {
            hash: wire.hash,
            height: wire.height,
            time: wire.time,
        })
    }

    async fn estimate_smart_fee(&self, blocks: u16) -> Result<u64, ChainQueryError> {
        let wire: SmartFeeWire = self.call("estimatesmartfee", json!([blocks])).await?;
        match wire.feerate {
            Some(rate) => json_btc_to_sats(&rate),
            None => {
                warn!(errors = ?wire.errors, "Node returned no fee estimate");
                Err(ChainQueryError::invalid_response(format!(
                    "estimatesmartfee returned no feerate: {}",
                    wire.errors.join("; ")
                )))
            }
        }
    }
}
